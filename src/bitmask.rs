//! Named bit definitions.
//!
//! A [`BitMask`] maps names to bit numbers and back, in the spirit of the target
//! bitmasks used throughout the survey: `mask.mask("QSO")` gives the value to OR into
//! a `DESI_TARGET` column and `mask.names(value)` lists the bits a value has set.

use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;
use thiserror::Error;

/// Errors building or querying a [`BitMask`].
#[derive(Error, Debug, PartialEq)]
pub enum BitMaskError {
    /// The name is not defined in the mask.
    #[error("{mask}: unknown bit name '{name}'")]
    UnknownName {
        /// Name of the mask.
        mask: String,
        /// The bit name looked up.
        name: String,
    },
    /// Two bits share a name.
    #[error("{mask}: duplicate bit name '{name}'")]
    DuplicateName {
        /// Name of the mask.
        mask: String,
        /// The repeated bit name.
        name: String,
    },
    /// Two bits share a bit number.
    #[error("{mask}: bit {bitnum} assigned to both '{first}' and '{second}'")]
    DuplicateBit {
        /// Name of the mask.
        mask: String,
        /// The repeated bit number.
        bitnum: u32,
        /// First bit with this number.
        first: String,
        /// Second bit with this number.
        second: String,
    },
    /// The bit number does not fit into 64 bits.
    #[error("{mask}: bit '{name}' has bit number {bitnum}, must be below 64")]
    BitOutOfRange {
        /// Name of the mask.
        mask: String,
        /// The offending bit.
        name: String,
        /// Its bit number.
        bitnum: u32,
    },
}

/// One named bit.
#[derive(Clone, Debug, PartialEq)]
pub struct BitDef {
    /// Bit name, e.g. `QSO`.
    pub name: String,
    /// Position of the bit.
    pub bitnum: u32,
    /// Free text description.
    pub comment: String,
    /// Expression over the `obsconditions` mask, e.g. `DARK|GRAY`.
    pub obsconditions: Option<String>,
    /// Priority per observation state. Empty for masks without priorities.
    pub priorities: BTreeMap<String, i64>,
}

impl BitDef {
    /// Create a bit without observing conditions or priorities.
    pub fn new(name: impl Into<String>, bitnum: u32, comment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bitnum,
            comment: comment.into(),
            obsconditions: None,
            priorities: BTreeMap::new(),
        }
    }

    /// Set the observing conditions expression.
    pub fn with_obsconditions(mut self, obsconditions: impl Into<String>) -> Self {
        self.obsconditions = Some(obsconditions.into());
        self
    }

    /// Set the priorities.
    pub fn with_priorities(mut self, priorities: BTreeMap<String, i64>) -> Self {
        self.priorities = priorities;
        self
    }

    /// Value of this bit alone.
    pub fn mask(&self) -> i64 {
        1i64 << self.bitnum
    }
}

/// A set of named bits.
#[derive(Clone, Debug, PartialEq)]
pub struct BitMask {
    name: String,
    bits: Vec<BitDef>,
    index: HashMap<String, usize>,
}

impl BitMask {
    /// Create a mask, checking that names and bit numbers are unique.
    pub fn new(name: impl Into<String>, bits: Vec<BitDef>) -> Result<Self, BitMaskError> {
        let name = name.into();
        let mut index = HashMap::with_capacity(bits.len());
        let mut by_bitnum: HashMap<u32, &str> = HashMap::with_capacity(bits.len());

        for (i, bit) in bits.iter().enumerate() {
            if bit.bitnum >= 64 {
                return Err(BitMaskError::BitOutOfRange {
                    mask: name,
                    name: bit.name.clone(),
                    bitnum: bit.bitnum,
                });
            }
            if let Some(first) = by_bitnum.insert(bit.bitnum, &bit.name) {
                return Err(BitMaskError::DuplicateBit {
                    mask: name.clone(),
                    bitnum: bit.bitnum,
                    first: first.to_string(),
                    second: bit.name.clone(),
                });
            }
            if index.insert(bit.name.clone(), i).is_some() {
                return Err(BitMaskError::DuplicateName {
                    mask: name,
                    name: bit.name.clone(),
                });
            }
        }

        Ok(Self { name, bits, index })
    }

    /// Name of the mask, e.g. `desi_mask`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All bits, in definition order.
    pub fn bits(&self) -> &[BitDef] {
        &self.bits
    }

    /// Bit definition by name.
    pub fn get(&self, name: &str) -> Result<&BitDef, BitMaskError> {
        self.index
            .get(name)
            .map(|&i| &self.bits[i])
            .ok_or_else(|| BitMaskError::UnknownName {
                mask: self.name.clone(),
                name: name.to_string(),
            })
    }

    /// Whether a bit of that name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Bit number of a named bit.
    pub fn bitnum(&self, name: &str) -> Result<u32, BitMaskError> {
        Ok(self.get(name)?.bitnum)
    }

    /// Value of a named bit, `1 << bitnum`.
    pub fn mask(&self, name: &str) -> Result<i64, BitMaskError> {
        Ok(self.get(name)?.mask())
    }

    /// Value of an expression of bit names joined by `|`, e.g. `DARK|GRAY`.
    pub fn mask_expr(&self, expr: &str) -> Result<i64, BitMaskError> {
        expr.split('|')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .try_fold(0i64, |acc, name| -> Result<i64, BitMaskError> {
                Ok(acc | self.mask(name)?)
            })
    }

    /// Comment of a named bit.
    pub fn comment(&self, name: &str) -> Result<&str, BitMaskError> {
        Ok(&self.get(name)?.comment)
    }

    /// Names of the bits set in `value`, lowest bit first.
    ///
    /// Set bits without a definition are reported as `UNKNOWNnn`.
    pub fn names(&self, value: i64) -> Vec<String> {
        (0..64u32)
            .filter(|bitnum| value & (1i64 << bitnum) != 0)
            .map(|bitnum| {
                self.bits
                    .iter()
                    .find(|bit| bit.bitnum == bitnum)
                    .map(|bit| bit.name.clone())
                    .unwrap_or_else(|| format!("UNKNOWN{bitnum}"))
            })
            .collect_vec()
    }
}
