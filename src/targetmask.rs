//! Target classification masks loaded from YAML.
//!
//! The YAML file defines five bitmasks (`desi_mask`, `bgs_mask`, `mws_mask`,
//! `obsconditions`, `obsmask`) as lists of `[name, bitnum, comment, {extra}]`, and a
//! `priorities` section giving, for each target bit, a priority per observation state
//! of `obsmask`. Priorities are completed while loading:
//! - `SAME_AS_<BIT>` copies the priorities of another bit of the same mask,
//! - missing `MORE_ZWARN` and `MORE_ZGOOD` take the value of `UNOBS`,
//! - any other missing state gets priority `0`,
//! - `null` means the bit has no priorities.
//!
//! The result is a single immutable [`TargetMasks`] meant to be loaded once at
//! startup and passed by reference.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;
use thiserror::Error;

use crate::bitmask::{BitDef, BitMask, BitMaskError};

/// Target mask definitions shipped with the crate.
pub const BUILTIN_TARGETMASK: &str = include_str!("../data/targetmask.yaml");

/// Errors loading target masks.
#[derive(Error, Debug)]
pub enum TargetMaskError {
    /// The file could not be read.
    #[error("reading target mask file {}: {source}", .path.display())]
    Io {
        /// Path of the file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The YAML does not have the expected structure.
    #[error("parsing target mask YAML: {0}")]
    Yaml(#[from] serde_yml::Error),
    /// A mask is inconsistent or an expression refers to an unknown bit.
    #[error(transparent)]
    BitMask(#[from] BitMaskError),
    /// The `priorities` section names a mask that is not defined.
    #[error("priorities given for unknown mask '{0}'")]
    UnknownMask(String),
    /// The `priorities` section names a bit the mask does not define.
    #[error("{mask}: priorities given for unknown bit '{name}'")]
    UnknownBit {
        /// Name of the mask.
        mask: String,
        /// Name of the bit.
        name: String,
    },
    /// A bit of a mask with priorities has none.
    #[error("{mask}: no priorities for bit '{name}'")]
    MissingPriority {
        /// Name of the mask.
        mask: String,
        /// Name of the bit.
        name: String,
    },
    /// Priorities without the `UNOBS` state.
    #[error("{mask}: priorities of '{name}' lack UNOBS")]
    MissingUnobs {
        /// Name of the mask.
        mask: String,
        /// Name of the bit.
        name: String,
    },
    /// Priority given for a state `obsmask` does not define.
    #[error("{mask}: priorities of '{name}' use unknown observation state '{state}'")]
    UnknownState {
        /// Name of the mask.
        mask: String,
        /// Name of the bit.
        name: String,
        /// The unknown state.
        state: String,
    },
    /// A string priority that is not `SAME_AS_<BIT>` of a bit listed under `priorities`.
    #[error("{mask}: priorities of '{name}' refer to '{value}', expected SAME_AS_<BIT>")]
    InvalidAlias {
        /// Name of the mask.
        mask: String,
        /// Name of the bit.
        name: String,
        /// The string given.
        value: String,
    },
    /// `SAME_AS_` references that loop back on themselves.
    #[error("{mask}: priority aliases form a cycle: {chain}")]
    AliasCycle {
        /// Name of the mask.
        mask: String,
        /// The bits involved, joined by `->`.
        chain: String,
    },
}

#[derive(Deserialize, Default)]
struct RawExtra {
    #[serde(default)]
    obsconditions: Option<String>,
}

#[derive(Deserialize)]
struct RawBitDef(String, u32, String, #[serde(default)] RawExtra);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPriority {
    Alias(String),
    States(BTreeMap<String, i64>),
    Empty,
}

#[derive(Deserialize)]
struct RawTargetMask {
    desi_mask: Vec<RawBitDef>,
    bgs_mask: Vec<RawBitDef>,
    mws_mask: Vec<RawBitDef>,
    obsconditions: Vec<RawBitDef>,
    obsmask: Vec<RawBitDef>,
    #[serde(default)]
    priorities: BTreeMap<String, BTreeMap<String, RawPriority>>,
}

type Priorities = BTreeMap<String, i64>;

/// Completes the priorities of one mask.
struct PriorityResolver<'a> {
    mask: &'a str,
    raw: &'a BTreeMap<String, RawPriority>,
    states: &'a [String],
    resolved: BTreeMap<String, Priorities>,
}

impl<'a> PriorityResolver<'a> {
    fn new(mask: &'a str, raw: &'a BTreeMap<String, RawPriority>, states: &'a [String]) -> Self {
        Self {
            mask,
            raw,
            states,
            resolved: BTreeMap::new(),
        }
    }

    fn resolve_all(mut self) -> Result<BTreeMap<String, Priorities>, TargetMaskError> {
        let raw = self.raw;
        for name in raw.keys() {
            self.resolve(name, &mut Vec::new())?;
        }
        Ok(self.resolved)
    }

    fn resolve(
        &mut self,
        name: &str,
        chain: &mut Vec<String>,
    ) -> Result<Priorities, TargetMaskError> {
        if let Some(done) = self.resolved.get(name) {
            return Ok(done.clone());
        }
        if chain.iter().any(|n| n == name) {
            chain.push(name.to_string());
            return Err(TargetMaskError::AliasCycle {
                mask: self.mask.to_string(),
                chain: chain.join(" -> "),
            });
        }

        let raw = self.raw;
        let priorities = match raw.get(name) {
            Some(RawPriority::Alias(value)) => {
                let other = value
                    .strip_prefix("SAME_AS_")
                    .filter(|other| raw.contains_key(*other))
                    .ok_or_else(|| TargetMaskError::InvalidAlias {
                        mask: self.mask.to_string(),
                        name: name.to_string(),
                        value: value.clone(),
                    })?;
                chain.push(name.to_string());
                let priorities = self.resolve(other, chain)?;
                chain.pop();
                priorities
            }
            Some(RawPriority::States(states)) => self.complete(name, states)?,
            Some(RawPriority::Empty) => Priorities::new(),
            None => {
                return Err(TargetMaskError::MissingPriority {
                    mask: self.mask.to_string(),
                    name: name.to_string(),
                })
            }
        };

        self.resolved.insert(name.to_string(), priorities.clone());
        Ok(priorities)
    }

    fn complete(&self, name: &str, given: &Priorities) -> Result<Priorities, TargetMaskError> {
        if let Some(state) = given.keys().find(|s| !self.states.contains(*s)) {
            return Err(TargetMaskError::UnknownState {
                mask: self.mask.to_string(),
                name: name.to_string(),
                state: state.clone(),
            });
        }
        let unobs = *given.get("UNOBS").ok_or_else(|| TargetMaskError::MissingUnobs {
            mask: self.mask.to_string(),
            name: name.to_string(),
        })?;

        let mut priorities = given.clone();
        priorities.entry("MORE_ZWARN".to_string()).or_insert(unobs);
        priorities.entry("MORE_ZGOOD".to_string()).or_insert(unobs);
        for state in self.states {
            priorities.entry(state.clone()).or_insert(0);
        }
        Ok(priorities)
    }
}

fn build_mask(
    name: &str,
    raw: Vec<RawBitDef>,
    mut priorities: Option<BTreeMap<String, Priorities>>,
) -> Result<BitMask, TargetMaskError> {
    let bits = raw
        .into_iter()
        .map(|RawBitDef(bit, bitnum, comment, extra)| -> Result<BitDef, TargetMaskError> {
            let mut def = BitDef::new(bit, bitnum, comment);
            def.obsconditions = extra.obsconditions;
            if let Some(priorities) = priorities.as_mut() {
                def.priorities =
                    priorities
                        .remove(&def.name)
                        .ok_or_else(|| TargetMaskError::MissingPriority {
                            mask: name.to_string(),
                            name: def.name.clone(),
                        })?;
            }
            Ok(def)
        })
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(unused) = priorities.and_then(|p| p.into_keys().next()) {
        return Err(TargetMaskError::UnknownBit {
            mask: name.to_string(),
            name: unused,
        });
    }

    Ok(BitMask::new(name, bits)?)
}

/// The survey's target classification masks.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetMasks {
    /// Main survey target bits (`DESI_TARGET`).
    pub desi_mask: BitMask,
    /// Bright Galaxy Survey bits (`BGS_TARGET`).
    pub bgs_mask: BitMask,
    /// Milky Way Survey bits (`MWS_TARGET`).
    pub mws_mask: BitMask,
    /// Observing conditions a target may be observed in.
    pub obsconditions: BitMask,
    /// Observation states of a target.
    pub obsmask: BitMask,
}

impl TargetMasks {
    /// The target masks shipped with the crate.
    pub fn builtin() -> Result<Self, TargetMaskError> {
        Self::from_yaml_str(BUILTIN_TARGETMASK)
    }

    /// Load target masks from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TargetMaskError> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path).map_err(|source| TargetMaskError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loading target masks from {}.", path.display());
        Self::from_yaml_str(&yaml)
    }

    /// Parse target masks from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, TargetMaskError> {
        let RawTargetMask {
            desi_mask,
            bgs_mask,
            mws_mask,
            obsconditions,
            obsmask,
            priorities,
        } = serde_yml::from_str(yaml)?;

        let states: Vec<String> = obsmask.iter().map(|bit| bit.0.clone()).collect();
        let mut resolved = BTreeMap::new();
        for (mask, raw) in &priorities {
            if !matches!(mask.as_str(), "desi_mask" | "bgs_mask" | "mws_mask") {
                return Err(TargetMaskError::UnknownMask(mask.clone()));
            }
            let completed = PriorityResolver::new(mask, raw, &states).resolve_all()?;
            resolved.insert(mask.as_str(), completed);
        }

        let masks = Self {
            desi_mask: build_mask("desi_mask", desi_mask, resolved.remove("desi_mask"))?,
            bgs_mask: build_mask("bgs_mask", bgs_mask, resolved.remove("bgs_mask"))?,
            mws_mask: build_mask("mws_mask", mws_mask, resolved.remove("mws_mask"))?,
            obsconditions: build_mask("obsconditions", obsconditions, None)?,
            obsmask: build_mask("obsmask", obsmask, None)?,
        };

        for mask in masks.target_masks() {
            for bit in mask.bits() {
                if let Some(expr) = &bit.obsconditions {
                    masks.obsconditions.mask_expr(expr)?;
                }
            }
        }

        Ok(masks)
    }

    /// The three masks that classify targets.
    pub fn target_masks(&self) -> [&BitMask; 3] {
        [&self.desi_mask, &self.bgs_mask, &self.mws_mask]
    }

    /// Mask by name.
    pub fn get(&self, name: &str) -> Option<&BitMask> {
        [
            &self.desi_mask,
            &self.bgs_mask,
            &self.mws_mask,
            &self.obsconditions,
            &self.obsmask,
        ]
        .into_iter()
        .find(|mask| mask.name() == name)
    }

    /// Observing conditions a target bit may be observed in, as an `obsconditions` value.
    /// Bits without observing conditions give `0`.
    pub fn obsconditions_of(&self, mask: &BitMask, bit: &str) -> Result<i64, BitMaskError> {
        match &mask.get(bit)?.obsconditions {
            Some(expr) => self.obsconditions.mask_expr(expr),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_priorities(priorities: &str) -> String {
        format!(
            "desi_mask:
    - [A, 0, \"a\", {{obsconditions: DARK}}]
    - [B, 1, \"b\"]
    - [C, 2, \"c\"]
bgs_mask: []
mws_mask: []
obsconditions:
    - [DARK, 0, \"dark\"]
obsmask:
    - [UNOBS, 0, \"u\"]
    - [DONE, 1, \"d\"]
    - [MORE_ZWARN, 2, \"w\"]
    - [MORE_ZGOOD, 3, \"g\"]
priorities:
    desi_mask:
{priorities}"
        )
    }

    #[test]
    fn builtin_bits() {
        let masks = TargetMasks::builtin().unwrap();
        assert_eq!(masks.desi_mask.mask("QSO").unwrap(), 4);
        assert_eq!(masks.desi_mask.mask("LRG").unwrap(), 1);
        assert_eq!(masks.desi_mask.mask("ELG").unwrap(), 2);
        assert_eq!(masks.desi_mask.mask("SKY").unwrap(), 1 << 32);
        assert_eq!(masks.desi_mask.mask("STD_FSTAR").unwrap(), 1 << 33);
        assert_eq!(masks.bgs_mask.mask("BGS_BRIGHT").unwrap(), 2);
        assert_eq!(masks.obsmask.bitnum("MORE_ZGOOD").unwrap(), 4);
        assert_eq!(masks.get("mws_mask").unwrap().name(), "mws_mask");
        assert!(masks.get("other").is_none());
    }

    #[test]
    fn builtin_priorities() {
        let masks = TargetMasks::builtin().unwrap();

        let lrg = &masks.desi_mask.get("LRG").unwrap().priorities;
        assert_eq!(lrg["UNOBS"], 3200);
        assert_eq!(lrg["MORE_ZWARN"], 3200);
        assert_eq!(lrg["MORE_ZGOOD"], 2);

        let qso = &masks.desi_mask.get("QSO").unwrap().priorities;
        assert_eq!(qso["MORE_ZWARN"], 3400);
        assert_eq!(qso["MORE_ZGOOD"], 3500);
        assert_eq!(qso.len(), 5);

        assert!(masks.desi_mask.get("SKY").unwrap().priorities.is_empty());
        assert!(masks.desi_mask.get("STD_WD").unwrap().priorities.is_empty());

        let known = &masks.bgs_mask.get("BGS_KNOWN_ANY").unwrap().priorities;
        assert_eq!(&masks.bgs_mask.get("BGS_KNOWN_SDSS").unwrap().priorities, known);
        assert_eq!(
            masks.mws_mask.get("MWS_MAIN_VERY_FAINT").unwrap().priorities,
            masks.mws_mask.get("MWS_MAIN").unwrap().priorities
        );

        assert!(masks.obsmask.get("UNOBS").unwrap().priorities.is_empty());
    }

    #[test]
    fn builtin_obsconditions() {
        let masks = TargetMasks::builtin().unwrap();
        assert_eq!(masks.obsconditions_of(&masks.desi_mask, "ELG").unwrap(), 3);
        assert_eq!(masks.obsconditions_of(&masks.desi_mask, "QSO").unwrap(), 1);
        assert_eq!(masks.obsconditions_of(&masks.obsmask, "DONE").unwrap(), 0);
        assert!(masks.obsconditions_of(&masks.desi_mask, "NOPE").is_err());
    }

    #[test]
    fn defaults_are_filled() {
        let yaml = with_priorities(
            "        A: {UNOBS: 10}
        B: SAME_AS_C
        C: SAME_AS_A
",
        );
        let masks = TargetMasks::from_yaml_str(&yaml).unwrap();
        let a = &masks.desi_mask.get("A").unwrap().priorities;
        assert_eq!(a["UNOBS"], 10);
        assert_eq!(a["MORE_ZWARN"], 10);
        assert_eq!(a["MORE_ZGOOD"], 10);
        assert_eq!(a["DONE"], 0);
        assert_eq!(&masks.desi_mask.get("B").unwrap().priorities, a);
        assert_eq!(masks.desi_mask.get("A").unwrap().obsconditions.as_deref(), Some("DARK"));
    }

    #[test]
    fn missing_priority() {
        let yaml = with_priorities("        A: {UNOBS: 10}\n        B: null\n");
        assert!(matches!(
            TargetMasks::from_yaml_str(&yaml),
            Err(TargetMaskError::MissingPriority { name, .. }) if name == "C"
        ));
    }

    #[test]
    fn unknown_bit() {
        let yaml = with_priorities(
            "        A: null\n        B: null\n        C: null\n        D: null\n",
        );
        assert!(matches!(
            TargetMasks::from_yaml_str(&yaml),
            Err(TargetMaskError::UnknownBit { name, .. }) if name == "D"
        ));
    }

    #[test]
    fn missing_unobs_and_unknown_state() {
        let yaml = with_priorities("        A: {DONE: 1}\n        B: null\n        C: null\n");
        assert!(matches!(
            TargetMasks::from_yaml_str(&yaml),
            Err(TargetMaskError::MissingUnobs { .. })
        ));

        let yaml =
            with_priorities("        A: {UNOBS: 1, LATER: 2}\n        B: null\n        C: null\n");
        assert!(matches!(
            TargetMasks::from_yaml_str(&yaml),
            Err(TargetMaskError::UnknownState { state, .. }) if state == "LATER"
        ));
    }

    #[test]
    fn bad_aliases() {
        let yaml = with_priorities("        A: B\n        B: null\n        C: null\n");
        assert!(matches!(
            TargetMasks::from_yaml_str(&yaml),
            Err(TargetMaskError::InvalidAlias { .. })
        ));

        let yaml =
            with_priorities("        A: SAME_AS_B\n        B: SAME_AS_A\n        C: null\n");
        assert!(matches!(
            TargetMasks::from_yaml_str(&yaml),
            Err(TargetMaskError::AliasCycle { .. })
        ));
    }

    #[test]
    fn unknown_obsconditions() {
        let yaml = with_priorities("        A: null\n        B: null\n        C: null\n")
            .replace("obsconditions: DARK", "obsconditions: DARK|MIDNIGHT");
        assert!(matches!(
            TargetMasks::from_yaml_str(&yaml),
            Err(TargetMaskError::BitMask(BitMaskError::UnknownName { .. }))
        ));
    }

    #[test]
    fn unknown_priority_mask() {
        let yaml = with_priorities("        A: null\n        B: null\n        C: null\n")
            + "    obsmask:\n        UNOBS: null\n";
        assert!(matches!(
            TargetMasks::from_yaml_str(&yaml),
            Err(TargetMaskError::UnknownMask(mask)) if mask == "obsmask"
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targetmask.yaml");
        fs::write(&path, BUILTIN_TARGETMASK).unwrap();
        assert_eq!(TargetMasks::load(&path).unwrap(), TargetMasks::builtin().unwrap());

        let missing = dir.path().join("missing.yaml");
        assert!(matches!(
            TargetMasks::load(missing),
            Err(TargetMaskError::Io { .. })
        ));
    }
}
