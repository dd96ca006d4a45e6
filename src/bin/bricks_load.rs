//! Load a brick summary FITS table into the `bricks` table of the calibration database.
//!
//! Usage:
//! ```
//! DATABASE_URL=postgres://user@host/desi \
//!     cargo run --release --features database --bin bricks_load -- survey-bricks.fits --verify 100
//! ```

use std::path::PathBuf;

use clap::Parser;
use desitarget::db::{connect, load_bricks, verify_bricks, Mismatch};
use desitarget::io::read_brick_rows;
use log::{error, info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

#[derive(Parser)]
#[command(name = "bricks_load")]
#[command(about = "Load a brick summary table into the database")]
#[command(version)]
struct Args {
    /// Brick summary FITS table, read from HDU 1
    fits: PathBuf,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    /// Number of loaded rows to read back and compare (0 disables the check)
    #[arg(long, default_value = "0", value_name = "N")]
    verify: usize,

    /// Increase logging verbosity
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    let rows = read_brick_rows(&args.fits)?;
    info!("Read {} bricks from {}.", rows.len(), args.fits.display());

    let mut conn = connect(&args.database_url)?;
    load_bricks(&mut conn, &rows)?;

    if args.verify > 0 {
        let mismatches = verify_bricks(&mut conn, &rows, args.verify)?;
        for mismatch in &mismatches {
            match mismatch {
                Mismatch::Missing(brickname) => error!("{brickname}: not in database"),
                Mismatch::Differs { brickname, fields } => {
                    error!("{brickname}: differs in {}", fields.join(", "))
                }
            }
        }
        if !mismatches.is_empty() {
            return Err(format!("{} bricks failed verification", mismatches.len()).into());
        }
    }

    println!("done");
    Ok(())
}
