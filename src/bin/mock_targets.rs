//! Mock target catalogs from simulated galaxy, quasar and random catalogs.
//!
//! Usage:
//! ```
//! cargo run --release --bin mock_targets -- dark-time --config mock.yaml --seed 42
//! cargo run --release --bin mock_targets -- stdstar-sky --config mock.yaml -o out/
//! cargo run --release --bin mock_targets -- masks
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use desitarget::{
    build_mock_stdstar_sky, build_mock_targets, DarkTimeConfig, StdStarSkyConfig, TargetMasks,
};
use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

#[derive(Parser)]
#[command(name = "mock_targets")]
#[command(about = "Build mock target catalogs from simulated catalogs")]
#[command(version)]
struct Cli {
    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Target mask definitions (default: built-in)
    #[arg(long, value_name = "YAML", global = true)]
    targetmask: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RunArgs {
    /// Workflow configuration
    #[arg(short, long, value_name = "YAML")]
    config: PathBuf,

    /// Seed of the random draws, overrides the configuration
    #[arg(long)]
    seed: Option<u64>,

    /// Output directory, overrides the configuration
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Dark-time targets and truth from QSO, ELG, LRG and random mocks
    DarkTime(RunArgs),

    /// Standard stars and sky fibers from random points
    StdstarSky(RunArgs),

    /// Print the target mask bits and priorities
    Masks,
}

fn print_masks(masks: &TargetMasks) {
    for mask in [
        &masks.desi_mask,
        &masks.bgs_mask,
        &masks.mws_mask,
        &masks.obsconditions,
        &masks.obsmask,
    ] {
        println!("{}:", mask.name());
        for bit in mask.bits() {
            println!("  {:2} {:<20} {}", bit.bitnum, bit.name, bit.comment);
            if let Some(obsconditions) = &bit.obsconditions {
                println!("       obsconditions: {obsconditions}");
            }
            if !bit.priorities.is_empty() {
                let priorities = bit
                    .priorities
                    .iter()
                    .map(|(state, priority)| format!("{state}={priority}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("       priorities: {priorities}");
            }
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    let masks = match &cli.targetmask {
        Some(path) => TargetMasks::load(path)?,
        None => TargetMasks::builtin()?,
    };

    match cli.command {
        Commands::DarkTime(args) => {
            let mut config = DarkTimeConfig::load(&args.config)?;
            if let Some(seed) = args.seed {
                config = config.with_seed(seed);
            }
            if let Some(output_dir) = args.output_dir {
                config = config.with_output_dir(output_dir);
            }

            let report = build_mock_targets(&config, &masks)?;

            println!(
                "{:<12} {:>10} {:>10} {:>10}",
                "population", "candidates", "selected", "fraction"
            );
            for s in &report.selections {
                let flag = if s.shortfall { "  shortfall" } else { "" };
                println!(
                    "{:<12} {:>10} {:>10} {:>10.4}{}",
                    s.label, s.n_candidates, s.n_selected, s.fraction, flag
                );
            }
            println!("{} targets", report.n_targets);
            println!("{}", report.targets_path.display());
            println!("{}", report.truth_path.display());
        }
        Commands::StdstarSky(args) => {
            let mut config = StdStarSkyConfig::load(&args.config)?;
            if let Some(seed) = args.seed {
                config = config.with_seed(seed);
            }
            if let Some(output_dir) = args.output_dir {
                config = config.with_output_dir(output_dir);
            }

            for report in build_mock_stdstar_sky(&config, &masks)? {
                println!(
                    "{:<10} {:>10} {}",
                    report.selection.label,
                    report.selection.n_selected,
                    report.path.display()
                );
            }
        }
        Commands::Masks => print_masks(&masks),
    }

    Ok(())
}
