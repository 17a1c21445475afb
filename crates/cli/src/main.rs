//! Ad mediation CLI for settings management and simulated sessions.
//!
//! This tool provides commands for:
//! - Validating settings files
//! - Computing settings hashes
//! - Printing the merged settings with every default filled in
//! - Running a mediation session against the simulated network backends

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod config;
mod error;
mod hash;
mod simulate;
mod store;

use ad_mediation_common::mediation::types::AdSurfaceType;
use error::CliError;

#[derive(Parser)]
#[command(name = "admedctl")]
#[command(about = "Ad mediation CLI for settings and simulated sessions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Settings management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run shows against the simulated backends
    Simulate {
        /// Path to the TOML settings file (embedded defaults when omitted)
        #[arg(long, short)]
        file: Option<PathBuf>,

        /// Surface to show
        #[arg(long, short, value_enum, default_value = "rewarded")]
        surface: SurfaceArg,

        /// Number of shows to attempt
        #[arg(long, default_value_t = 3)]
        shows: u32,

        /// Content unlocked by a completed rewarded show
        #[arg(long)]
        content_id: Option<String>,

        /// Gate interval override in milliseconds
        #[arg(long)]
        min_interval_ms: Option<u64>,

        /// JSON file persisting provider ordering between runs
        #[arg(long)]
        store: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate settings against schema and cross-field rules
    Validate {
        /// Path to the TOML settings file
        #[arg(long, short)]
        file: PathBuf,
    },

    /// Compute and display settings hash (SHA-256)
    Hash {
        /// Path to the TOML settings file
        #[arg(long, short)]
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Hash the raw file without applying defaults and environment overrides
        #[arg(long)]
        raw: bool,
    },

    /// Print the merged settings as TOML
    Show {
        /// Path to the TOML settings file
        #[arg(long, short)]
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum SurfaceArg {
    Banner,
    Interstitial,
    Rewarded,
    Native,
}

impl From<SurfaceArg> for AdSurfaceType {
    fn from(surface: SurfaceArg) -> Self {
        match surface {
            SurfaceArg::Banner => AdSurfaceType::Banner,
            SurfaceArg::Interstitial => AdSurfaceType::Interstitial,
            SurfaceArg::Rewarded => AdSurfaceType::Rewarded,
            SurfaceArg::Native => AdSurfaceType::Native,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    ad_mediation_common::logging::init_logging(level)
        .map_err(|e| CliError::Config(format!("{e:?}")))?;

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Validate { file } => config::validate(file, cli.verbose),
            ConfigAction::Hash { file, format, raw } => {
                hash::compute_and_display(file, format, raw, cli.verbose)
            }
            ConfigAction::Show { file } => config::show(file, cli.verbose),
        },
        Commands::Simulate {
            file,
            surface,
            shows,
            content_id,
            min_interval_ms,
            store,
            format,
        } => simulate::run(
            &simulate::SimulationRequest {
                file,
                surface: surface.into(),
                shows,
                content_id,
                min_interval_ms,
                store,
            },
            format,
            cli.verbose,
        ),
    }
}
