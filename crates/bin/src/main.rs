//! ratelens CLI binary.
//!
//! Runs the staging and analysis stages of the ratelens pipeline.

mod commands;

use clap::{Parser, Subcommand};
use ratelens::Config;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Config file looked up in the working directory when `--config` is absent.
const DEFAULT_CONFIG: &str = "ratelens.toml";

#[derive(Parser)]
#[command(name = "ratelens")]
#[command(about = "Equity returns against short-term rates", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./ratelens.toml, or built-in defaults when absent)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, transform and stage the raw sources
    Etl,

    /// Analyse the staged tables and write the final report
    Analyze,

    /// Run the stages enabled in the [run] section
    Run,

    /// Write the static CAC 40 sector table
    Sectors {
        /// Destination file (defaults to the configured sector source)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        let mut source = e.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {}", cause);
            source = cause.source();
        }
        process::exit(1);
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = load_config(cli.config.as_deref())?;
    let base = std::env::current_dir()?;
    let paths = config.resolve_paths(&base);

    match cli.command {
        Commands::Etl => commands::etl(&config, &paths)?,
        Commands::Analyze => commands::analyze(&config, &paths)?,
        Commands::Run => {
            if config.run.etl {
                commands::etl(&config, &paths)?;
            }
            if config.run.analysis {
                commands::analyze(&config, &paths)?;
            }
            if !config.run.etl && !config.run.analysis {
                warn!("Both stages are disabled in [run], nothing to do");
            }
        }
        Commands::Sectors { output } => {
            let output =
                output.unwrap_or_else(|| paths.input_dir.join(&config.sources.sectors));
            commands::sectors(&output)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config, ratelens::ConfigError> {
    match path {
        Some(path) => Config::load(path),
        None if Path::new(DEFAULT_CONFIG).is_file() => Config::load(Path::new(DEFAULT_CONFIG)),
        None => {
            warn!("No {} found, using built-in defaults", DEFAULT_CONFIG);
            Ok(Config::default())
        }
    }
}
