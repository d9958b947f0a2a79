//! bgloc - Background location service runner
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::eyre;
use tracing::{error, info};

use background_location::{run_scenario, Scenario};
use bgloc_service::config::{default_settings_path, init_settings_file, load_settings};
use bgloc_service::Settings;

/// bgloc - Background location service runner
#[derive(Parser, Debug)]
#[command(name = "bgloc")]
#[command(about = "Run scripted scenarios against the background location service", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a scenario file and print events as NDJSON
    Run {
        /// Scenario TOML file
        #[arg(value_name = "SCENARIO")]
        scenario: PathBuf,

        /// Settings file (defaults to the user config directory)
        #[arg(long, value_name = "PATH")]
        settings: Option<PathBuf>,
    },

    /// Write a default settings file if none exists
    InitSettings {
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    bgloc_core::logging::init()?;

    let args = Args::parse();

    match args.command {
        Command::Run { scenario, settings } => {
            let settings = match settings.or_else(default_settings_path) {
                Some(path) => load_settings(&path),
                None => Settings::default(),
            };
            let scenario = Scenario::load(&scenario)?;

            let mut stdout = std::io::stdout();
            let result = run_scenario(&scenario, settings, &mut stdout).await;
            if let Err(ref e) = result {
                error!("Scenario error: {:?}", e);
            }
            result?;
        }

        Command::InitSettings { path } => {
            let path = path
                .or_else(default_settings_path)
                .ok_or_else(|| eyre!("No config directory available; pass a path"))?;

            if init_settings_file(&path)? {
                info!("Created {}", path.display());
                eprintln!("Created {}", path.display());
            } else {
                eprintln!("Settings already exist at {}", path.display());
            }
        }
    }

    Ok(())
}
