//! Fretwise CLI
//!
//! Terminal front end for the fretwise practice engine.

mod cli;
mod commands;
mod live;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use fretwise_core::config::{FretwiseConfig, load_config};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("[MAIN] fretwise v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => {
            info!("[MAIN] Loading configuration from {}", path.display());
            load_config(path)?
        }
        None => FretwiseConfig::default(),
    };

    match cli.command {
        Commands::Tune { preset, string } => {
            live::run_tuner(config, preset.as_deref(), string.as_deref(), cli.json)
        }
        Commands::Verify { label, clip } => {
            live::run_verification(config, label.as_deref(), clip.as_deref(), cli.json)
        }
        Commands::Analyze { path } => commands::analyze(&config, &path, cli.json),
        Commands::Presets => commands::list_presets(&config),
        Commands::WriteConfig { path } => commands::write_config(&config, &path),
    }
}
