//! evo-server - agent evolution engine over HTTP
//!
//! Usage:
//!   evo-server                          Serve with .evo/config.toml (or defaults)
//!   evo-server --bind 0.0.0.0:8080      Override the listen address
//!   evo-server --init                   Write a default .evo/config.toml and exit

use anyhow::{Context, Result};
use clap::Parser;
use evo_core::EvoConfig;
use evo_engine::EvolutionEngine;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "evo-server")]
#[command(author, version, about = "Agent evolution engine")]
struct Cli {
    /// Project root holding .evo/
    #[arg(long, default_value = ".")]
    config_root: PathBuf,

    /// Listen address, overrides server.bind
    #[arg(long)]
    bind: Option<String>,

    /// Write the default configuration and exit
    #[arg(long)]
    init: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if cli.init {
        EvoConfig::write_default(&cli.config_root).context("Failed to write default config")?;
        info!(
            "Wrote {}",
            cli.config_root.join(".evo/config.toml").display()
        );
        return Ok(());
    }

    let config = EvoConfig::load_or_default(&cli.config_root).context("Failed to load config")?;
    let bind = cli.bind.unwrap_or_else(|| config.server.bind.clone());

    let engine = EvolutionEngine::open(&cli.config_root, config)
        .await
        .context("Failed to open evo store")?;

    evo_server::serve(engine, &bind).await
}
