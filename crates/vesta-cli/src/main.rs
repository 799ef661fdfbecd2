//! Vesta scenario runner
//!
//! Loads an engine configuration and a JSON scenario, executes it and prints
//! the receipts and resulting state root as JSON on stdout.

mod cli;
mod scenario;

use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use cli::Cli;
use scenario::Scenario;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vesta_executor::{Engine, EngineConfig};

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }

    let scenario = Scenario::load(&cli.scenario)?;
    tracing::info!(
        scenario = %cli.scenario.display(),
        blocks = scenario.blocks.len(),
        "running scenario"
    );

    let mut engine = Engine::open(config).context("failed to open engine")?;
    let cancel = AtomicBool::new(false);
    let result = scenario.run(&mut engine, &cancel);
    engine.close();
    let report = result?;

    let output = if cli.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", output);
    Ok(())
}
