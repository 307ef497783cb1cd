//! Setu - sensor node relay daemon
//!
//! One thread per configured node keeps its link alive and queues validated
//! records; one relay thread forwards admitted records downstream.

use clap::Parser;
use setu::config::AppConfig;
use setu::error::{Error, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "setu", version, about = "Relay sensor node frames to a downstream consumer")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "setu.toml")]
    config: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Log from the start at info; the configured level applies once the file
    // is read. RUST_LOG, when set, owns the filter.
    let env_filter = std::env::var_os("RUST_LOG").is_some();
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Trace)
        .parse_default_env()
        .init();
    if !env_filter {
        log::set_max_level(log::LevelFilter::Info);
    }

    log::info!("Setu v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("Using config: {}", args.config.display());

    let config = AppConfig::from_file(&args.config)
        .and_then(|config| config.validate().map(|_| config))
        .inspect_err(|e| log::error!("Invalid config {}: {}", args.config.display(), e))?;

    if !env_filter {
        log::set_max_level(config.logging.level_filter()?);
    }

    if args.check {
        log::info!(
            "Configuration OK: {} nodes, {} players, downstream {}",
            config.nodes.len(),
            config.players().len(),
            config.relay.address
        );
        return Ok(());
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let relay = setu::app::start(&config, running)?;
    log::info!("Setu running. Press Ctrl-C to stop.");

    let summary = relay.join()?;
    for (label, stats) in &summary.links {
        log::info!("{}: {:?}", label, stats);
    }
    log::info!("Relay: {:?}", summary.relay);
    log::info!("Setu stopped");
    Ok(())
}
