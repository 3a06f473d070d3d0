// src/main.rs

//! The `spinelink` command-line client: connects, subscribes to the configured
//! channels, and prints every message until Ctrl-C.

use anyhow::{Context, Result};
use spinelink::config::ClientConfig;
use spinelink::core::transport::{MemoryConnector, RespConnector};
use spinelink::core::{ConnectionManager, HostContext};
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::filter::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "spinelink.toml";

/// How long the main loop waits for host jobs before checking for shutdown again.
const PUMP_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("SpinelLink version {VERSION}");
        return Ok(());
    }

    let explicit_path = args
        .iter()
        .position(|arg| arg == "--config")
        .map(|i| args.get(i + 1).map(|s| s.as_str()));
    let config = match explicit_path {
        Some(None) => {
            eprintln!("--config flag requires a value");
            std::process::exit(1);
        }
        Some(Some(path)) => load_config(path)?,
        // The default path is optional.
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => load_config(DEFAULT_CONFIG_PATH)?,
        None => ClientConfig::default(),
    };
    let use_memory = args.contains(&"--memory".to_string());

    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .compact()
        .with_ansi(true)
        .init();

    if let Err(e) = run(config, use_memory).await {
        error!("Client runtime error: {:#}", e);
        return Err(e);
    }
    Ok(())
}

fn load_config(path: &str) -> Result<ClientConfig> {
    ClientConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from \"{path}\""))
}

async fn run(config: ClientConfig, use_memory: bool) -> Result<()> {
    let mut host = HostContext::new();
    let manager = if use_memory {
        info!("Using the in-process store.");
        ConnectionManager::new(MemoryConnector::default(), host.sender())
    } else {
        ConnectionManager::new(RespConnector, host.sender())
    }
    .with_subscriber_config(config.subscriber.clone());

    let handle = manager
        .connect(config.connection.clone())
        .await
        .context("Failed to connect")?;
    info!("Connected to {} as connection #{}.", handle.config().addr(), handle.id());

    if config.subscriber.channels.is_empty() {
        warn!("No channels configured under [subscriber]; nothing to receive.");
    } else {
        manager
            .subscribe(config.subscriber.channels.clone(), |channel, message| {
                println!("[{channel}] {message}");
            })
            .await
            .context("Failed to start the subscriber")?;
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Shutdown signal received.");
                break;
            }
            _ = host.pump_wait(PUMP_INTERVAL) => {}
        }
    }

    manager.unsubscribe().await;
    host.pump();
    if !manager.disconnect().await {
        warn!("The connection did not close cleanly.");
    }
    Ok(())
}
