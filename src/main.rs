//! Cloud Streamer server
//!
//! Loads configuration, sets up logging and serves until Ctrl-C.

use anyhow::Context;
use cloud_streamer::{CloudKitResolver, StreamServer, StreamerConfig};
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "cloud_streamer.yaml";

/// Main entry point
///
/// # Usage
/// ```bash
/// # Start with default config (cloud_streamer.yaml, or built-in defaults)
/// cloud-streamer
///
/// # Start with custom config
/// cloud-streamer /path/to/config.yaml
/// ```
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let explicit_path = env::args().nth(1);
    let mut config = load_config(explicit_path.as_deref())?;
    config.apply_env_overrides();
    config.validate().context("invalid configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level()?)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting Cloud Streamer");
    info!("  - Listen address: {}", config.listen_address);
    info!("  - Public base URL: {}", config.public_base_url);
    info!("  - Lookup endpoint: {}", config.lookup_endpoint);
    info!("  - Resolve timeout: {}s", config.resolve_timeout_secs);
    info!(
        "  - Upstream timeouts: connect {}s, read {}s",
        config.upstream_connect_timeout_secs, config.upstream_read_timeout_secs
    );

    let resolver = Arc::new(
        CloudKitResolver::from_config(&config).context("failed to create resolver")?,
    );
    let server = StreamServer::bind(config, resolver)
        .await
        .context("failed to start server")?;

    server
        .run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl-C, shutting down"),
                Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
            }
        })
        .await?;

    Ok(())
}

/// An explicit path must load; the default path may be absent
fn load_config(explicit_path: Option<&str>) -> anyhow::Result<StreamerConfig> {
    match explicit_path {
        Some(path) => StreamerConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path)),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            StreamerConfig::from_file(DEFAULT_CONFIG_PATH)
                .with_context(|| format!("failed to load configuration from {}", DEFAULT_CONFIG_PATH))
        }
        None => {
            // Logging is not initialised yet
            eprintln!(
                "{} not found, using built-in defaults",
                DEFAULT_CONFIG_PATH
            );
            Ok(StreamerConfig::default())
        }
    }
}
