//! Feedit server
//!
//! Loads configuration, sets up logging and serves the stream front end
//! (plus the optional metrics endpoint) until interrupted.

use anyhow::Context;
use feedit::{FeedConfig, MetricsEndpoint, StreamServer, StreamingProxy};
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Main entry point
///
/// # Usage
/// ```bash
/// # Start with built-in defaults
/// feedit
///
/// # Start with a config file
/// feedit /path/to/feedit.yaml
/// ```
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = env::args().nth(1);

    let config = match &config_path {
        Some(path) => FeedConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path))?,
        None => FeedConfig::default(),
    };

    let level = if config.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting feedit");
    match &config_path {
        Some(path) => info!("Configuration loaded from {}", path),
        None => info!("No configuration file given, using defaults"),
    }

    let listen: SocketAddr = config
        .listen_address
        .parse()
        .with_context(|| format!("invalid listen_address {:?}", config.listen_address))?;

    let config = Arc::new(config);
    let proxy = Arc::new(StreamingProxy::new(Arc::clone(&config)).context("failed to create proxy")?);

    if let Some(endpoint) = config.metrics_endpoint.as_ref().filter(|m| m.enabled) {
        match endpoint.address.parse::<SocketAddr>() {
            Ok(addr) => {
                let metrics = MetricsEndpoint::new(proxy.metrics().clone(), addr);
                tokio::spawn(async move {
                    if let Err(e) = metrics.start().await {
                        error!("Metrics endpoint stopped: {}", e);
                    }
                });
            }
            Err(e) => warn!(
                "Invalid metrics endpoint address {:?}, metrics disabled: {}",
                endpoint.address, e
            ),
        }
    }

    let server = StreamServer::new(proxy);

    tokio::select! {
        result = server.start(listen) => {
            result.with_context(|| format!("stream server on {} failed", listen))?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    info!("feedit stopped");
    Ok(())
}
