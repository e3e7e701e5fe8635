//! hostlink Agent Daemon
//!
//! The agent runs on each host and keeps one outbound WebSocket to the
//! broker, serving the proxied sessions the broker opens over it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hl_agent::tunnel::{ExponentialBackoff, HandlerTable, TunnelConnector};
use hl_agent::ProxyHandler;
use hl_core::auth::SharedKeyValidator;
use hl_core::config::{self, AgentConfig};
use hl_core::error::ConfigError;

#[derive(Parser)]
#[command(name = "hl-agent")]
#[command(about = "hostlink agent - serves broker sessions over an outbound WebSocket")]
#[command(version)]
struct Args {
    /// Broker endpoint to dial
    /// Example: ws://broker.internal:8080/v1/connectbackend
    #[arg(long, env = "HL_PROXY_URL")]
    proxy_url: Option<String>,

    /// Token presented to the broker when connecting
    #[arg(long, env = "HL_TOKEN")]
    token: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("hostlink agent starting...");

    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let mut config = match config::load_config::<AgentConfig>(&config_path) {
        Ok(config) => config,
        Err(ConfigError::NotFound(_)) if args.config.is_none() => {
            tracing::debug!("No config at {:?}, using defaults", config_path);
            AgentConfig::default()
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to load config from {:?}", config_path))
        }
    };

    if let Some(proxy_url) = args.proxy_url {
        config.proxy_url = proxy_url;
    }
    if let Some(token) = args.token {
        config.token = Some(token);
    }

    let handlers = Arc::new(build_handlers(&config)?);
    tracing::info!(
        "Serving {} route(s); proxy under {}",
        handlers.len(),
        config.proxy.path_prefix
    );

    let connector = TunnelConnector::new(config.clone(), handlers);

    let mut backoff = ExponentialBackoff::from_config(&config.backoff);
    loop {
        let tunnel = connector
            .connect_with_retry(&mut backoff)
            .await
            .context("Failed to connect to broker")?;

        match tunnel.run().await {
            Ok(reason) => tracing::warn!("Disconnected: {:?}", reason),
            Err(e) => tracing::warn!("Connection lost: {}", e),
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
        tracing::info!("Reconnecting...");
    }
}

fn build_handlers(config: &AgentConfig) -> Result<HandlerTable> {
    let mut proxy = ProxyHandler::new(config.proxy.insecure_skip_verify)
        .context("Failed to create proxy handler")?;

    if config.auth.enabled {
        let key = config
            .auth
            .shared_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .context("auth.enabled is set but auth.shared_key is empty")?;
        proxy = proxy.with_validator(Arc::new(SharedKeyValidator::new(key)));
        tracing::info!("Session token validation enabled");
    }

    let table = HandlerTable::builder()
        .register(&config.proxy.path_prefix, Arc::new(proxy))?
        .build();
    Ok(table)
}
