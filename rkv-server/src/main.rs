use std::env;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rkv_engine::{KVEngine, MemoryEngine};
use rkv_server::{serve, ConfigSource, Metrics, ServerConfig};

const DEFAULT_CONFIG_PATH: &str = "rkv-server.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let (config, source) = ServerConfig::load(&path)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    if source == ConfigSource::Defaults {
        info!(path = %path, "config file not found, using defaults");
    }

    let engine = Arc::new(MemoryEngine::with_sweep_interval(config.sweep_interval()));
    let metrics = Arc::new(Metrics::new());

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(addr = %addr, sweep_ms = config.sweep_interval_ms, "rkv-server listening");

    tokio::select! {
        result = serve(listener, engine.clone(), metrics) => {
            if let Err(err) = result {
                error!(error = %err, "accept loop failed");
            }
        }
        _ = signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
        }
    }

    engine.close()?;
    Ok(())
}
