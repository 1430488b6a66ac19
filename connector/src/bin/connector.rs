//! Connector binary

use anyhow::Context;
use connector::config::LogFormat;
use connector::{Connector, ConnectorConfig, InMemoryPeerStore, PeerStore, TomlPeerStore};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

fn load_config() -> anyhow::Result<ConnectorConfig> {
    match std::env::var("CONNECTOR_CONFIG") {
        Ok(path) => {
            let mut config = ConnectorConfig::from_file(&path)
                .with_context(|| format!("loading config from {}", path))?;
            config.apply_env()?;
            config.validate()?;
            Ok(config)
        }
        Err(_) => Ok(ConnectorConfig::from_env()?),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(config.log_format);

    tracing::info!(
        "Starting connector (address: {}, global prefix: {})",
        config
            .ilp_address
            .as_ref()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "inherited from parent".into()),
        config.global_prefix
    );

    let store: Arc<dyn PeerStore> = match &config.store_path {
        Some(path) => {
            tracing::info!("Using peer store {}", path.display());
            Arc::new(TomlPeerStore::new(path))
        }
        None => Arc::new(InMemoryPeerStore::new()),
    };

    let connector = Arc::new(Connector::new(config)?.with_store(store));
    connector
        .load_from_store()
        .await
        .context("loading peers from store")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks = connector.spawn_background(shutdown_rx);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down connector");

    let _ = shutdown_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}
