//! telemetry-ws entry point.
//!
//! Connects to the telemetry service, subscribes the reading cache once
//! authenticated, requests the latest readings (optionally logging a new
//! temperature first), and prints a report for every refresh.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use telemetry_ws::config::ClientConfig;
use telemetry_ws::domain::{ReadingCache, is_valid_temperature, log_temperature, report};
use telemetry_ws::error::ClientError;
use telemetry_ws::ws::{Connection, Subscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = ClientConfig::from_env()?;
    let write_value = write_value_from_env()?;
    tracing::info!(url = %config.url, alias = %config.alias, "starting telemetry-ws");

    // Build collaborators
    let cache = Arc::new(ReadingCache::new(config.reading_bus_capacity));
    let mut snapshots = cache.subscribe();
    let connection = Connection::new(&config);

    // Wire the cache and the first request once authenticated
    let on_ready = {
        let handle = connection.downgrade();
        let cache = Arc::clone(&cache);
        let read_limit = config.read_limit;
        move || {
            let Some(connection) = handle.upgrade() else {
                return;
            };
            connection.subscribe(cache as Arc<dyn Subscriber>);
            let sent = match write_value {
                Some(value) => log_temperature(&connection, value, read_limit),
                None => connection
                    .build()
                    .and_then(|b| b.read_latest_call(Some(read_limit)).send()),
            };
            if let Err(err) = sent {
                tracing::error!(error = %err, "initial request failed");
            }
        }
    };
    connection.start(on_ready)?;

    loop {
        tokio::select! {
            snapshot = snapshots.recv() => {
                match snapshot {
                    Ok(readings) => tracing::info!("\n{}", report::render(&readings)),
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "report listener lagged behind cache");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            reason = connection.closed() => {
                tracing::warn!(%reason, "connection closed");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Reads `TELEMETRY_WRITE_VALUE`, if set.
fn write_value_from_env() -> Result<Option<f64>, ClientError> {
    let Ok(raw) = std::env::var("TELEMETRY_WRITE_VALUE") else {
        return Ok(None);
    };
    if !is_valid_temperature(&raw) {
        return Err(ClientError::InvalidTemperature(raw));
    }
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| ClientError::InvalidTemperature(raw))
}
