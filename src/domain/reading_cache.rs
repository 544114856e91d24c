//! Results cache: the connection subscriber that keeps the latest readings.
//!
//! [`ReadingCache`] sits one hop downstream of the connection. It ignores
//! write acknowledgments, replaces its contents on every `read` response,
//! and republishes a snapshot on its [`ReadingBus`]. Payloads of any other
//! shape are escalated as errors to the dispatcher.

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tokio::sync::broadcast;

use super::reading::{Reading, ResultPayload};
use super::reading_bus::{ReadingBus, Snapshot};
use crate::error::ClientError;
use crate::ws::Subscriber;

/// Latest readings received from the service.
#[derive(Debug)]
pub struct ReadingCache {
    readings: RwLock<Snapshot>,
    bus: ReadingBus,
}

impl ReadingCache {
    /// Creates an empty cache whose snapshot bus has the given capacity.
    #[must_use]
    pub fn new(bus_capacity: usize) -> Self {
        Self {
            readings: RwLock::new(Arc::from(Vec::new())),
            bus: ReadingBus::new(bus_capacity),
        }
    }

    /// Handles one result payload.
    ///
    /// Returns `true` if the cache was refreshed.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnknownResultShape`] if the payload is neither
    /// a number nor an array of `[timestamp, value]` pairs. The cache is
    /// left untouched in that case.
    pub fn handle_message(&self, result: &Value) -> Result<bool, ClientError> {
        match ResultPayload::parse(result)? {
            ResultPayload::WriteAck(value) => {
                tracing::debug!(value, "write acknowledged");
                Ok(false)
            }
            ResultPayload::Readings(readings) => {
                let snapshot: Snapshot = Arc::from(readings);
                *self
                    .readings
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);
                let receivers = self.bus.publish(snapshot);
                tracing::debug!(receivers, "reading cache refreshed");
                Ok(true)
            }
        }
    }

    /// Returns a copy of the cached readings, newest first.
    #[must_use]
    pub fn latest(&self) -> Vec<Reading> {
        self.readings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .to_vec()
    }

    /// Returns a receiver for every future snapshot.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Snapshot> {
        self.bus.subscribe()
    }
}

impl Default for ReadingCache {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Subscriber for ReadingCache {
    fn on_result(&self, result: &Value) -> anyhow::Result<()> {
        self.handle_message(result)?;
        Ok(())
    }
}
