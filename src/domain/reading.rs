//! Telemetry readings and result payload interpretation.
//!
//! The service answers a `write` with the written number and a `read` with
//! an array of `[timestamp, value]` pairs, newest first. Timestamps are
//! epoch seconds; scaling them by 1000 yields epoch milliseconds.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::ClientError;

/// One timestamped value read back from the service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    /// When the value was recorded.
    pub timestamp: DateTime<Utc>,
    /// Recorded value.
    pub value: f64,
}

impl Reading {
    /// Converts one `[epoch_seconds, value]` pair.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnknownResultShape`] if `pair` is not a
    /// two-element array of numbers, or the timestamp is out of range.
    pub fn from_pair(pair: &Value) -> Result<Self, ClientError> {
        let shape_error = || ClientError::UnknownResultShape(pair.to_string());

        let Some([ts, value]) = pair.as_array().map(Vec::as_slice) else {
            return Err(shape_error());
        };
        let value = value.as_f64().ok_or_else(shape_error)?;
        let timestamp = match ts.as_i64() {
            Some(secs) => DateTime::from_timestamp(secs, 0),
            None => ts
                .as_f64()
                .filter(|secs| secs.is_finite())
                .and_then(|secs| DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)),
        }
        .ok_or_else(shape_error)?;

        Ok(Self { timestamp, value })
    }
}

/// Interpretation of a result payload forwarded by the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultPayload {
    /// Acknowledgment of a `write`, echoing the written number.
    WriteAck(f64),
    /// Response to a `read`, in the order the service sent them.
    Readings(Vec<Reading>),
}

impl ResultPayload {
    /// Interprets a result payload.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnknownResultShape`] if the payload is neither
    /// a number nor an array of `[timestamp, value]` pairs.
    pub fn parse(result: &Value) -> Result<Self, ClientError> {
        match result {
            Value::Number(n) => n
                .as_f64()
                .map(Self::WriteAck)
                .ok_or_else(|| ClientError::UnknownResultShape(result.to_string())),
            Value::Array(pairs) => pairs
                .iter()
                .map(Reading::from_pair)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Readings),
            other => Err(ClientError::UnknownResultShape(other.to_string())),
        }
    }
}
