//! Wire message types: authentication, call batches, and response records.
//!
//! Every frame is a single JSON text document.
//!
//! ```text
//! → {"auth": {"cik": "<token>"}}
//! → {"calls": [{"id": 1, "procedure": "write", "arguments": [{"alias": "temperature"}, "65"]}]}
//! ← {"status": "ok"}
//! ← [{"status": "ok", "result": 42}, {"status": "ok", "result": [[1700000000, 21.5]]}]
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;

/// Call identifier stamped on every call.
///
/// Responses arrive in call order, so the id is never used to multiplex.
pub const CALL_ID: u32 = 1;

/// Outbound authentication frame.
#[derive(Debug, Clone, Serialize)]
pub struct AuthRequest {
    /// Credential payload.
    pub auth: AuthCredentials,
}

/// Credential payload of an [`AuthRequest`].
#[derive(Debug, Clone, Serialize)]
pub struct AuthCredentials {
    /// Client interface key.
    pub cik: String,
}

impl AuthRequest {
    /// Creates an authentication request for the given key.
    #[must_use]
    pub fn new(cik: impl Into<String>) -> Self {
        Self {
            auth: AuthCredentials { cik: cik.into() },
        }
    }
}

/// Remote procedure invoked by a [`Call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Procedure {
    /// Write a scalar to the data source.
    Write,
    /// Read recent values from the data source.
    Read,
}

/// Positional argument of a [`Call`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CallArgument {
    /// Data source selector, always the first argument.
    Alias {
        /// Alias of the data source.
        alias: String,
    },
    /// Scalar to write, as a decimal string.
    Value(String),
    /// Read options.
    Limit {
        /// Maximum number of values to return, newest first.
        limit: u32,
    },
}

/// One logical remote operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Call {
    /// Always [`CALL_ID`].
    pub id: u32,
    /// Procedure name.
    pub procedure: Procedure,
    /// Positional arguments; shape depends on `procedure`.
    pub arguments: Vec<CallArgument>,
}

impl Call {
    /// Builds a `write` call carrying `value` in its textual form.
    #[must_use]
    pub fn write(alias: &str, value: f64) -> Self {
        Self {
            id: CALL_ID,
            procedure: Procedure::Write,
            arguments: vec![
                CallArgument::Alias {
                    alias: alias.to_string(),
                },
                CallArgument::Value(value.to_string()),
            ],
        }
    }

    /// Builds a `read` call for the newest `limit` values.
    #[must_use]
    pub fn read(alias: &str, limit: u32) -> Self {
        Self {
            id: CALL_ID,
            procedure: Procedure::Read,
            arguments: vec![
                CallArgument::Alias {
                    alias: alias.to_string(),
                },
                CallArgument::Limit { limit },
            ],
        }
    }
}

/// Outbound batch frame.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRequest<'a> {
    /// Calls in insertion order.
    pub calls: &'a [Call],
}

/// A single inbound response record.
///
/// `status` is kept as a raw value so a non-string status is classified as
/// a rejected record instead of failing the whole frame. JSON `null` in
/// `error` or `result` is treated as absent. A batch element that is not an
/// object becomes a record carrying only `malformed`, which is always
/// rejected.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResponseRecord {
    /// `"ok"` on success.
    #[serde(default)]
    pub status: Option<Value>,
    /// Error detail, if any.
    #[serde(default)]
    pub error: Option<Value>,
    /// Result payload, if any.
    #[serde(default)]
    pub result: Option<Value>,
    /// Why the batch element could not be read as a record.
    #[serde(skip)]
    pub malformed: Option<String>,
}

/// How the connection must treat a [`ResponseRecord`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordKind<'a> {
    /// Non-`ok` status or error present.
    Rejected,
    /// `ok` with a result payload to fan out.
    Data(&'a Value),
    /// `ok` with neither result nor error: authentication acknowledgment.
    Acknowledgment,
}

impl ResponseRecord {
    /// A placeholder for a batch element that is not a record object.
    #[must_use]
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self {
            malformed: Some(detail.into()),
            ..Self::default()
        }
    }

    /// Classifies this record.
    #[must_use]
    pub fn kind(&self) -> RecordKind<'_> {
        let ok = self.status.as_ref().and_then(Value::as_str) == Some("ok");
        if !ok || self.error.is_some() || self.malformed.is_some() {
            return RecordKind::Rejected;
        }
        match &self.result {
            Some(result) => RecordKind::Data(result),
            None => RecordKind::Acknowledgment,
        }
    }

    /// Converts a rejected record into the error reported for it.
    #[must_use]
    pub fn rejection(&self) -> ClientError {
        if let Some(detail) = &self.malformed {
            return ClientError::MalformedFrame(detail.clone());
        }
        ClientError::RecordRejected {
            status: self
                .status
                .as_ref()
                .map_or_else(|| "<missing>".to_string(), render_value),
            error: self
                .error
                .as_ref()
                .map_or_else(|| "<none>".to_string(), render_value),
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// An inbound frame: one record or a batch of records.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Response to a batch of calls.
    Batch(Vec<ResponseRecord>),
    /// Response to a single call or to authentication.
    Single(ResponseRecord),
}

impl InboundFrame {
    /// Interprets a parsed JSON document as a frame.
    ///
    /// A top-level document must be an object or an array. Array elements
    /// that are not objects become [`ResponseRecord::malformed`] entries so
    /// their siblings are still processed.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MalformedFrame`] if the document is neither an
    /// object nor an array.
    pub fn from_value(value: Value) -> Result<Self, ClientError> {
        match value {
            Value::Array(items) => Ok(Self::Batch(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| {
                        record_from_value(item).unwrap_or_else(|e| {
                            ResponseRecord::malformed(format!("record {index}: {e}"))
                        })
                    })
                    .collect(),
            )),
            other => record_from_value(other)
                .map(Self::Single)
                .map_err(ClientError::MalformedFrame),
        }
    }

    /// Returns the records in frame order; a single record becomes a
    /// one-element sequence.
    #[must_use]
    pub fn into_records(self) -> Vec<ResponseRecord> {
        match self {
            Self::Batch(records) => records,
            Self::Single(record) => vec![record],
        }
    }
}

fn record_from_value(value: Value) -> Result<ResponseRecord, String> {
    if !value.is_object() {
        return Err(format!("expected a record object, got {value}"));
    }
    ResponseRecord::deserialize(value).map_err(|e| e.to_string())
}

/// Decodes a text frame into its records.
///
/// # Errors
///
/// Returns [`ClientError::Json`] if `text` is not JSON, or
/// [`ClientError::MalformedFrame`] if it is JSON of the wrong shape.
pub fn decode_frame(text: &str) -> Result<Vec<ResponseRecord>, ClientError> {
    let value: Value = serde_json::from_str(text)?;
    Ok(InboundFrame::from_value(value)?.into_records())
}
