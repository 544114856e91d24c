//! Client error types.
//!
//! [`ClientError`] is the central error type for the crate. None of these
//! errors terminate a live connection on their own: inbound failures are
//! logged at the connection boundary and processing moves on to the next
//! record or frame.

use crate::ws::state::ConnectionState;

/// Client-side error enum.
///
/// # Categories
///
/// | Variants                                               | Category      |
/// |--------------------------------------------------------|---------------|
/// | `ConnectionClosed`, `AuthTimeout`                      | Transport     |
/// | `Json`, `MalformedFrame`, `RecordRejected`             | Frame codec   |
/// | `InvalidTransition`, `AlreadyStarted`, `NotStarted`    | Lifecycle     |
/// | `UnknownResultShape`, `InvalidTemperature`             | Collaborators |
/// | `Config`                                               | Startup       |
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// JSON failure in either direction: an inbound frame that does not
    /// parse, or an outbound batch that does not serialize.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A frame parsed as JSON but is neither a record nor an array of records,
    /// or a batch element is not a record object.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A response record carried a non-`ok` status or an error field.
    #[error("record rejected (status: {status}, error: {error})")]
    RecordRejected {
        /// Status value as received, or `"<missing>"`.
        status: String,
        /// Error value as received, or `"<none>"`.
        error: String,
    },

    /// A lifecycle transition that the state machine does not allow.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// State the connection was in.
        from: ConnectionState,
        /// State that was requested.
        to: ConnectionState,
    },

    /// `start` was invoked on a connection that is already started.
    #[error("connection already started")]
    AlreadyStarted,

    /// An operation that needs a started connection was attempted before `start`.
    #[error("connection not started")]
    NotStarted,

    /// The connection task is gone or the socket closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// No authentication acknowledgment arrived within the configured timeout.
    #[error("authentication not acknowledged within {timeout_secs} s")]
    AuthTimeout {
        /// Configured timeout in seconds.
        timeout_secs: u64,
    },

    /// A result payload that is neither a number nor an array of readings.
    #[error("unknown result shape: {0}")]
    UnknownResultShape(String),

    /// A temperature outside the accepted range, or not a number.
    #[error("invalid temperature: {0}")]
    InvalidTemperature(String),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),
}

impl ClientError {
    /// Returns `true` for errors that originate from a single inbound frame
    /// or record and leave the connection usable.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Json(_)
                | Self::MalformedFrame(_)
                | Self::RecordRejected { .. }
                | Self::UnknownResultShape(_)
                | Self::InvalidTemperature(_)
        )
    }
}
