//! Batched request builder.
//!
//! ```ignore
//! connection
//!     .build()?
//!     .write_call(65)
//!     .and_then()
//!     .read_latest_call(Some(5))
//!     .send()?;
//! ```
//!
//! Every call added to one builder goes out in a single frame. `send` takes
//! the builder by value, so a batch can neither be extended nor re-sent
//! after it has been transmitted.

use tokio::sync::mpsc;

use super::messages::{BatchRequest, Call};
use crate::config::DEFAULT_READ_LIMIT;
use crate::error::ClientError;

/// Accumulates calls and transmits them as one batch frame.
#[derive(Debug)]
#[must_use = "a request builder does nothing until `send` is called"]
pub struct RequestBuilder {
    outbound: mpsc::UnboundedSender<String>,
    alias: String,
    calls: Vec<Call>,
}

impl RequestBuilder {
    /// Creates an empty builder writing to the given outbound channel.
    pub(crate) fn new(outbound: mpsc::UnboundedSender<String>, alias: impl Into<String>) -> Self {
        Self {
            outbound,
            alias: alias.into(),
            calls: Vec::new(),
        }
    }

    /// Appends a `write` call for `value`.
    ///
    /// The value is sent in its textual form (`65` as `"65"`, `21.5` as
    /// `"21.5"`). It is not validated here.
    pub fn write_call(mut self, value: impl Into<f64>) -> Self {
        self.calls.push(Call::write(&self.alias, value.into()));
        self
    }

    /// Appends a `read` call for the newest `limit` values.
    ///
    /// `None` and `Some(0)` both request the default of 5.
    pub fn read_latest_call(mut self, limit: Option<u32>) -> Self {
        let limit = limit.filter(|&n| n > 0).unwrap_or(DEFAULT_READ_LIMIT);
        self.calls.push(Call::read(&self.alias, limit));
        self
    }

    /// Returns the builder unchanged, for readable chains.
    pub fn and_then(self) -> Self {
        self
    }

    /// Returns the calls accumulated so far, in insertion order.
    #[must_use]
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// Returns the number of accumulated calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Returns `true` if no call has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Serializes the batch into one frame and queues it for transmission.
    ///
    /// Delivery is fire-and-forget: responses arrive through the
    /// connection's subscribers, and transmission failures are logged by
    /// the connection task.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Json`] if the batch cannot be serialized, or
    /// [`ClientError::ConnectionClosed`] if the connection task has ended.
    pub fn send(self) -> Result<(), ClientError> {
        let frame = serde_json::to_string(&BatchRequest { calls: &self.calls })?;
        self.outbound
            .send(frame)
            .map_err(|_| ClientError::ConnectionClosed("outbound channel closed".to_string()))?;
        tracing::debug!(calls = self.calls.len(), "batch queued");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn builder() -> (RequestBuilder, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (RequestBuilder::new(tx, "temperature"), rx)
    }

    fn next_frame(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
        let Ok(text) = rx.try_recv() else {
            panic!("expected a queued frame");
        };
        let Ok(value) = serde_json::from_str(&text) else {
            panic!("frame is not JSON: {text}");
        };
        value
    }

    #[test]
    fn write_then_read_is_one_frame_in_order() {
        let (b, mut rx) = builder();
        let sent = b.write_call(65).and_then().read_latest_call(Some(5)).send();
        tokio_test::assert_ok!(sent);

        assert_eq!(
            next_frame(&mut rx),
            json!({"calls": [
                {"id": 1, "procedure": "write", "arguments": [{"alias": "temperature"}, "65"]},
                {
                    "id": 1,
                    "procedure": "read",
                    "arguments": [{"alias": "temperature"}, {"limit": 5}]
                }
            ]})
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn read_limit_defaults_to_five() {
        let (b, _rx) = builder();
        let b = b
            .read_latest_call(None)
            .read_latest_call(Some(0))
            .read_latest_call(Some(5));
        let calls = b.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.windows(2).all(|w| w.first() == w.get(1)));
    }

    #[test]
    fn explicit_limit_is_kept() {
        let (b, mut rx) = builder();
        tokio_test::assert_ok!(b.read_latest_call(Some(12)).send());
        assert_eq!(
            next_frame(&mut rx).pointer("/calls/0/arguments/1/limit"),
            Some(&json!(12))
        );
    }

    #[test]
    fn n_calls_produce_one_frame_with_n_descriptors() {
        for n in 0..6_u8 {
            let (mut b, mut rx) = builder();
            for i in 0..n {
                b = b.write_call(i);
            }
            assert_eq!(b.len(), usize::from(n));
            tokio_test::assert_ok!(b.send());

            let frame = next_frame(&mut rx);
            let Some(calls) = frame.get("calls").and_then(Value::as_array) else {
                panic!("missing calls array");
            };
            assert_eq!(calls.len(), usize::from(n));
            for (i, call) in calls.iter().enumerate() {
                assert_eq!(
                    call.pointer("/arguments/1"),
                    Some(&json!(i.to_string())),
                    "call order"
                );
            }
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn send_after_connection_gone_fails() {
        let (b, rx) = builder();
        drop(rx);
        let result = b.write_call(1).send();
        assert!(matches!(result, Err(ClientError::ConnectionClosed(_))));
    }

    #[test]
    fn builder_uses_configured_alias() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let b = RequestBuilder::new(tx, "humidity").write_call(40.5);
        let Some(call) = b.calls().first() else {
            panic!("expected a call");
        };
        assert_eq!(
            serde_json::to_value(call).ok(),
            Some(json!({
                "id": 1,
                "procedure": "write",
                "arguments": [{"alias": "humidity"}, "40.5"]
            }))
        );
    }
}
