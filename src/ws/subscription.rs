//! Subscriber registry for result fan-out.
//!
//! Tracks the listeners interested in result payloads and delivers each
//! payload to all of them, in registration order, isolating failures so
//! one misbehaving subscriber cannot starve the rest.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

/// A listener for result payloads.
///
/// Receives exactly the `result` field of each successful response record,
/// never the enclosing frame or its status.
pub trait Subscriber: Send + Sync {
    /// Handles one result payload.
    ///
    /// # Errors
    ///
    /// Any error is logged by the registry and does not affect delivery to
    /// other subscribers.
    fn on_result(&self, result: &Value) -> anyhow::Result<()>;
}

impl<F> Subscriber for F
where
    F: Fn(&Value) -> anyhow::Result<()> + Send + Sync,
{
    fn on_result(&self, result: &Value) -> anyhow::Result<()> {
        self(result)
    }
}

/// Outcome of delivering one payload to one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The subscriber returned `Ok`.
    Delivered,
    /// The subscriber returned an error.
    Failed(String),
    /// The subscriber panicked.
    Panicked(String),
}

impl DeliveryOutcome {
    /// Returns `true` if the subscriber handled the payload.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Append-only, ordered list of subscribers.
///
/// Cloning yields another handle to the same list.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    subscribers: Arc<RwLock<Vec<Arc<dyn Subscriber>>>>,
}

impl SubscriberRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a subscriber. Duplicates are kept; there is no removal.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        let mut subs = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        subs.push(subscriber);
        tracing::debug!(count = subs.len(), "subscriber registered");
    }

    /// Returns the number of registered subscribers.
    #[must_use]
    pub fn count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no subscriber is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Delivers `result` to every subscriber, in registration order.
    ///
    /// The list is snapshotted first, so a subscriber that registers another
    /// subscriber does not deadlock; the newcomer receives the next payload.
    /// Returns one [`DeliveryOutcome`] per subscriber, in the same order.
    pub fn fan_out(&self, result: &Value) -> Vec<DeliveryOutcome> {
        let snapshot: Vec<Arc<dyn Subscriber>> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        snapshot
            .iter()
            .enumerate()
            .map(|(index, subscriber)| deliver(index, subscriber.as_ref(), result))
            .collect()
    }
}

fn deliver(index: usize, subscriber: &dyn Subscriber, result: &Value) -> DeliveryOutcome {
    match std::panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_result(result))) {
        Ok(Ok(())) => DeliveryOutcome::Delivered,
        Ok(Err(err)) => {
            tracing::warn!(subscriber = index, error = %err, "subscriber failed");
            DeliveryOutcome::Failed(err.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(subscriber = index, panic = %message, "subscriber panicked");
            DeliveryOutcome::Panicked(message)
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("count", &self.count())
            .finish()
    }
}
