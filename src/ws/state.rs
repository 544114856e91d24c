//! Connection lifecycle state machine.
//!
//! ```text
//! Uninitialized ──start──▶ Connecting ──open──▶ Authenticating ──ack──▶ Ready
//!        │                     │                      │                  │
//!        └─────────────────────┴──────────────────────┴──────────────────┴──▶ Closed
//! ```
//!
//! Transitions are one-way. [`Lifecycle`] publishes the current state on a
//! [`tokio::sync::watch`] channel so callers can await readiness, and
//! [`ReadyLatch`] ties the completion callback to the single
//! `Authenticating → Ready` transition.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use crate::error::ClientError;

/// Why a connection reached [`ConnectionState::Closed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The WebSocket handshake failed.
    ConnectFailed(String),
    /// No authentication acknowledgment arrived in time.
    AuthTimeout,
    /// The peer sent a close frame or ended the stream.
    ClosedByPeer,
    /// Reading from or writing to the socket failed.
    Transport(String),
    /// Every handle to the connection was dropped.
    Dropped,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed(e) => write!(f, "connect failed: {e}"),
            Self::AuthTimeout => f.write_str("authentication timed out"),
            Self::ClosedByPeer => f.write_str("closed by peer"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Dropped => f.write_str("connection dropped"),
        }
    }
}

/// Lifecycle state of a [`super::Connection`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Constructed, `start` not yet called.
    #[default]
    Uninitialized,
    /// `start` called, socket handshake in progress.
    Connecting,
    /// Socket open, authentication request sent.
    Authenticating,
    /// Authentication acknowledged.
    Ready,
    /// Terminal state; no reconnection is attempted.
    Closed(CloseReason),
}

impl ConnectionState {
    /// Returns `true` if the state machine allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_advance_to(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (Self::Uninitialized, Self::Connecting)
                | (Self::Connecting, Self::Authenticating)
                | (Self::Authenticating, Self::Ready)
                | (
                    Self::Uninitialized | Self::Connecting | Self::Authenticating | Self::Ready,
                    Self::Closed(_)
                )
        )
    }

    /// Returns `true` once authentication has been acknowledged.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns `true` for the terminal state.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("uninitialized"),
            Self::Connecting => f.write_str("connecting"),
            Self::Authenticating => f.write_str("authenticating"),
            Self::Ready => f.write_str("ready"),
            Self::Closed(reason) => write!(f, "closed ({reason})"),
        }
    }
}

/// Shared, observable lifecycle state.
///
/// Cloning yields another handle to the same state.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    tx: Arc<watch::Sender<ConnectionState>>,
}

impl Lifecycle {
    /// Creates a lifecycle in [`ConnectionState::Uninitialized`].
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Uninitialized);
        Self { tx: Arc::new(tx) }
    }

    /// Returns a snapshot of the current state.
    #[must_use]
    pub fn current(&self) -> ConnectionState {
        self.tx.borrow().clone()
    }

    /// Moves to `next` if the transition is allowed.
    ///
    /// The check and the update happen atomically, so two racing callers
    /// cannot both perform the same transition.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidTransition`] if the state machine does
    /// not allow moving from the current state to `next`.
    pub fn advance(&self, next: ConnectionState) -> Result<(), ClientError> {
        let mut outcome = Ok(());
        self.tx.send_if_modified(|state| {
            if state.can_advance_to(&next) {
                tracing::debug!(from = %state, to = %next, "connection state changed");
                *state = next;
                true
            } else {
                outcome = Err(ClientError::InvalidTransition {
                    from: state.clone(),
                    to: next,
                });
                false
            }
        });
        outcome
    }

    /// Moves to [`ConnectionState::Closed`] unless already closed.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn close(&self, reason: CloseReason) -> bool {
        self.advance(ConnectionState::Closed(reason)).is_ok()
    }

    /// Returns a receiver that observes every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Waits until the connection is [`ConnectionState::Ready`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AuthTimeout`] or
    /// [`ClientError::ConnectionClosed`] if the connection closes before
    /// authentication is acknowledged.
    pub async fn wait_ready(&self, timeout_secs: u64) -> Result<(), ClientError> {
        let mut rx = self.subscribe();
        let state = rx
            .wait_for(|s| s.is_ready() || s.is_closed())
            .await
            .map_err(|_| ClientError::ConnectionClosed(CloseReason::Dropped.to_string()))?
            .clone();
        match state {
            ConnectionState::Closed(CloseReason::AuthTimeout) => {
                Err(ClientError::AuthTimeout { timeout_secs })
            }
            ConnectionState::Closed(reason) => {
                Err(ClientError::ConnectionClosed(reason.to_string()))
            }
            _ => Ok(()),
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

type ReadyCallback = Box<dyn FnOnce() + Send + 'static>;

/// One-shot gate between an authentication acknowledgment and the caller's
/// completion callback.
///
/// The callback runs only when [`ReadyLatch::acknowledge`] wins the
/// `Authenticating → Ready` transition, so duplicate acknowledgment-shaped
/// records can never fire it twice.
pub struct ReadyLatch {
    lifecycle: Lifecycle,
    on_ready: Mutex<Option<ReadyCallback>>,
}

impl ReadyLatch {
    /// Creates an unarmed latch over the given lifecycle.
    #[must_use]
    pub fn new(lifecycle: Lifecycle) -> Self {
        Self {
            lifecycle,
            on_ready: Mutex::new(None),
        }
    }

    /// Installs the completion callback.
    pub fn arm<F>(&self, on_ready: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self
            .on_ready
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(on_ready));
    }

    /// Handles an authentication acknowledgment.
    ///
    /// Returns `true` if this acknowledgment moved the connection to
    /// [`ConnectionState::Ready`] (and fired the callback, if armed).
    pub fn acknowledge(&self) -> bool {
        if let Err(err) = self.lifecycle.advance(ConnectionState::Ready) {
            tracing::debug!(error = %err, "ignoring acknowledgment outside authentication");
            return false;
        }

        let callback = self
            .on_ready
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(callback) = callback
            && std::panic::catch_unwind(AssertUnwindSafe(callback)).is_err()
        {
            tracing::error!("ready callback panicked");
        }
        tracing::info!("connection authenticated");
        true
    }

    /// Returns the lifecycle this latch guards.
    #[must_use]
    pub const fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
}

impl fmt::Debug for ReadyLatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let armed = self
            .on_ready
            .lock()
            .map(|cb| cb.is_some())
            .unwrap_or(false);
        f.debug_struct("ReadyLatch")
            .field("state", &self.lifecycle.current())
            .field("armed", &armed)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn authenticating() -> Lifecycle {
        let lifecycle = Lifecycle::new();
        let _ = lifecycle.advance(ConnectionState::Connecting);
        let _ = lifecycle.advance(ConnectionState::Authenticating);
        lifecycle
    }

    #[test]
    fn forward_path_is_allowed() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.advance(ConnectionState::Connecting).is_ok());
        assert!(lifecycle.advance(ConnectionState::Authenticating).is_ok());
        assert!(lifecycle.advance(ConnectionState::Ready).is_ok());
        assert_eq!(lifecycle.current(), ConnectionState::Ready);
    }

    #[test]
    fn skipping_or_reversing_is_rejected() {
        let lifecycle = Lifecycle::new();
        let result = lifecycle.advance(ConnectionState::Ready);
        assert!(matches!(result, Err(ClientError::InvalidTransition { .. })));

        let lifecycle = authenticating();
        let _ = lifecycle.advance(ConnectionState::Ready);
        assert!(lifecycle.advance(ConnectionState::Authenticating).is_err());
        assert!(lifecycle.advance(ConnectionState::Ready).is_err());
    }

    #[test]
    fn closed_is_terminal() {
        let lifecycle = authenticating();
        assert!(lifecycle.close(CloseReason::ClosedByPeer));
        assert!(!lifecycle.close(CloseReason::Dropped));
        assert!(lifecycle.advance(ConnectionState::Ready).is_err());
        assert_eq!(
            lifecycle.current(),
            ConnectionState::Closed(CloseReason::ClosedByPeer)
        );
    }

    #[test]
    fn latch_fires_callback_exactly_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let latch = ReadyLatch::new(authenticating());
        let counter = Arc::clone(&fired);
        latch.arm(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(latch.acknowledge());
        assert!(!latch.acknowledge());
        assert!(!latch.acknowledge());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn latch_ignores_ack_before_authenticating() {
        let fired = Arc::new(AtomicUsize::new(0));
        let latch = ReadyLatch::new(Lifecycle::new());
        let counter = Arc::clone(&fired);
        latch.arm(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!latch.acknowledge());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(latch.lifecycle().current(), ConnectionState::Uninitialized);
    }

    #[test]
    fn panicking_callback_still_reaches_ready() {
        let latch = ReadyLatch::new(authenticating());
        latch.arm(|| panic!("boom"));
        assert!(latch.acknowledge());
        assert!(latch.lifecycle().current().is_ready());
    }

    #[tokio::test]
    async fn wait_ready_resolves_on_ready() {
        let lifecycle = authenticating();
        let waiter = lifecycle.clone();
        let handle = tokio::spawn(async move { waiter.wait_ready(0).await });
        let _ = lifecycle.advance(ConnectionState::Ready);

        let Ok(result) = handle.await else {
            panic!("waiter task failed");
        };
        tokio_test::assert_ok!(result);
    }

    #[tokio::test]
    async fn wait_ready_fails_when_closed_first() {
        let lifecycle = authenticating();
        let _ = lifecycle.close(CloseReason::AuthTimeout);
        let result = lifecycle.wait_ready(7).await;
        assert!(matches!(
            result,
            Err(ClientError::AuthTimeout { timeout_secs: 7 })
        ));
    }
}
