//! WebSocket connection: lifecycle, authentication, and the read/write loop.
//!
//! [`Connection::start`] spawns one task that owns the socket. The task
//! authenticates, then multiplexes queued outbound batch frames with inbound
//! frames, routing every inbound frame through
//! [`process_frame`](super::inbound::process_frame) in delivery order.

use std::future::pending;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use super::inbound::process_frame;
use super::messages::AuthRequest;
use super::request::RequestBuilder;
use super::state::{CloseReason, ConnectionState, Lifecycle, ReadyLatch};
use super::subscription::{Subscriber, SubscriberRegistry};
use crate::config::ClientConfig;
use crate::error::ClientError;

/// A single authenticated connection to the telemetry service.
///
/// Cheap to clone: clones share the socket task, the subscriber list and
/// the lifecycle state. The socket task ends once the peer closes, or once
/// every clone and every [`RequestBuilder`] has been dropped.
///
/// Subscribers and the ready callback are owned by the connection, so a
/// closure stored there that captures a `Connection` clone keeps the
/// connection alive forever. Capture a [`WeakConnection`] instead.
#[derive(Debug, Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

/// A non-owning handle to a [`Connection`].
///
/// Obtained from [`Connection::downgrade`]; it does not keep the socket
/// task alive.
#[derive(Debug, Clone)]
pub struct WeakConnection {
    inner: Weak<Inner>,
}

impl WeakConnection {
    /// Returns the connection if any strong handle is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Connection> {
        self.inner.upgrade().map(|inner| Connection { inner })
    }
}

#[derive(Debug)]
struct Inner {
    id: Uuid,
    url: String,
    cik: String,
    alias: String,
    auth_timeout: Option<Duration>,
    latch: Arc<ReadyLatch>,
    registry: SubscriberRegistry,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl Connection {
    /// Creates an unstarted connection from the given configuration.
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                url: config.url.clone(),
                cik: config.cik.clone(),
                alias: config.alias.clone(),
                auth_timeout: config.auth_timeout(),
                latch: Arc::new(ReadyLatch::new(Lifecycle::new())),
                registry: SubscriberRegistry::new(),
                outbound: Mutex::new(None),
            }),
        }
    }

    /// Returns a handle that does not keep this connection alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakConnection {
        WeakConnection {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Returns this connection's identifier, used in log fields.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Returns the credential this connection authenticates with.
    #[must_use]
    pub fn cik(&self) -> &str {
        &self.inner.cik
    }

    /// Returns a snapshot of the lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.latch.lifecycle().current()
    }

    /// Opens the socket and authenticates in the background.
    ///
    /// `on_ready` runs exactly once, on the connection task, when the first
    /// authentication acknowledgment arrives. It never runs if
    /// authentication is never acknowledged. Must be called from within a
    /// Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AlreadyStarted`] if `start` was already
    /// called on this connection or one of its clones.
    pub fn start<F>(&self, on_ready: F) -> Result<(), ClientError>
    where
        F: FnOnce() + Send + 'static,
    {
        let lifecycle = self.inner.latch.lifecycle();
        lifecycle
            .advance(ConnectionState::Connecting)
            .map_err(|_| ClientError::AlreadyStarted)?;

        self.inner.latch.arm(on_ready);

        let (tx, rx) = mpsc::unbounded_channel();
        *self
            .inner
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(tx);

        let task = SocketTask {
            id: self.inner.id,
            url: self.inner.url.clone(),
            auth: AuthRequest::new(self.inner.cik.clone()),
            auth_timeout: self.inner.auth_timeout,
            latch: Arc::clone(&self.inner.latch),
            registry: self.inner.registry.clone(),
        };
        tokio::spawn(task.run(rx));
        Ok(())
    }

    /// Waits until authentication is acknowledged.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AuthTimeout`] or
    /// [`ClientError::ConnectionClosed`] if the connection closes first.
    pub async fn wait_ready(&self) -> Result<(), ClientError> {
        let timeout_secs = self.inner.auth_timeout.map_or(0, |d| d.as_secs());
        self.inner.latch.lifecycle().wait_ready(timeout_secs).await
    }

    /// Waits until the connection reaches [`ConnectionState::Closed`] and
    /// returns the reason.
    pub async fn closed(&self) -> CloseReason {
        let mut rx = self.inner.latch.lifecycle().subscribe();
        let state = rx.wait_for(ConnectionState::is_closed).await.map(|s| s.clone());
        match state {
            Ok(ConnectionState::Closed(reason)) => reason,
            _ => CloseReason::Dropped,
        }
    }

    /// Registers a subscriber for result payloads.
    ///
    /// Subscribers are invoked in registration order and are never removed.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        self.inner.registry.subscribe(subscriber);
    }

    /// Registers a closure as a subscriber.
    ///
    /// A closure that needs the connection should capture
    /// [`Connection::downgrade`] rather than a clone.
    pub fn subscribe_fn<F>(&self, callback: F)
    where
        F: Fn(&serde_json::Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.registry.subscribe(Arc::new(callback));
    }

    /// Returns the subscriber registry of this connection.
    #[must_use]
    pub fn registry(&self) -> &SubscriberRegistry {
        &self.inner.registry
    }

    /// Starts a new request batch.
    ///
    /// Batches built before authentication completes are queued behind the
    /// authentication frame.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotStarted`] if `start` has not been called.
    pub fn build(&self) -> Result<RequestBuilder, ClientError> {
        let outbound = self
            .inner
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ClientError::NotStarted)?;
        Ok(RequestBuilder::new(outbound, self.inner.alias.clone()))
    }
}

/// State moved into the spawned socket task.
struct SocketTask {
    id: Uuid,
    url: String,
    auth: AuthRequest,
    auth_timeout: Option<Duration>,
    latch: Arc<ReadyLatch>,
    registry: SubscriberRegistry,
}

impl SocketTask {
    async fn run(self, outbound_rx: mpsc::UnboundedReceiver<String>) {
        let lifecycle = self.latch.lifecycle().clone();
        let reason = self.drive(&lifecycle, outbound_rx).await;
        if lifecycle.close(reason.clone()) {
            tracing::info!(conn = %self.id, %reason, "connection closed");
        }
    }

    async fn drive(
        &self,
        lifecycle: &Lifecycle,
        mut outbound_rx: mpsc::UnboundedReceiver<String>,
    ) -> CloseReason {
        tracing::info!(conn = %self.id, url = %self.url, "connecting");
        let auth_deadline = auth_deadline(self.auth_timeout.map(|t| Instant::now() + t));
        tokio::pin!(auth_deadline);

        // The deadline covers the socket handshake as well as authentication
        let connected = tokio::select! {
            result = connect_async(self.url.as_str()) => result,
            () = &mut auth_deadline => {
                tracing::warn!(conn = %self.id, "socket handshake not completed in time");
                return CloseReason::AuthTimeout;
            }
        };
        let (socket, _) = match connected {
            Ok(ok) => ok,
            Err(err) => {
                tracing::error!(conn = %self.id, error = %err, "socket error");
                return CloseReason::ConnectFailed(err.to_string());
            }
        };
        let (mut ws_tx, mut ws_rx) = socket.split();

        let auth = match serde_json::to_string(&self.auth) {
            Ok(auth) => auth,
            Err(err) => return CloseReason::Transport(err.to_string()),
        };
        if let Err(err) = ws_tx.send(Message::text(auth)).await {
            tracing::error!(conn = %self.id, error = %err, "failed to send authentication");
            return CloseReason::Transport(err.to_string());
        }
        if let Err(err) = lifecycle.advance(ConnectionState::Authenticating) {
            tracing::debug!(conn = %self.id, error = %err, "closed during connect");
            return CloseReason::Dropped;
        }

        loop {
            tokio::select! {
                // Incoming frame from the service
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let _ = process_frame(text.as_str(), &self.latch, &self.registry);
                        }
                        Some(Ok(Message::Close(_))) | None => return CloseReason::ClosedByPeer,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            tracing::error!(conn = %self.id, error = %err, "socket error");
                            return CloseReason::Transport(err.to_string());
                        }
                    }
                }
                // Batch queued by a request builder
                frame = outbound_rx.recv() => {
                    let Some(frame) = frame else {
                        let _ = ws_tx.close().await;
                        return CloseReason::Dropped;
                    };
                    if let Err(err) = ws_tx.send(Message::text(frame)).await {
                        tracing::warn!(conn = %self.id, error = %err, "failed to send batch");
                        return CloseReason::Transport(err.to_string());
                    }
                }
                () = &mut auth_deadline, if !lifecycle.current().is_ready() => {
                    tracing::warn!(conn = %self.id, "authentication not acknowledged in time");
                    let _ = ws_tx.close().await;
                    return CloseReason::AuthTimeout;
                }
            }
        }
    }
}

async fn auth_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending().await,
    }
}
