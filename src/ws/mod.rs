//! WebSocket layer: connection lifecycle, request batching, and result
//! fan-out.
//!
//! A [`Connection`] owns one socket to the telemetry service. Batches are
//! composed with a [`RequestBuilder`] obtained from the connection, and
//! result payloads are pushed to every registered [`Subscriber`].

pub mod connection;
pub mod inbound;
pub mod messages;
pub mod request;
pub mod state;
pub mod subscription;

pub use connection::{Connection, WeakConnection};
pub use request::RequestBuilder;
pub use state::{CloseReason, ConnectionState};
pub use subscription::{DeliveryOutcome, Subscriber, SubscriberRegistry};
