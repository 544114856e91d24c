//! # telemetry-ws
//!
//! Authenticated WebSocket client for a telemetry service.
//!
//! This crate keeps one persistent connection to the service, authenticates
//! it, sends batched `write`/`read` calls over it, and fans result payloads
//! out to any number of subscribers. A results cache built on top turns
//! read responses into timestamped readings.
//!
//! ## Architecture
//!
//! ```text
//! Telemetry service (wss)
//!     │
//!     ├── Connection (ws/)          auth handshake, read/write loop
//!     │     ├── RequestBuilder      batched calls → one frame
//!     │     └── SubscriberRegistry  result fan-out, failure isolation
//!     │
//!     ├── ReadingCache (domain/)    result → readings
//!     │     └── ReadingBus          snapshot broadcast
//!     │
//!     └── report / listeners
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod ws;
