//! # Core Relay Module
//!
//! The server half of the live event relay: everything between the upstream
//! live subscription and the display clients' sockets.
//!
//! ## Core Components:
//!
//! - **`upstream_manager`**: the connection supervisor. Owns the single
//!   upstream subscription, its state machine and the fixed-interval,
//!   single-flight reconnect policy. Normalizes upstream signals into events.
//!
//! - **`dispatcher`**: serializes each event once and fans it out to every
//!   display client whose connection is open.
//!
//! - **`registry`**: the set of client connections and their ready states,
//!   owned by the dispatcher.
//!
//! - **`downstream`**: the axum WebSocket server that accepts display clients,
//!   feeds the dispatcher and forwards client control messages.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Fan-out of serialized events to open client connections.
pub mod dispatcher;
/// The axum WebSocket endpoint for display clients.
pub mod downstream;
/// Client connections and their ready states.
pub mod registry;
/// The connection supervisor and its reconnect policy.
pub mod upstream_manager;

// --- Public API Re-exports ---
pub use dispatcher::{BroadcastReport, Dispatcher};
pub use downstream::{start, ControlCommand, DownstreamServer, RelayError, DEFAULT_PORT};
pub use registry::{ClientId, ClientRegistry, ReadyState};
pub use upstream_manager::{
    ConnectionState, SupervisorError, SupervisorStats, UpstreamManager, DEFAULT_RECONNECT_INTERVAL,
};
