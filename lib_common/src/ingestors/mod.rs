//! # Live Source Ingestors
//!
//! The upstream seam of the relay. The live-platform client library that
//! actually speaks the platform's protocol is an external collaborator; this
//! module only fixes the shape the [`UpstreamManager`](crate::core::UpstreamManager)
//! expects from it.
//!
//! ## Contract:
//! - A [`LiveSource`] opens one [`LiveHandle`] per target identifier.
//! - The handle exposes an asynchronous `connect` outcome and, once, a stream
//!   of [`LiveSignal`]s (typed events plus `close` / `error` notifications).
//! - Teardown happens in three individually fallible steps:
//!   `remove_all_listeners`, `disconnect`, `close`.
//!
//! ## Contained Modules:
//! - **`live_wss`**: attaches to a WebSocket event bridge that forwards the
//!   platform library's events as JSON frames.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// The WebSocket event-bridge adapter.
pub mod live_wss;

pub use live_wss::{DEFAULT_CONNECT_TIMEOUT, WsLiveConfig, WsLiveHandle, WsLiveSource};

/// One notification emitted by an upstream handle. Payloads are kept raw;
/// normalization happens in [`crate::events::normalize`].
#[derive(Debug, Clone, PartialEq)]
pub enum LiveSignal {
    /// The platform acknowledged the connection (room info, if any).
    Connected(Value),
    /// Raw chat payload.
    Chat(Value),
    /// Raw gift payload.
    Gift(Value),
    /// Raw follow payload.
    Follow(Value),
    /// Raw share payload.
    Share(Value),
    /// Periodic room-state update (viewer count and similar).
    RoomUser(Value),
    /// The upstream closed the session.
    Close,
    /// The upstream reported an error.
    Error(String),
}

/// Errors produced by upstream handles. All of them are recoverable from the
/// supervisor's point of view.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// The connection attempt failed.
    #[error("failed to connect to live room `{target}`: {reason}")]
    Connect {
        /// Target identifier the attempt was made for.
        target: String,
        /// Human readable cause.
        reason: String,
    },
    /// One of the teardown steps failed.
    #[error("teardown step `{step}` failed: {reason}")]
    Teardown {
        /// Which step (`remove_all_listeners`, `disconnect`, `close`).
        step: &'static str,
        /// Human readable cause.
        reason: String,
    },
    /// The handle was already closed.
    #[error("upstream handle is closed")]
    Closed,
}

/// # Live Handle
///
/// A single upstream subscription for one target identifier.
#[async_trait]
pub trait LiveHandle: Send + Sync {
    /// Connects to the live room. Resolves once the platform accepted or
    /// rejected the subscription.
    async fn connect(&self) -> Result<(), UpstreamError>;

    /// Hands out the signal receiver. Only the first call returns `Some`.
    fn take_signals(&self) -> Option<mpsc::UnboundedReceiver<LiveSignal>>;

    /// Stops delivering signals to the receiver.
    fn remove_all_listeners(&self) -> Result<(), UpstreamError>;

    /// Drops the transport connection.
    fn disconnect(&self) -> Result<(), UpstreamError>;

    /// Releases everything the handle still owns; the handle is unusable after.
    fn close(&self) -> Result<(), UpstreamError>;
}

/// # Live Source
///
/// Factory for [`LiveHandle`]s.
pub trait LiveSource: Send + Sync {
    /// Creates a new, not yet connected handle for `target`.
    fn open(&self, target: &str) -> Arc<dyn LiveHandle>;
}
