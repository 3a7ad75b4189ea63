//! # Event Dispatcher
//!
//! The fan-out point between the connection supervisor and the display
//! clients. It takes one normalized [`Event`], serializes it once and hands the
//! same `Arc<str>` to every client whose ready state is `Open`.
//!
//! ## Core Design Principles:
//!
//! 1.  **Serialize once, share everywhere**: the JSON frame is built a single
//!     time per broadcast and every client receives an `Arc` pointer to the same
//!     text.
//!
//! 2.  **Best-effort delivery**: clients that are not `Open` are skipped, not
//!     queued. There is no acknowledgment, retry or persistence; a client that
//!     connects later never sees earlier events.
//!
//! 3.  **Per-client ordering**: each client has one unbounded FIFO channel
//!     drained by a single writer task, so one client sees events in broadcast
//!     order. Nothing is guaranteed across clients.
//!
//! 4.  **Self-cleaning**: a client whose receiver is gone is pruned from the
//!     registry during the next broadcast.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::registry::{ClientId, ClientRegistry, ReadyState};
use crate::events::Event;

/// Outcome of one [`Dispatcher::broadcast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastReport {
    /// Clients the frame was handed to.
    pub sent: usize,
    /// Clients registered at broadcast time, whatever their state.
    pub total: usize,
}

/// # Core Dispatcher
///
/// Registration, ready-state tracking and broadcasting for display clients.
#[derive(Debug, Default)]
pub struct Dispatcher {
    registry: ClientRegistry,
}

impl Dispatcher {
    /// Creates a dispatcher with an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// # Add Client
    ///
    /// Registers a new connection in the `Connecting` state and returns its id
    /// together with the receiving half of its frame channel. The caller marks
    /// it open once its writer is running.
    pub fn add_client(&self) -> (ClientId, mpsc::UnboundedReceiver<Arc<str>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.registry.register(tx);
        log::info!("Client #{} connected ({} registered)", id, self.registry.len());
        (id, rx)
    }

    /// Marks a client as ready to receive broadcasts.
    pub fn mark_open(&self, id: ClientId) {
        self.registry.set_state(id, ReadyState::Open);
    }

    /// Marks a client as closing; it stops receiving broadcasts.
    pub fn mark_closing(&self, id: ClientId) {
        self.registry.set_state(id, ReadyState::Closing);
    }

    /// Removes a client from the registry.
    pub fn remove_client(&self, id: ClientId) {
        if self.registry.remove(id) {
            log::info!("Client #{} disconnected ({} registered)", id, self.registry.len());
        }
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    /// Read-only view of the registry.
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// # Broadcast
    ///
    /// Serializes `event` once and sends it to every `Open` client.
    ///
    /// ## Logic:
    /// 1.  Serialize to the JSON wire format. A serialization failure is logged
    ///     and reported as nothing sent.
    /// 2.  Walk the registry under its lock; skip clients that are not `Open`.
    /// 3.  A failed send means the client's writer is gone: mark it `Closed`
    ///     and prune it.
    pub fn broadcast(&self, event: &Event) -> BroadcastReport {
        let frame: Arc<str> = match event.to_json() {
            Ok(json) => Arc::from(json),
            Err(e) => {
                log::error!("Failed to serialize {} event: {}", event.kind(), e);
                return BroadcastReport {
                    sent: 0,
                    total: self.registry.len(),
                };
            }
        };

        let mut clients = self.registry.lock();
        let total = clients.len();
        let mut sent = 0;

        clients.retain(|id, client| {
            if client.state != ReadyState::Open {
                return true;
            }
            match client.sender.send(Arc::clone(&frame)) {
                Ok(()) => {
                    sent += 1;
                    true
                }
                Err(_) => {
                    client.state = ReadyState::Closed;
                    log::info!("Client #{} channel closed. Removing from dispatcher.", id);
                    false
                }
            }
        });
        drop(clients);

        log::info!("Broadcast {} event to {}/{} clients", event.kind(), sent, total);
        BroadcastReport { sent, total }
    }
}
