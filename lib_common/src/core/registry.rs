//! # Client Registry
//!
//! The set of display-client connections currently known to the relay, keyed by
//! a process-unique id. Every entry carries a [`ReadyState`] mirroring the
//! WebSocket ready state; only `Open` clients receive broadcasts.
//!
//! The registry is unordered and changes only on connect, state transitions
//! and disconnect. It is owned by the [`Dispatcher`](crate::core::Dispatcher).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

/// Ready state of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    /// Upgrade accepted, writer not running yet.
    Connecting = 0,
    /// Eligible for broadcasts.
    Open = 1,
    /// Close handshake in progress.
    Closing = 2,
    /// Gone.
    Closed = 3,
}

/// Identifier handed out by [`ClientRegistry::register`].
pub type ClientId = u64;

/// One registered connection: the sending half of its per-client FIFO.
#[derive(Debug)]
pub(crate) struct ClientHandle {
    pub(crate) state: ReadyState,
    pub(crate) sender: mpsc::UnboundedSender<Arc<str>>,
}

/// # Client Registry
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<ClientId, ClientHandle>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, HashMap<ClientId, ClientHandle>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a connection in the `Connecting` state and returns its id.
    pub fn register(&self, sender: mpsc::UnboundedSender<Arc<str>>) -> ClientId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.lock().insert(
            id,
            ClientHandle {
                state: ReadyState::Connecting,
                sender,
            },
        );
        id
    }

    /// Updates the ready state of a known client. Returns `false` for
    /// unknown ids.
    pub fn set_state(&self, id: ClientId, state: ReadyState) -> bool {
        match self.lock().get_mut(&id) {
            Some(client) => {
                client.state = state;
                true
            }
            None => false,
        }
    }

    /// Current ready state, if the client is still registered.
    pub fn state(&self, id: ClientId) -> Option<ReadyState> {
        self.lock().get(&id).map(|client| client.state)
    }

    /// Drops a client. Returns whether it was registered.
    pub fn remove(&self, id: ClientId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Number of registered clients, whatever their state.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no client is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_starts_connecting() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = registry.register(tx);
        assert_eq!(registry.state(id), Some(ReadyState::Connecting));
        assert!(registry.set_state(id, ReadyState::Open));
        assert_eq!(registry.state(id), Some(ReadyState::Open));
    }

    #[test]
    fn test_ids_are_unique_and_removal_is_tracked() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let a = registry.register(tx.clone());
        let b = registry.register(tx);
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(a));
        assert!(!registry.remove(a));
        assert!(!registry.set_state(a, ReadyState::Open));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(b));
        assert!(registry.is_empty());
    }
}
