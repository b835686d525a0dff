//! Transport seam between the op scheduler and the connection manager

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::protocol::{ClientEvent, ServerEvent};

/// Handle of a registered listener
pub type ListenerId = u64;

/// Callback invoked for every inbound server event
pub type Listener = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// What the op scheduler needs from a connection
pub trait SyncChannel: Send + Sync {
    /// Whether outbound events currently reach the server
    fn is_connected(&self) -> bool;

    /// Hand an event to the transport. Returns false when it was dropped.
    fn emit(&self, event: ClientEvent) -> bool;

    fn add_listener(&self, listener: Listener) -> ListenerId;

    /// Returns false if the listener was already gone
    fn remove_listener(&self, id: ListenerId) -> bool;
}

/// Listener table owned by one connection
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    map: Mutex<HashMap<ListenerId, Listener>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Listener) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.map.lock().insert(id, listener);
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        self.map.lock().remove(&id).is_some()
    }

    /// Remove every listener, returning how many were registered
    pub fn clear(&self) -> usize {
        let mut map = self.map.lock();
        let count = map.len();
        map.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every listener. Callbacks run outside the table lock so they
    /// may add or remove listeners themselves.
    pub fn dispatch(&self, event: &ServerEvent) {
        let listeners: Vec<Listener> = self.map.lock().values().cloned().collect();
        for listener in listeners {
            listener(event);
        }
    }
}
