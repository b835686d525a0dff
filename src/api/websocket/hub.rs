//! Connection hub: outbound channels and per-graph groups
//!
//! Each live connection owns an unbounded FIFO channel drained by its socket
//! task, so events queued by one sender reach each recipient in send order.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::ServerEvent;
use crate::types::{ConnectionId, GraphId, UserId};

/// Receiving half handed to the socket task
pub type EventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

struct ConnectionHandle {
    user_id: UserId,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

#[derive(Default)]
struct HubInner {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    groups: HashMap<GraphId, HashSet<ConnectionId>>,
}

/// Registry of live connections and the graph groups they joined
pub struct ConnectionHub {
    inner: RwLock<HubInner>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HubInner::default()),
        }
    }

    /// Register a new connection and return its id and event stream
    pub fn register(&self, user_id: &str) -> (ConnectionId, EventReceiver) {
        let connection_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.write().connections.insert(
            connection_id.clone(),
            ConnectionHandle {
                user_id: user_id.to_string(),
                tx,
            },
        );
        (connection_id, rx)
    }

    /// Forget a connection and drop it from every group.
    ///
    /// Returns the graphs the connection was a member of.
    pub fn unregister(&self, connection_id: &str) -> Vec<GraphId> {
        let mut inner = self.inner.write();
        inner.connections.remove(connection_id);

        let mut left = Vec::new();
        inner.groups.retain(|graph_id, members| {
            if members.remove(connection_id) {
                left.push(graph_id.clone());
            }
            !members.is_empty()
        });
        left
    }

    pub fn join_group(&self, graph_id: &str, connection_id: &str) {
        self.inner
            .write()
            .groups
            .entry(graph_id.to_string())
            .or_default()
            .insert(connection_id.to_string());
    }

    /// Returns false if the connection was not in the group
    pub fn leave_group(&self, graph_id: &str, connection_id: &str) -> bool {
        let mut inner = self.inner.write();
        let Some(members) = inner.groups.get_mut(graph_id) else {
            return false;
        };
        let removed = members.remove(connection_id);
        if members.is_empty() {
            inner.groups.remove(graph_id);
        }
        removed
    }

    /// Queue an event for a single connection
    pub fn send_to(&self, connection_id: &str, event: ServerEvent) -> bool {
        self.inner
            .read()
            .connections
            .get(connection_id)
            .is_some_and(|handle| handle.tx.send(event).is_ok())
    }

    /// Queue an event for every member of a graph's group, optionally
    /// skipping one connection. Returns the number of recipients.
    pub fn broadcast(&self, graph_id: &str, event: &ServerEvent, except: Option<&str>) -> usize {
        let inner = self.inner.read();
        let Some(members) = inner.groups.get(graph_id) else {
            return 0;
        };

        members
            .iter()
            .filter(|id| Some(id.as_str()) != except)
            .filter_map(|id| inner.connections.get(id))
            .filter(|handle| handle.tx.send(event.clone()).is_ok())
            .count()
    }

    pub fn group_members(&self, graph_id: &str) -> Vec<ConnectionId> {
        self.inner
            .read()
            .groups
            .get(graph_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, graph_id: &str, connection_id: &str) -> bool {
        self.inner
            .read()
            .groups
            .get(graph_id)
            .is_some_and(|members| members.contains(connection_id))
    }

    /// User that opened a connection
    pub fn user_of(&self, connection_id: &str) -> Option<UserId> {
        self.inner
            .read()
            .connections
            .get(connection_id)
            .map(|handle| handle.user_id.clone())
    }

    pub fn connection_count(&self) -> usize {
        self.inner.read().connections.len()
    }

    pub fn group_count(&self) -> usize {
        self.inner.read().groups.len()
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}
