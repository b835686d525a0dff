//! Broadcast router: turns validated client events into targeted fan-out

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::hub::{ConnectionHub, EventReceiver};
use crate::error::ValidationError;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::registry::SessionRegistry;
use crate::types::{ConnectionId, OperationEvent};
use crate::utils::current_timestamp_millis;
use crate::validation::{validate_event, ValidatedEvent};

/// Routes events between the connections of each graph
pub struct BroadcastRouter {
    registry: Arc<SessionRegistry>,
    hub: Arc<ConnectionHub>,
    /// Serializes roster mutations with their fan-out so racing joins on one
    /// graph deliver rosters in registry order
    membership: Mutex<()>,
}

impl BroadcastRouter {
    pub fn new(registry: Arc<SessionRegistry>, hub: Arc<ConnectionHub>) -> Self {
        Self {
            registry,
            hub,
            membership: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    /// Register an authenticated connection and greet it
    pub fn connect(&self, user_id: &str) -> (ConnectionId, EventReceiver) {
        let (connection_id, rx) = self.hub.register(user_id);
        self.hub.send_to(
            &connection_id,
            ServerEvent::Connected {
                connection_id: connection_id.clone(),
                user_id: user_id.to_string(),
            },
        );
        info!(connection = %connection_id, user = %user_id, "connection opened");
        (connection_id, rx)
    }

    /// Handle a raw text frame from a connection
    pub fn handle_text(&self, connection_id: &str, text: &str) {
        match ClientEvent::parse(text) {
            Ok(event) => self.handle_event(connection_id, event),
            Err(err) => self.reject(connection_id, err),
        }
    }

    /// Handle a decoded client event
    pub fn handle_event(&self, connection_id: &str, event: ClientEvent) {
        match validate_event(event) {
            Ok(ValidatedEvent::Join { graph_id, user_id }) => {
                self.join(connection_id, &graph_id, &user_id)
            }
            Ok(ValidatedEvent::Leave { graph_id, user_id }) => {
                self.leave(connection_id, &graph_id, &user_id)
            }
            Ok(ValidatedEvent::Operation(event)) => self.forward(connection_id, event),
            Err(err) => self.reject(connection_id, err),
        }
    }

    fn join(&self, connection_id: &str, graph_id: &str, user_id: &str) {
        let _guard = self.membership.lock();
        self.hub.join_group(graph_id, connection_id);
        let participants = self.registry.join(graph_id, user_id, connection_id);
        info!(
            graph = %graph_id,
            user = %user_id,
            connection = %connection_id,
            participants = participants.len(),
            "joined graph"
        );

        let event = ServerEvent::UserJoined {
            user_id: user_id.to_string(),
            participants,
        };
        self.hub.broadcast(graph_id, &event, None);
    }

    fn leave(&self, connection_id: &str, graph_id: &str, user_id: &str) {
        let _guard = self.membership.lock();
        self.hub.leave_group(graph_id, connection_id);
        let participants = self.registry.leave(graph_id, user_id);
        info!(
            graph = %graph_id,
            user = %user_id,
            connection = %connection_id,
            remaining = participants.len(),
            "left graph"
        );

        if participants.is_empty() {
            return;
        }
        let event = ServerEvent::UserLeft {
            user_id: user_id.to_string(),
            participants,
        };
        self.hub.broadcast(graph_id, &event, None);
    }

    fn forward(&self, connection_id: &str, event: OperationEvent) {
        let OperationEvent {
            graph_id,
            user_id,
            operation,
        } = event;
        let kind = operation.kind();
        let id = operation.target_id().to_string();

        let relay = ServerEvent::relay(user_id, operation);
        let recipients = self.hub.broadcast(&graph_id, &relay, Some(connection_id));
        debug!(
            graph = %graph_id,
            operation = %kind,
            id = %id,
            recipients,
            "relayed operation"
        );

        self.hub.send_to(
            connection_id,
            ServerEvent::OperationSuccess {
                operation: kind,
                id,
                timestamp: current_timestamp_millis(),
            },
        );
    }

    /// Clean up after a transport-level disconnect
    pub fn disconnect(&self, connection_id: &str) {
        let _guard = self.membership.lock();
        self.hub.unregister(connection_id);
        let changes = self.registry.remove_by_connection(connection_id);
        info!(
            connection = %connection_id,
            graphs = changes.len(),
            "connection closed"
        );

        for change in changes {
            if change.participants.is_empty() {
                continue;
            }
            let event = ServerEvent::UserLeft {
                user_id: change.user_id,
                participants: change.participants,
            };
            self.hub.broadcast(&change.graph_id, &event, None);
        }
    }

    fn reject(&self, connection_id: &str, err: ValidationError) {
        warn!(
            connection = %connection_id,
            operation = %err.operation,
            "rejected event: {}",
            err.message
        );
        self.hub.send_to(connection_id, ServerEvent::error(&err));
    }
}
