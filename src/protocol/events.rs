//! Wire events exchanged over the gateway
//!
//! Every frame is a JSON text message shaped `{"event": "<name>", "data": {...}}`
//! with camelCase field names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::types::{ConnectionId, Edge, Node, Operation, OperationKind, Participant, UserId};

/// Operation name reported when an event name cannot be recovered
pub const UNKNOWN_OPERATION: &str = "unknown";

/// Client → server events
///
/// Payload fields default to empty so that missing fields surface as
/// validation errors naming the operation rather than as parse failures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    JoinGraph {
        #[serde(default)]
        graph_id: String,
        #[serde(default)]
        user_id: String,
    },

    LeaveGraph {
        #[serde(default)]
        graph_id: String,
        #[serde(default)]
        user_id: String,
    },

    AddNode {
        #[serde(default)]
        graph_id: String,
        #[serde(default)]
        user_id: String,
        #[serde(default)]
        node: Option<Node>,
    },

    UpdateNode {
        #[serde(default)]
        graph_id: String,
        #[serde(default)]
        user_id: String,
        #[serde(default)]
        node_id: String,
        #[serde(default)]
        updates: Option<Value>,
    },

    DeleteNode {
        #[serde(default)]
        graph_id: String,
        #[serde(default)]
        user_id: String,
        #[serde(default)]
        node_id: String,
    },

    AddEdge {
        #[serde(default)]
        graph_id: String,
        #[serde(default)]
        user_id: String,
        #[serde(default)]
        edge: Option<Edge>,
    },

    UpdateEdge {
        #[serde(default)]
        graph_id: String,
        #[serde(default)]
        user_id: String,
        #[serde(default)]
        edge_id: String,
        #[serde(default)]
        updates: Option<Value>,
    },

    DeleteEdge {
        #[serde(default)]
        graph_id: String,
        #[serde(default)]
        user_id: String,
        #[serde(default)]
        edge_id: String,
    },
}

impl ClientEvent {
    pub fn join(graph_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        ClientEvent::JoinGraph {
            graph_id: graph_id.into(),
            user_id: user_id.into(),
        }
    }

    pub fn leave(graph_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        ClientEvent::LeaveGraph {
            graph_id: graph_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Wrap a graph operation for sending
    pub fn operation(graph_id: impl Into<String>, user_id: impl Into<String>, operation: Operation) -> Self {
        let graph_id = graph_id.into();
        let user_id = user_id.into();
        match operation {
            Operation::AddNode { node } => ClientEvent::AddNode {
                graph_id,
                user_id,
                node: Some(node),
            },
            Operation::UpdateNode { node_id, updates } => ClientEvent::UpdateNode {
                graph_id,
                user_id,
                node_id,
                updates: Some(updates),
            },
            Operation::DeleteNode { node_id } => ClientEvent::DeleteNode {
                graph_id,
                user_id,
                node_id,
            },
            Operation::AddEdge { edge } => ClientEvent::AddEdge {
                graph_id,
                user_id,
                edge: Some(edge),
            },
            Operation::UpdateEdge { edge_id, updates } => ClientEvent::UpdateEdge {
                graph_id,
                user_id,
                edge_id,
                updates: Some(updates),
            },
            Operation::DeleteEdge { edge_id } => ClientEvent::DeleteEdge {
                graph_id,
                user_id,
                edge_id,
            },
        }
    }

    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinGraph { .. } => "join-graph",
            ClientEvent::LeaveGraph { .. } => "leave-graph",
            ClientEvent::AddNode { .. } => OperationKind::AddNode.as_str(),
            ClientEvent::UpdateNode { .. } => OperationKind::UpdateNode.as_str(),
            ClientEvent::DeleteNode { .. } => OperationKind::DeleteNode.as_str(),
            ClientEvent::AddEdge { .. } => OperationKind::AddEdge.as_str(),
            ClientEvent::UpdateEdge { .. } => OperationKind::UpdateEdge.as_str(),
            ClientEvent::DeleteEdge { .. } => OperationKind::DeleteEdge.as_str(),
        }
    }

    /// Parse a text frame.
    ///
    /// On failure the error names the event when the frame is at least a JSON
    /// object with a string `event` field.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(text).map_err(|e| {
            let operation = serde_json::from_str::<Value>(text)
                .ok()
                .and_then(|v| v.get("event").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| UNKNOWN_OPERATION.to_string());
            ValidationError::new(operation, format!("Malformed payload: {}", e))
        })
    }
}

/// Server → client events
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Sent once after the upgrade completes
    Connected {
        connection_id: ConnectionId,
        user_id: UserId,
    },

    /// Roster after a join
    UserJoined {
        user_id: UserId,
        participants: Vec<Participant>,
    },

    /// Roster after a leave or disconnect
    UserLeft {
        user_id: UserId,
        participants: Vec<Participant>,
    },

    NodeAdded {
        user_id: UserId,
        node: Node,
    },

    NodeUpdated {
        user_id: UserId,
        node_id: String,
        updates: Value,
    },

    NodeDeleted {
        user_id: UserId,
        node_id: String,
    },

    EdgeAdded {
        user_id: UserId,
        edge: Edge,
    },

    EdgeUpdated {
        user_id: UserId,
        edge_id: String,
        updates: Value,
    },

    EdgeDeleted {
        user_id: UserId,
        edge_id: String,
    },

    /// Acknowledgment to the sender of an operation
    OperationSuccess {
        operation: OperationKind,
        id: String,
        /// Unix timestamp in milliseconds
        timestamp: i64,
    },

    /// Error scoped to the connection that caused it
    Error {
        message: String,
        operation: String,
    },
}

impl ServerEvent {
    /// Build the relay event forwarded to other collaborators
    pub fn relay(user_id: impl Into<String>, operation: Operation) -> Self {
        let user_id = user_id.into();
        match operation {
            Operation::AddNode { node } => ServerEvent::NodeAdded { user_id, node },
            Operation::UpdateNode { node_id, updates } => ServerEvent::NodeUpdated {
                user_id,
                node_id,
                updates,
            },
            Operation::DeleteNode { node_id } => ServerEvent::NodeDeleted { user_id, node_id },
            Operation::AddEdge { edge } => ServerEvent::EdgeAdded { user_id, edge },
            Operation::UpdateEdge { edge_id, updates } => ServerEvent::EdgeUpdated {
                user_id,
                edge_id,
                updates,
            },
            Operation::DeleteEdge { edge_id } => ServerEvent::EdgeDeleted { user_id, edge_id },
        }
    }

    /// Originating user and operation of a relay event
    pub fn remote_operation(&self) -> Option<(&str, Operation)> {
        let (user_id, operation) = match self {
            ServerEvent::NodeAdded { user_id, node } => {
                (user_id, Operation::AddNode { node: node.clone() })
            }
            ServerEvent::NodeUpdated {
                user_id,
                node_id,
                updates,
            } => (
                user_id,
                Operation::UpdateNode {
                    node_id: node_id.clone(),
                    updates: updates.clone(),
                },
            ),
            ServerEvent::NodeDeleted { user_id, node_id } => (
                user_id,
                Operation::DeleteNode {
                    node_id: node_id.clone(),
                },
            ),
            ServerEvent::EdgeAdded { user_id, edge } => {
                (user_id, Operation::AddEdge { edge: edge.clone() })
            }
            ServerEvent::EdgeUpdated {
                user_id,
                edge_id,
                updates,
            } => (
                user_id,
                Operation::UpdateEdge {
                    edge_id: edge_id.clone(),
                    updates: updates.clone(),
                },
            ),
            ServerEvent::EdgeDeleted { user_id, edge_id } => (
                user_id,
                Operation::DeleteEdge {
                    edge_id: edge_id.clone(),
                },
            ),
            _ => return None,
        };
        Some((user_id.as_str(), operation))
    }

    pub fn error(err: &ValidationError) -> Self {
        ServerEvent::Error {
            message: err.message.clone(),
            operation: err.operation.clone(),
        }
    }

    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::UserJoined { .. } => "user-joined",
            ServerEvent::UserLeft { .. } => "user-left",
            ServerEvent::NodeAdded { .. } => "node-added",
            ServerEvent::NodeUpdated { .. } => "node-updated",
            ServerEvent::NodeDeleted { .. } => "node-deleted",
            ServerEvent::EdgeAdded { .. } => "edge-added",
            ServerEvent::EdgeUpdated { .. } => "edge-updated",
            ServerEvent::EdgeDeleted { .. } => "edge-deleted",
            ServerEvent::OperationSuccess { .. } => "operation-success",
            ServerEvent::Error { .. } => "error",
        }
    }
}
