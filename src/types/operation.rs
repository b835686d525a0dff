//! Graph edit operations

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Edge, GraphId, Node, UserId};

/// The six operation kinds, named as on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    AddNode,
    UpdateNode,
    DeleteNode,
    AddEdge,
    UpdateEdge,
    DeleteEdge,
}

impl OperationKind {
    pub const ALL: [OperationKind; 6] = [
        OperationKind::AddNode,
        OperationKind::UpdateNode,
        OperationKind::DeleteNode,
        OperationKind::AddEdge,
        OperationKind::UpdateEdge,
        OperationKind::DeleteEdge,
    ];

    /// Client-side event name, e.g. `add-node`
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::AddNode => "add-node",
            OperationKind::UpdateNode => "update-node",
            OperationKind::DeleteNode => "delete-node",
            OperationKind::AddEdge => "add-edge",
            OperationKind::UpdateEdge => "update-edge",
            OperationKind::DeleteEdge => "delete-edge",
        }
    }

    pub fn is_update(&self) -> bool {
        matches!(self, OperationKind::UpdateNode | OperationKind::UpdateEdge)
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, OperationKind::DeleteNode | OperationKind::DeleteEdge)
    }

    pub fn targets_node(&self) -> bool {
        matches!(
            self,
            OperationKind::AddNode | OperationKind::UpdateNode | OperationKind::DeleteNode
        )
    }

    /// The update kind acting on the same element type
    pub fn update_kind(&self) -> OperationKind {
        if self.targets_node() {
            OperationKind::UpdateNode
        } else {
            OperationKind::UpdateEdge
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single edit of a node or an edge
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    AddNode { node: Node },
    UpdateNode { node_id: String, updates: Value },
    DeleteNode { node_id: String },
    AddEdge { edge: Edge },
    UpdateEdge { edge_id: String, updates: Value },
    DeleteEdge { edge_id: String },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::AddNode { .. } => OperationKind::AddNode,
            Operation::UpdateNode { .. } => OperationKind::UpdateNode,
            Operation::DeleteNode { .. } => OperationKind::DeleteNode,
            Operation::AddEdge { .. } => OperationKind::AddEdge,
            Operation::UpdateEdge { .. } => OperationKind::UpdateEdge,
            Operation::DeleteEdge { .. } => OperationKind::DeleteEdge,
        }
    }

    /// Id of the node or edge the operation acts on
    pub fn target_id(&self) -> &str {
        match self {
            Operation::AddNode { node } => &node.id,
            Operation::UpdateNode { node_id, .. } | Operation::DeleteNode { node_id } => node_id,
            Operation::AddEdge { edge } => &edge.id,
            Operation::UpdateEdge { edge_id, .. } | Operation::DeleteEdge { edge_id } => edge_id,
        }
    }
}

/// A validated operation addressed to a graph
#[derive(Debug, Clone, PartialEq)]
pub struct OperationEvent {
    pub graph_id: GraphId,
    pub user_id: UserId,
    pub operation: Operation,
}
