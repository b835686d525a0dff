//! Local mind-map state that remote operations are applied to

use serde::{Deserialize, Serialize};

use super::node::merge_updates;
use super::{Edge, Node, Operation};

/// Node/edge content of one graph
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MindMap {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl MindMap {
    /// Create an empty mind-map
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mind-map with nodes and edges
    pub fn with_data(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Apply an operation with last-writer-wins semantics.
    ///
    /// Returns false when the operation referenced an element that does not
    /// exist (or carried a non-object update), leaving the map untouched.
    pub fn apply(&mut self, operation: &Operation) -> bool {
        match operation {
            Operation::AddNode { node } => {
                match self.nodes.iter_mut().find(|n| n.id == node.id) {
                    Some(existing) => *existing = node.clone(),
                    None => self.nodes.push(node.clone()),
                }
                true
            }
            Operation::UpdateNode { node_id, updates } => {
                let Some(existing) = self.nodes.iter_mut().find(|n| &n.id == node_id) else {
                    return false;
                };
                match merge_updates(existing, updates) {
                    Some(merged) => {
                        *existing = merged;
                        true
                    }
                    None => false,
                }
            }
            Operation::DeleteNode { node_id } => {
                let before = self.nodes.len();
                self.nodes.retain(|n| &n.id != node_id);
                // Edges left dangling by the delete go with it
                self.edges
                    .retain(|e| &e.source != node_id && &e.target != node_id);
                before != self.nodes.len()
            }
            Operation::AddEdge { edge } => {
                match self.edges.iter_mut().find(|e| e.id == edge.id) {
                    Some(existing) => *existing = edge.clone(),
                    None => self.edges.push(edge.clone()),
                }
                true
            }
            Operation::UpdateEdge { edge_id, updates } => {
                let Some(existing) = self.edges.iter_mut().find(|e| &e.id == edge_id) else {
                    return false;
                };
                match merge_updates(existing, updates) {
                    Some(merged) => {
                        *existing = merged;
                        true
                    }
                    None => false,
                }
            }
            Operation::DeleteEdge { edge_id } => {
                let before = self.edges.len();
                self.edges.retain(|e| &e.id != edge_id);
                before != self.edges.len()
            }
        }
    }
}
