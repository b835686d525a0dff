//! Required-field validation for inbound client events

use serde_json::Value;

use crate::error::ValidationError;
use crate::protocol::ClientEvent;
use crate::types::{GraphId, Operation, OperationEvent, UserId};

/// A client event that passed validation
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedEvent {
    Join { graph_id: GraphId, user_id: UserId },
    Leave { graph_id: GraphId, user_id: UserId },
    Operation(OperationEvent),
}

/// Validate an inbound event.
///
/// Every id field must be present and non-blank; node/edge payloads must be
/// present; updates must be non-empty JSON objects.
pub fn validate_event(event: ClientEvent) -> Result<ValidatedEvent, ValidationError> {
    let name = event.name();
    match event {
        ClientEvent::JoinGraph { graph_id, user_id } => Ok(ValidatedEvent::Join {
            graph_id: require(name, "graphId", graph_id)?,
            user_id: require(name, "userId", user_id)?,
        }),
        ClientEvent::LeaveGraph { graph_id, user_id } => Ok(ValidatedEvent::Leave {
            graph_id: require(name, "graphId", graph_id)?,
            user_id: require(name, "userId", user_id)?,
        }),
        ClientEvent::AddNode {
            graph_id,
            user_id,
            node,
        } => {
            let (graph_id, user_id) = addressing(name, graph_id, user_id)?;
            let mut node = node.ok_or_else(|| ValidationError::missing(name, "node"))?;
            node.id = require(name, "node.id", node.id)?;
            Ok(operation(graph_id, user_id, Operation::AddNode { node }))
        }
        ClientEvent::UpdateNode {
            graph_id,
            user_id,
            node_id,
            updates,
        } => {
            let (graph_id, user_id) = addressing(name, graph_id, user_id)?;
            let node_id = require(name, "nodeId", node_id)?;
            let updates = require_updates(name, updates)?;
            Ok(operation(graph_id, user_id, Operation::UpdateNode { node_id, updates }))
        }
        ClientEvent::DeleteNode {
            graph_id,
            user_id,
            node_id,
        } => {
            let (graph_id, user_id) = addressing(name, graph_id, user_id)?;
            let node_id = require(name, "nodeId", node_id)?;
            Ok(operation(graph_id, user_id, Operation::DeleteNode { node_id }))
        }
        ClientEvent::AddEdge {
            graph_id,
            user_id,
            edge,
        } => {
            let (graph_id, user_id) = addressing(name, graph_id, user_id)?;
            let mut edge = edge.ok_or_else(|| ValidationError::missing(name, "edge"))?;
            edge.id = require(name, "edge.id", edge.id)?;
            edge.source = require(name, "edge.source", edge.source)?;
            edge.target = require(name, "edge.target", edge.target)?;
            Ok(operation(graph_id, user_id, Operation::AddEdge { edge }))
        }
        ClientEvent::UpdateEdge {
            graph_id,
            user_id,
            edge_id,
            updates,
        } => {
            let (graph_id, user_id) = addressing(name, graph_id, user_id)?;
            let edge_id = require(name, "edgeId", edge_id)?;
            let updates = require_updates(name, updates)?;
            Ok(operation(graph_id, user_id, Operation::UpdateEdge { edge_id, updates }))
        }
        ClientEvent::DeleteEdge {
            graph_id,
            user_id,
            edge_id,
        } => {
            let (graph_id, user_id) = addressing(name, graph_id, user_id)?;
            let edge_id = require(name, "edgeId", edge_id)?;
            Ok(operation(graph_id, user_id, Operation::DeleteEdge { edge_id }))
        }
    }
}

fn operation(graph_id: GraphId, user_id: UserId, operation: Operation) -> ValidatedEvent {
    ValidatedEvent::Operation(OperationEvent {
        graph_id,
        user_id,
        operation,
    })
}

fn addressing(name: &str, graph_id: String, user_id: String) -> Result<(GraphId, UserId), ValidationError> {
    Ok((require(name, "graphId", graph_id)?, require(name, "userId", user_id)?))
}

fn require(name: &str, field: &str, value: String) -> Result<String, ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::missing(name, field))
    } else {
        Ok(value)
    }
}

fn require_updates(name: &str, updates: Option<Value>) -> Result<Value, ValidationError> {
    match updates {
        Some(Value::Object(map)) if !map.is_empty() => Ok(Value::Object(map)),
        Some(Value::Object(_)) => Err(ValidationError::new(name, "Field 'updates' must not be empty")),
        Some(_) => Err(ValidationError::new(name, "Field 'updates' must be an object")),
        None => Err(ValidationError::missing(name, "updates")),
    }
}
