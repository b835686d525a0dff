//! Data types for the graph sync subsystem
//!
//! This module contains the node/edge payloads, participants and the
//! operation union shared by the server and the client.

mod graph;
mod node;
mod operation;
mod participant;

pub use graph::MindMap;
pub use node::{Edge, Node, Position};
pub use operation::{Operation, OperationEvent, OperationKind};
pub use participant::{Participant, ParticipantSet};

/// Opaque graph (mind-map) identifier
pub type GraphId = String;

/// Authenticated user identifier, trusted as given by the identity provider
pub type UserId = String;

/// Identifier of one transport connection
pub type ConnectionId = String;
