//! Participant type: one connection's membership in one graph

use serde::{Deserialize, Serialize};

use super::{ConnectionId, GraphId, UserId};

/// A connection that has joined a graph's collaboration group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub graph_id: GraphId,
    pub user_id: UserId,
    pub connection_id: ConnectionId,
    /// Unix timestamp (milliseconds) of the join
    pub joined_at: i64,
}

impl Participant {
    pub fn new(graph_id: GraphId, user_id: UserId, connection_id: ConnectionId, joined_at: i64) -> Self {
        Self {
            graph_id,
            user_id,
            connection_id,
            joined_at,
        }
    }
}

/// The roster of a graph
pub type ParticipantSet = Vec<Participant>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_serializes_camel_case() {
        let p = Participant::new("m1".into(), "alice".into(), "c1".into(), 42);
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"graphId\":\"m1\""));
        assert!(json.contains("\"connectionId\":\"c1\""));
        assert!(json.contains("\"joinedAt\":42"));
    }
}
