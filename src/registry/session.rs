//! Session registry: which connections collaborate on which graph

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::types::{GraphId, Participant, ParticipantSet, UserId};
use crate::utils::current_timestamp_millis;

/// Roster of one graph after a participant was removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterChange {
    pub graph_id: GraphId,
    /// The user whose participant entry was removed
    pub user_id: UserId,
    /// Remaining participants (empty when the entry was deleted)
    pub participants: ParticipantSet,
}

type Entry = HashMap<UserId, Participant>;

/// In-memory registry, one per server process.
///
/// Entries are keyed by user id, so a second join by the same user replaces
/// the first. All mutations go through a single mutex and never do I/O.
pub struct SessionRegistry {
    graphs: Mutex<HashMap<GraphId, Entry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            graphs: Mutex::new(HashMap::new()),
        }
    }

    /// Register a participant and return the full roster of the graph
    pub fn join(&self, graph_id: &str, user_id: &str, connection_id: &str) -> ParticipantSet {
        let mut graphs = self.graphs.lock();
        let entry = graphs.entry(graph_id.to_string()).or_default();
        entry.insert(
            user_id.to_string(),
            Participant::new(
                graph_id.to_string(),
                user_id.to_string(),
                connection_id.to_string(),
                current_timestamp_millis(),
            ),
        );
        roster(entry)
    }

    /// Remove a participant and return the remaining roster.
    ///
    /// Leaving a graph or user that is not registered is a no-op.
    pub fn leave(&self, graph_id: &str, user_id: &str) -> ParticipantSet {
        let mut graphs = self.graphs.lock();
        let Some(entry) = graphs.get_mut(graph_id) else {
            return Vec::new();
        };
        entry.remove(user_id);
        if entry.is_empty() {
            graphs.remove(graph_id);
            return Vec::new();
        }
        roster(entry)
    }

    /// Remove every participant held by a dropped connection
    pub fn remove_by_connection(&self, connection_id: &str) -> Vec<RosterChange> {
        let mut graphs = self.graphs.lock();
        let mut changes = Vec::new();

        for (graph_id, entry) in graphs.iter_mut() {
            let removed: Vec<UserId> = entry
                .values()
                .filter(|p| p.connection_id == connection_id)
                .map(|p| p.user_id.clone())
                .collect();

            for user_id in removed {
                entry.remove(&user_id);
                changes.push(RosterChange {
                    graph_id: graph_id.clone(),
                    user_id,
                    participants: Vec::new(),
                });
            }
        }

        for change in changes.iter_mut() {
            if let Some(entry) = graphs.get(&change.graph_id) {
                change.participants = roster(entry);
            }
        }
        graphs.retain(|_, entry| !entry.is_empty());

        changes
    }

    /// Current roster of a graph
    pub fn participants(&self, graph_id: &str) -> ParticipantSet {
        self.graphs.lock().get(graph_id).map(roster).unwrap_or_default()
    }

    pub fn contains(&self, graph_id: &str, user_id: &str) -> bool {
        self.graphs
            .lock()
            .get(graph_id)
            .is_some_and(|entry| entry.contains_key(user_id))
    }

    /// Number of graphs with at least one participant
    pub fn graph_count(&self) -> usize {
        self.graphs.lock().len()
    }

    /// Total participants across all graphs
    pub fn participant_count(&self) -> usize {
        self.graphs.lock().values().map(HashMap::len).sum()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn roster(entry: &Entry) -> ParticipantSet {
    let mut participants: ParticipantSet = entry.values().cloned().collect();
    participants.sort_by(|a, b| {
        a.joined_at
            .cmp(&b.joined_at)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    participants
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_join_returns_full_roster() {
        let registry = SessionRegistry::new();
        registry.join("m1", "alice", "c1");
        let roster = registry.join("m1", "bob", "c2");

        assert_eq!(roster.len(), 2);
        assert!(roster.iter().any(|p| p.user_id == "alice"));
        assert!(roster.iter().any(|p| p.user_id == "bob" && p.connection_id == "c2"));
    }

    #[test]
    fn test_join_twice_replaces() {
        let registry = SessionRegistry::new();
        registry.join("m1", "alice", "c1");
        let roster = registry.join("m1", "alice", "c2");

        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].connection_id, "c2");
    }

    #[test]
    fn test_leave_symmetry() {
        let registry = SessionRegistry::new();
        registry.join("m1", "alice", "c1");
        let remaining = registry.leave("m1", "alice");

        assert!(remaining.is_empty());
        assert_eq!(registry.graph_count(), 0);
        assert!(!registry.contains("m1", "alice"));
    }

    #[test]
    fn test_leave_keeps_others() {
        let registry = SessionRegistry::new();
        registry.join("m1", "alice", "c1");
        registry.join("m1", "bob", "c2");

        let remaining = registry.leave("m1", "alice");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].user_id, "bob");
    }

    #[test]
    fn test_leave_unknown_is_noop() {
        let registry = SessionRegistry::new();
        assert!(registry.leave("nowhere", "ghost").is_empty());

        registry.join("m1", "alice", "c1");
        let remaining = registry.leave("m1", "ghost");
        assert_eq!(remaining.len(), 1);
        assert_eq!(registry.graph_count(), 1);
    }

    #[test]
    fn test_remove_by_connection_across_graphs() {
        let registry = SessionRegistry::new();
        registry.join("m1", "alice", "c1");
        registry.join("m2", "alice", "c1");
        registry.join("m1", "bob", "c2");

        let mut changes = registry.remove_by_connection("c1");
        changes.sort_by(|a, b| a.graph_id.cmp(&b.graph_id));

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].graph_id, "m1");
        assert_eq!(changes[0].user_id, "alice");
        assert_eq!(changes[0].participants.len(), 1);
        assert_eq!(changes[1].graph_id, "m2");
        assert!(changes[1].participants.is_empty());

        assert_eq!(registry.graph_count(), 1);
        assert!(registry
            .participants("m1")
            .iter()
            .all(|p| p.connection_id != "c1"));
    }

    #[test]
    fn test_remove_by_unknown_connection() {
        let registry = SessionRegistry::new();
        registry.join("m1", "alice", "c1");
        assert!(registry.remove_by_connection("c9").is_empty());
        assert_eq!(registry.participant_count(), 1);
    }

    #[test]
    fn test_concurrent_joins_are_not_lost() {
        let registry = Arc::new(SessionRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = registry.clone();
                thread::spawn(move || {
                    registry.join("m1", &format!("user{}", i), &format!("c{}", i));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.participants("m1").len(), 16);
        assert_eq!(registry.graph_count(), 1);
    }
}
