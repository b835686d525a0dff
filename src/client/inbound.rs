//! Inbound side of the op scheduler
//!
//! Remote operations are delivered to a [`GraphSubscriber`] after dropping
//! echoes of the local user's own operations. In batched mode, bursts of
//! updates to the same element are coalesced and only the latest payload is
//! delivered once the window closes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use super::timers::KeyedTimers;
use crate::config::ClientConfig;
use crate::protocol::ServerEvent;
use crate::types::{MindMap, Operation, OperationKind, Participant, UserId};

/// Callbacks for events arriving on a subscribed graph.
///
/// Only remote operations are required; the rest default to no-ops.
pub trait GraphSubscriber: Send + Sync + 'static {
    /// An operation made by another collaborator
    fn on_remote_operation(&self, user_id: &str, operation: &Operation);

    /// Roster after someone joined or left
    fn on_roster(&self, _participants: &[Participant]) {}

    /// The server accepted one of our operations
    fn on_ack(&self, _operation: OperationKind, _id: &str) {}

    /// The server rejected one of our events
    fn on_error(&self, _operation: &str, _message: &str) {}
}

/// A shared mind-map kept in sync with remote operations
impl GraphSubscriber for Mutex<MindMap> {
    fn on_remote_operation(&self, user_id: &str, operation: &Operation) {
        if !self.lock().apply(operation) {
            trace!(user = %user_id, "{} {} had no effect", operation.kind(), operation.target_id());
        }
    }
}

/// How remote updates are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// Every operation is delivered as it arrives
    #[default]
    Immediate,
    /// Updates are coalesced per element within the window
    Batched(Duration),
}

impl BatchMode {
    /// Batched with the configured window
    pub fn batched(config: &ClientConfig) -> Self {
        BatchMode::Batched(config.batch_window)
    }
}

type BatchKey = (OperationKind, String);

struct PendingUpdate {
    user_id: UserId,
    operation: Operation,
}

/// Coalesces updates per (kind, id). The window opens with the first update
/// of a key; later updates in the window only replace the payload.
struct UpdateBatcher {
    window: Duration,
    pending: Arc<Mutex<HashMap<BatchKey, PendingUpdate>>>,
    timers: KeyedTimers<BatchKey>,
}

impl UpdateBatcher {
    fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Arc::new(Mutex::new(HashMap::new())),
            timers: KeyedTimers::new(),
        }
    }

    fn enqueue(&self, user_id: &str, operation: Operation, subscriber: Arc<dyn GraphSubscriber>) {
        let key = (operation.kind(), operation.target_id().to_string());
        self.pending.lock().insert(
            key.clone(),
            PendingUpdate {
                user_id: user_id.to_string(),
                operation,
            },
        );

        let pending = Arc::clone(&self.pending);
        let flush_key = key.clone();
        self.timers.start_if_idle(key, self.window, move || {
            let update = pending.lock().remove(&flush_key);
            if let Some(update) = update {
                subscriber.on_remote_operation(&update.user_id, &update.operation);
            }
        });
    }

    /// Drop a pending update that a delete has superseded
    fn discard(&self, key: &BatchKey) {
        self.timers.cancel(key);
        self.pending.lock().remove(key);
    }

    /// Deliver a pending update now instead of at the end of its window
    fn flush(&self, key: &BatchKey, subscriber: &dyn GraphSubscriber) {
        self.timers.cancel(key);
        let update = self.pending.lock().remove(key);
        if let Some(update) = update {
            subscriber.on_remote_operation(&update.user_id, &update.operation);
        }
    }

    fn cancel(&self) -> usize {
        self.pending.lock().clear();
        self.timers.cancel_all()
    }
}

/// Routes server events for one subscription
pub(crate) struct InboundPipeline {
    local_user_id: UserId,
    subscriber: Arc<dyn GraphSubscriber>,
    batcher: Option<UpdateBatcher>,
}

impl InboundPipeline {
    pub(crate) fn new(
        local_user_id: impl Into<String>,
        subscriber: Arc<dyn GraphSubscriber>,
        mode: BatchMode,
    ) -> Self {
        let batcher = match mode {
            BatchMode::Immediate => None,
            BatchMode::Batched(window) => Some(UpdateBatcher::new(window)),
        };
        Self {
            local_user_id: local_user_id.into(),
            subscriber,
            batcher,
        }
    }

    pub(crate) fn handle(&self, event: &ServerEvent) {
        match event {
            ServerEvent::UserJoined { participants, .. }
            | ServerEvent::UserLeft { participants, .. } => self.subscriber.on_roster(participants),
            ServerEvent::OperationSuccess { operation, id, .. } => {
                self.subscriber.on_ack(*operation, id)
            }
            ServerEvent::Error { message, operation } => {
                self.subscriber.on_error(operation, message)
            }
            ServerEvent::Connected { .. } => {}
            ServerEvent::NodeAdded { .. }
            | ServerEvent::NodeUpdated { .. }
            | ServerEvent::NodeDeleted { .. }
            | ServerEvent::EdgeAdded { .. }
            | ServerEvent::EdgeUpdated { .. }
            | ServerEvent::EdgeDeleted { .. } => {
                if let Some((user_id, operation)) = event.remote_operation() {
                    self.handle_remote(user_id, operation);
                }
            }
        }
    }

    fn handle_remote(&self, user_id: &str, operation: Operation) {
        if user_id == self.local_user_id {
            trace!("ignoring echo of own {}", operation.kind());
            return;
        }

        let kind = operation.kind();
        match &self.batcher {
            Some(batcher) if kind.is_update() => {
                batcher.enqueue(user_id, operation, Arc::clone(&self.subscriber));
            }
            Some(batcher) => {
                // An update still pending for the same element was sent first
                let key = (kind.update_kind(), operation.target_id().to_string());
                if kind.is_delete() {
                    batcher.discard(&key);
                } else {
                    batcher.flush(&key, self.subscriber.as_ref());
                }
                self.subscriber.on_remote_operation(user_id, &operation);
            }
            None => self.subscriber.on_remote_operation(user_id, &operation),
        }
    }

    /// Cancel batch timers and drop pending updates
    pub(crate) fn cancel(&self) -> usize {
        self.batcher.as_ref().map_or(0, UpdateBatcher::cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Edge, Node};
    use serde_json::json;
    use tokio::time::sleep;

    #[derive(Default)]
    struct Recorder {
        operations: Mutex<Vec<(String, Operation)>>,
        rosters: Mutex<Vec<usize>>,
        acks: Mutex<Vec<(OperationKind, String)>>,
        errors: Mutex<Vec<String>>,
    }

    impl GraphSubscriber for Recorder {
        fn on_remote_operation(&self, user_id: &str, operation: &Operation) {
            self.operations
                .lock()
                .push((user_id.to_string(), operation.clone()));
        }

        fn on_roster(&self, participants: &[Participant]) {
            self.rosters.lock().push(participants.len());
        }

        fn on_ack(&self, operation: OperationKind, id: &str) {
            self.acks.lock().push((operation, id.to_string()));
        }

        fn on_error(&self, _operation: &str, message: &str) {
            self.errors.lock().push(message.to_string());
        }
    }

    fn update(user: &str, node_id: &str, label: &str) -> ServerEvent {
        ServerEvent::NodeUpdated {
            user_id: user.to_string(),
            node_id: node_id.to_string(),
            updates: json!({"data": {"label": label}}),
        }
    }

    fn pipeline(mode: BatchMode) -> (Arc<Recorder>, InboundPipeline) {
        let recorder = Arc::new(Recorder::default());
        let pipeline = InboundPipeline::new("A", recorder.clone(), mode);
        (recorder, pipeline)
    }

    fn relay_events(user: &str) -> Vec<ServerEvent> {
        let user_id = user.to_string();
        vec![
            ServerEvent::NodeAdded {
                user_id: user_id.clone(),
                node: Node::new("n1", json!({})),
            },
            update(user, "n1", "label"),
            ServerEvent::NodeDeleted {
                user_id: user_id.clone(),
                node_id: "n1".to_string(),
            },
            ServerEvent::EdgeAdded {
                user_id: user_id.clone(),
                edge: Edge::new("e1", "n1", "n2"),
            },
            ServerEvent::EdgeUpdated {
                user_id: user_id.clone(),
                edge_id: "e1".to_string(),
                updates: json!({"data": {"weight": 2}}),
            },
            ServerEvent::EdgeDeleted {
                user_id,
                edge_id: "e1".to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn test_echo_is_dropped() {
        for mode in [BatchMode::Immediate, BatchMode::Batched(Duration::from_millis(50))] {
            let (recorder, pipeline) = pipeline(mode);

            for event in relay_events("A") {
                pipeline.handle(&event);
            }
            assert!(recorder.operations.lock().is_empty(), "{:?}", mode);

            for event in relay_events("B") {
                pipeline.handle(&event);
            }
            pipeline.cancel();
            let operations = recorder.operations.lock();
            assert!(!operations.is_empty(), "{:?}", mode);
            assert!(operations.iter().all(|(user, _)| user == "B"));
        }
    }

    #[tokio::test]
    async fn test_every_remote_kind_is_delivered() {
        let (recorder, pipeline) = pipeline(BatchMode::Immediate);

        for event in relay_events("B") {
            pipeline.handle(&event);
        }

        let kinds: Vec<OperationKind> = recorder
            .operations
            .lock()
            .iter()
            .map(|(_, op)| op.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                OperationKind::AddNode,
                OperationKind::UpdateNode,
                OperationKind::DeleteNode,
                OperationKind::AddEdge,
                OperationKind::UpdateEdge,
                OperationKind::DeleteEdge,
            ]
        );
    }

    #[tokio::test]
    async fn test_non_operation_events_reach_their_hooks() {
        let (recorder, pipeline) = pipeline(BatchMode::Immediate);

        pipeline.handle(&ServerEvent::UserJoined {
            user_id: "B".to_string(),
            participants: vec![
                Participant::new("m1".into(), "A".into(), "c1".into(), 1),
                Participant::new("m1".into(), "B".into(), "c2".into(), 2),
            ],
        });
        pipeline.handle(&ServerEvent::OperationSuccess {
            operation: OperationKind::AddNode,
            id: "n1".to_string(),
            timestamp: 0,
        });
        pipeline.handle(&ServerEvent::Error {
            message: "Missing required field 'node'".to_string(),
            operation: "add-node".to_string(),
        });

        assert_eq!(*recorder.rosters.lock(), vec![2]);
        assert_eq!(
            *recorder.acks.lock(),
            vec![(OperationKind::AddNode, "n1".to_string())]
        );
        assert_eq!(recorder.errors.lock().len(), 1);
        assert!(recorder.operations.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batched_updates_keep_latest_payload() {
        let (recorder, pipeline) = pipeline(BatchMode::Batched(Duration::from_millis(50)));

        pipeline.handle(&update("B", "n1", "one"));
        sleep(Duration::from_millis(20)).await;
        pipeline.handle(&update("B", "n1", "two"));
        pipeline.handle(&update("B", "n2", "other"));
        assert!(recorder.operations.lock().is_empty());

        sleep(Duration::from_millis(31)).await;
        let operations = recorder.operations.lock().clone();
        assert_eq!(operations.len(), 1);
        assert_eq!(
            operations[0].1,
            Operation::UpdateNode {
                node_id: "n1".to_string(),
                updates: json!({"data": {"label": "two"}}),
            }
        );

        sleep(Duration::from_millis(20)).await;
        assert_eq!(recorder.operations.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batched_mode_applies_adds_and_deletes_immediately() {
        let (recorder, pipeline) = pipeline(BatchMode::Batched(Duration::from_millis(50)));

        pipeline.handle(&ServerEvent::NodeAdded {
            user_id: "B".to_string(),
            node: Node::new("n1", json!({})),
        });
        assert_eq!(recorder.operations.lock().len(), 1);

        pipeline.handle(&update("B", "n1", "doomed"));
        pipeline.handle(&ServerEvent::NodeDeleted {
            user_id: "B".to_string(),
            node_id: "n1".to_string(),
        });
        assert_eq!(recorder.operations.lock().len(), 2);

        sleep(Duration::from_millis(100)).await;
        let operations = recorder.operations.lock();
        assert_eq!(operations.len(), 2);
        assert_eq!(operations[1].1.kind(), OperationKind::DeleteNode);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batched_update_lands_before_following_add() {
        let (recorder, pipeline) = pipeline(BatchMode::Batched(Duration::from_millis(50)));

        pipeline.handle(&update("B", "n1", "before"));
        pipeline.handle(&ServerEvent::NodeAdded {
            user_id: "B".to_string(),
            node: Node::new("n1", json!({"label": "fresh"})),
        });

        let kinds: Vec<OperationKind> = recorder
            .operations
            .lock()
            .iter()
            .map(|(_, op)| op.kind())
            .collect();
        assert_eq!(kinds, vec![OperationKind::UpdateNode, OperationKind::AddNode]);

        sleep(Duration::from_millis(100)).await;
        assert_eq!(recorder.operations.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_batch() {
        let (recorder, pipeline) = pipeline(BatchMode::Batched(Duration::from_millis(50)));

        pipeline.handle(&update("B", "n1", "one"));
        pipeline.handle(&update("B", "n2", "two"));
        assert_eq!(pipeline.cancel(), 2);

        sleep(Duration::from_millis(100)).await;
        assert!(recorder.operations.lock().is_empty());
    }

    #[test]
    fn test_mind_map_subscriber_applies_operations() {
        let map = Mutex::new(MindMap::new());

        map.on_remote_operation(
            "B",
            &Operation::AddNode {
                node: Node::new("n1", json!({"label": "Root"})),
            },
        );
        map.on_remote_operation(
            "B",
            &Operation::UpdateNode {
                node_id: "n1".to_string(),
                updates: json!({"data": {"label": "Renamed"}}),
            },
        );

        let map = map.lock();
        assert_eq!(map.node("n1").map(|n| n.data["label"].clone()), Some(json!("Renamed")));
    }
}
