//! Client op scheduler
//!
//! Adds and deletes go out immediately. Updates are debounced per element:
//! a burst of edits to one node or edge produces a single `update-*` event
//! carrying the last payload, sent once the element has been quiet for the
//! debounce window. Every outbound path is a silent no-op while the channel
//! is disconnected.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, trace};

use super::channel::SyncChannel;
use super::inbound::{BatchMode, GraphSubscriber, InboundPipeline};
use super::timers::KeyedTimers;
use crate::config::ClientConfig;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::types::{Edge, GraphId, Node, Operation, OperationKind, UserId};

/// Schedules local operations for one graph onto a [`SyncChannel`]
pub struct OpScheduler<C: SyncChannel + 'static> {
    channel: Arc<C>,
    graph_id: GraphId,
    user_id: UserId,
    debounce_window: Duration,
    pending: KeyedTimers<(OperationKind, String)>,
}

impl<C: SyncChannel + 'static> OpScheduler<C> {
    pub fn new(
        channel: Arc<C>,
        graph_id: impl Into<String>,
        user_id: impl Into<String>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            channel,
            graph_id: graph_id.into(),
            user_id: user_id.into(),
            debounce_window: config.debounce_window,
            pending: KeyedTimers::new(),
        }
    }

    pub fn graph_id(&self) -> &str {
        &self.graph_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn add_node(&self, node: Node) -> bool {
        self.send_now(Operation::AddNode { node })
    }

    pub fn update_node(&self, node_id: impl Into<String>, updates: Value) {
        self.debounce(Operation::UpdateNode {
            node_id: node_id.into(),
            updates,
        });
    }

    /// Send a node delete, discarding any update still waiting for it
    pub fn delete_node(&self, node_id: impl Into<String>) -> bool {
        let node_id = node_id.into();
        self.pending
            .cancel(&(OperationKind::UpdateNode, node_id.clone()));
        self.send_now(Operation::DeleteNode { node_id })
    }

    pub fn add_edge(&self, edge: Edge) -> bool {
        self.send_now(Operation::AddEdge { edge })
    }

    pub fn update_edge(&self, edge_id: impl Into<String>, updates: Value) {
        self.debounce(Operation::UpdateEdge {
            edge_id: edge_id.into(),
            updates,
        });
    }

    pub fn delete_edge(&self, edge_id: impl Into<String>) -> bool {
        let edge_id = edge_id.into();
        self.pending
            .cancel(&(OperationKind::UpdateEdge, edge_id.clone()));
        self.send_now(Operation::DeleteEdge { edge_id })
    }

    /// Number of debounced updates not yet sent
    pub fn pending_updates(&self) -> usize {
        self.pending.pending()
    }

    /// Drop every debounced update without sending it
    pub fn cancel_pending(&self) -> usize {
        let cancelled = self.pending.cancel_all();
        if cancelled > 0 {
            debug!(graph = %self.graph_id, cancelled, "discarded pending updates");
        }
        cancelled
    }

    /// Deliver remote operations on this channel to `subscriber`.
    ///
    /// The subscriber stays registered until the returned [`Subscription`]
    /// is unsubscribed or dropped.
    pub fn subscribe(&self, subscriber: Arc<dyn GraphSubscriber>, mode: BatchMode) -> Subscription {
        let pipeline = Arc::new(InboundPipeline::new(self.user_id.as_str(), subscriber, mode));

        let inbound = Arc::clone(&pipeline);
        let listener_id = self
            .channel
            .add_listener(Arc::new(move |event: &ServerEvent| inbound.handle(event)));

        let channel = Arc::clone(&self.channel);
        Subscription {
            release: Some(Box::new(move || {
                channel.remove_listener(listener_id);
                pipeline.cancel();
            })),
        }
    }

    fn send_now(&self, operation: Operation) -> bool {
        if !self.channel.is_connected() {
            trace!("dropping {} while disconnected", operation.kind());
            return false;
        }
        self.channel
            .emit(ClientEvent::operation(&self.graph_id, &self.user_id, operation))
    }

    fn debounce(&self, operation: Operation) {
        let key = (operation.kind(), operation.target_id().to_string());
        let event = ClientEvent::operation(&self.graph_id, &self.user_id, operation);
        let channel = Arc::clone(&self.channel);

        self.pending.restart(key, self.debounce_window, move || {
            if channel.is_connected() {
                channel.emit(event);
            } else {
                trace!("dropping {} while disconnected", event.name());
            }
        });
    }
}

/// Handle for a registered [`GraphSubscriber`]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Remove the listener and cancel any pending batch
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}
