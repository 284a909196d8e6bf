//! # Event Bus
//!
//! Typed publish/subscribe fan-out for change notifications. Subscribers
//! register for a single [`EventKind`] and receive events over an unbounded
//! channel; delivery within a kind follows registration order.
//!
//! Subscriptions are identified by a monotonic id handed out at registration,
//! so removal is deterministic: `unsubscribe` takes the handle back and
//! removes exactly that registration. Dropped receivers are additionally
//! pruned on the next publish to the same kind.

use crate::shared::event::{ChangeEvent, EventKind};
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};

/// Fan-out bus for [`ChangeEvent`]s
#[derive(Debug, Default)]
pub struct EventBus {
    inner: RwLock<BusInner>,
}

#[derive(Debug, Default)]
struct BusInner {
    next_id: u64,
    topics: HashMap<EventKind, Vec<BusSubscriber>>,
}

#[derive(Debug)]
struct BusSubscriber {
    id: u64,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

/// Handle to a single bus registration
#[derive(Debug)]
pub struct Subscription {
    kind: EventKind,
    id: u64,
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl Subscription {
    /// The kind this subscription receives
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Receive the next event, `None` once the bus is gone
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Consume the handle, keeping only the receiving half.
    ///
    /// Used when subscriptions are merged into one stream; cleanup then
    /// happens through publish-time pruning instead of `unsubscribe`.
    pub fn into_receiver(self) -> mpsc::UnboundedReceiver<ChangeEvent> {
        self.rx
    }
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for one event kind
    pub async fn subscribe(&self, kind: EventKind) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .topics
            .entry(kind.clone())
            .or_default()
            .push(BusSubscriber { id, tx });
        Subscription { kind, id, rx }
    }

    /// Remove a registration deterministically by its handle
    pub async fn unsubscribe(&self, subscription: &Subscription) {
        let mut inner = self.inner.write().await;
        if let Some(subscribers) = inner.topics.get_mut(&subscription.kind) {
            subscribers.retain(|s| s.id != subscription.id);
        }
    }

    /// Deliver an event to every live subscriber of its kind, in
    /// registration order. Closed receivers are pruned as a side effect.
    pub async fn publish(&self, event: ChangeEvent) {
        let mut inner = self.inner.write().await;
        if let Some(subscribers) = inner.topics.get_mut(&event.kind) {
            subscribers.retain(|s| s.tx.send(event.clone()).is_ok());
        }
    }

    /// Number of live registrations for a kind
    pub async fn subscriber_count(&self, kind: &EventKind) -> usize {
        let inner = self.inner.read().await;
        inner.topics.get(kind).map(|s| s.len()).unwrap_or(0)
    }
}
