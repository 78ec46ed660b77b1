//! # Event Bus Implementation
//!
//! The EventBus is the central messaging hub of the runtime. The polling
//! engine publishes typed events onto it and every registered listener
//! (the command dispatcher, the passive dispatcher, and any user listeners)
//! receives them in subscription order.
//!
//! ## Features
//!
//! - **Typed Listener Table**: listeners are keyed by [`EventKind`]
//! - **Ordered Delivery**: each handler is awaited to completion before the
//!   next one runs, and a dispatch lock serializes whole events so one event
//!   finishes before the next begins
//! - **Cooperative Removal**: [`ListenerHandle::remove`] flips an alive flag;
//!   the removal is observed from the next publish, never retroactively
//!   within the dispatch pass in progress
//! - **Handler Isolation**: a failing handler is logged and treated as
//!   complete; it never stops delivery to the remaining listeners
//!
//! ## Design Decisions
//!
//! Delivery iterates a snapshot of the alive listeners taken at publish time,
//! so handlers may freely register or remove listeners while an event is in
//! flight without invalidating the pass.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::{Broadcast, ChatMessage, Subscription};

/// A discrete message on the bus. Events are immutable once published; the
/// sequence number is stamped by the publisher and increases monotonically.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The new messages discovered by a single chat poll, oldest first.
    MessageBatch { messages: Vec<ChatMessage>, seq: u64 },
    /// A newly detected channel subscription.
    SubscriptionChanged { subscription: Subscription, seq: u64 },
    /// The active broadcast changed (went live, ended, or was replaced).
    BroadcastUpdated { broadcast: Broadcast, seq: u64 },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::MessageBatch { .. } => EventKind::MessageBatch,
            Event::SubscriptionChanged { .. } => EventKind::SubscriptionChanged,
            Event::BroadcastUpdated { .. } => EventKind::BroadcastUpdated,
        }
    }

    pub fn seq(&self) -> u64 {
        match self {
            Event::MessageBatch { seq, .. }
            | Event::SubscriptionChanged { seq, .. }
            | Event::BroadcastUpdated { seq, .. } => *seq,
        }
    }
}

/// Listener-table key: the type of event a listener is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum EventKind {
    MessageBatch,
    SubscriptionChanged,
    BroadcastUpdated,
}

/// Boxed async listener. The handler receives the event payload and its own
/// [`ListenerHandle`], through which it may remove itself.
pub type ListenerFn =
    Arc<dyn Fn(Event, ListenerHandle) -> BoxFuture<'static, EventResult<()>> + Send + Sync>;

struct ListenerEntry {
    id: Uuid,
    alive: Arc<AtomicBool>,
    handler: ListenerFn,
}

/// Handle returned by [`EventBus::listen`]. Removal is cooperative: the flag
/// flips immediately, but a dispatch pass already in progress still delivers
/// the current event to this listener.
#[derive(Clone)]
pub struct ListenerHandle {
    id: Uuid,
    alive: Arc<AtomicBool>,
}

impl ListenerHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn remove(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// # EventBus
///
/// Typed publish/subscribe core. Listeners live in an explicit table keyed by
/// [`EventKind`]; removal only flips an alive flag and never mutates the table
/// mid-iteration.
#[derive(Default)]
pub struct EventBus {
    listeners: DashMap<EventKind, Vec<ListenerEntry>>,
    dispatch_lock: tokio::sync::Mutex<()>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for one event kind and returns its handle.
    ///
    /// Dead entries for the kind are pruned here, outside any dispatch pass.
    pub fn listen(&self, kind: EventKind, handler: ListenerFn) -> ListenerHandle {
        let id = Uuid::new_v4();
        let alive = Arc::new(AtomicBool::new(true));
        let mut entries = self.listeners.entry(kind).or_default();
        entries.retain(|e| e.alive.load(Ordering::SeqCst));
        entries.push(ListenerEntry {
            id,
            alive: alive.clone(),
            handler,
        });
        debug!(%kind, %id, "listener registered");
        ListenerHandle { id, alive }
    }

    /// Delivers `event` to every alive listener of its kind, in subscription
    /// order, awaiting each handler to completion before invoking the next.
    ///
    /// Concurrent publishes queue on the dispatch lock, so all listeners of
    /// one event finish before the next event starts. Handler errors are
    /// logged and never propagate to the publisher.
    ///
    /// Not reentrant: a listener that awaits `publish` from inside its own
    /// handler deadlocks on the dispatch lock. Listeners that need to emit
    /// events spawn a task for it.
    pub async fn publish(&self, event: Event) -> EventResult<()> {
        let _dispatch = self.dispatch_lock.lock().await;
        debug!(kind = %event.kind(), seq = event.seq(), "publishing event");

        // Snapshot the alive listeners before awaiting anything so the table
        // guard is released and handlers may touch the bus themselves.
        let snapshot: Vec<(ListenerFn, ListenerHandle)> = self
            .listeners
            .get(&event.kind())
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.alive.load(Ordering::SeqCst))
                    .map(|e| {
                        (
                            e.handler.clone(),
                            ListenerHandle {
                                id: e.id,
                                alive: e.alive.clone(),
                            },
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        for (handler, handle) in snapshot {
            let id = handle.id;
            if let Err(e) = handler(event.clone(), handle).await {
                warn!(listener = %id, error = %e, "listener failed; continuing delivery");
            }
        }
        Ok(())
    }

    /// Number of currently alive listeners across all event kinds.
    pub fn size(&self) -> usize {
        self.listeners
            .iter()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.alive.load(Ordering::SeqCst))
                    .count()
            })
            .sum()
    }
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("listener failed: {message}")]
    HandlerFailed { message: String },
}

impl EventError {
    pub fn handler<S: Into<String>>(message: S) -> Self {
        EventError::HandlerFailed {
            message: message.into(),
        }
    }
}

pub type EventResult<T> = Result<T, EventError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Mutex;

    fn batch(seq: u64) -> Event {
        Event::MessageBatch {
            messages: vec![crate::types::ChatMessage::new("m1", "u1", "alice", "hi")],
            seq,
        }
    }

    fn recording_listener(log: Arc<Mutex<Vec<String>>>, tag: &str) -> ListenerFn {
        let tag = tag.to_string();
        Arc::new(move |_event, _handle| {
            let log = log.clone();
            let tag = tag.clone();
            Box::pin(async move {
                log.lock().await.push(tag);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn test_delivery_in_subscription_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.listen(EventKind::MessageBatch, recording_listener(log.clone(), "a"));
        bus.listen(EventKind::MessageBatch, recording_listener(log.clone(), "b"));
        bus.listen(EventKind::MessageBatch, recording_listener(log.clone(), "c"));

        bus.publish(batch(1)).await.unwrap();
        assert_eq!(*log.lock().await, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_listener_only_receives_its_kind() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let count_clone = count.clone();
        bus.listen(
            EventKind::BroadcastUpdated,
            Arc::new(move |_event, _handle| {
                let count = count_clone.clone();
                Box::pin(async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        );

        bus.publish(batch(1)).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failing_listener_does_not_stop_delivery() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.listen(
            EventKind::MessageBatch,
            Arc::new(|_event, _handle| Box::pin(async { Err(EventError::handler("boom")) })),
        );
        bus.listen(
            EventKind::MessageBatch,
            recording_listener(log.clone(), "after"),
        );

        bus.publish(batch(1)).await.unwrap();
        assert_eq!(*log.lock().await, vec!["after"]);
    }

    #[tokio::test]
    async fn test_removal_takes_effect_next_publish() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let count_clone = count.clone();
        bus.listen(
            EventKind::MessageBatch,
            Arc::new(move |_event, handle| {
                let count = count_clone.clone();
                Box::pin(async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    // one-shot: remove during our own invocation
                    handle.remove();
                    Ok(())
                })
            }),
        );

        bus.publish(batch(1)).await.unwrap();
        bus.publish(batch(2)).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_removal_mid_pass_is_not_retroactive() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        // The first listener removes the second; the second still gets the
        // current event because the snapshot was taken at publish time.
        let second_handle: Arc<Mutex<Option<ListenerHandle>>> = Arc::new(Mutex::new(None));

        let second_clone = second_handle.clone();
        let log_a = log.clone();
        bus.listen(
            EventKind::MessageBatch,
            Arc::new(move |_event, _handle| {
                let second = second_clone.clone();
                let log = log_a.clone();
                Box::pin(async move {
                    log.lock().await.push("a".to_string());
                    if let Some(handle) = second.lock().await.as_ref() {
                        handle.remove();
                    }
                    Ok(())
                })
            }),
        );
        let handle = bus.listen(EventKind::MessageBatch, recording_listener(log.clone(), "b"));
        *second_handle.lock().await = Some(handle);

        bus.publish(batch(1)).await.unwrap();
        assert_eq!(*log.lock().await, vec!["a", "b"]);

        bus.publish(batch(2)).await.unwrap();
        assert_eq!(*log.lock().await, vec!["a", "b", "a"]);
    }

    #[tokio::test]
    async fn test_size_counts_alive_listeners() {
        let bus = EventBus::new();
        let h1 = bus.listen(
            EventKind::MessageBatch,
            Arc::new(|_e, _h| Box::pin(async { Ok(()) })),
        );
        let _h2 = bus.listen(
            EventKind::SubscriptionChanged,
            Arc::new(|_e, _h| Box::pin(async { Ok(()) })),
        );

        assert_eq!(bus.size(), 2);
        h1.remove();
        assert_eq!(bus.size(), 1);
    }
}
