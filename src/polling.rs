//! # Polling Engine
//!
//! Drives three independent polling schedules against the remote source
//! (broadcast discovery, chat retrieval, subscription retrieval) and
//! translates successful fetches into events on the bus.
//!
//! ## Schedule Independence
//!
//! Each schedule runs in its own task on its own interval; a slow or failing
//! schedule never delays another. Within one schedule the fetch is awaited
//! inline and missed ticks are skipped, so at most one fetch per schedule is
//! ever in flight: a tick that fires while the previous fetch is still
//! outstanding is dropped, not queued.
//!
//! ## Failure Semantics
//!
//! A failed fetch is logged and the schedule's state (held broadcast,
//! pagination cursor, chat history, seen subscriptions) is left untouched;
//! the next tick retries.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use dashmap::DashSet;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::PollingConfig;
use crate::event::{Event, EventBus};
use crate::source::ChatSource;
use crate::types::{Broadcast, ChatMessage};

pub struct PollingEngine {
    source: Arc<dyn ChatSource>,
    event_bus: Arc<EventBus>,
    config: PollingConfig,
    broadcast: RwLock<Option<Broadcast>>,
    page_token: RwLock<Option<String>>,
    history: RwLock<Vec<ChatMessage>>,
    seen_subscriptions: DashSet<String>,
    seq: AtomicU64,
}

impl PollingEngine {
    pub fn new(
        source: Arc<dyn ChatSource>,
        event_bus: Arc<EventBus>,
        config: PollingConfig,
    ) -> Self {
        Self {
            source,
            event_bus,
            config,
            broadcast: RwLock::new(None),
            page_token: RwLock::new(None),
            history: RwLock::new(Vec::new()),
            seen_subscriptions: DashSet::new(),
            seq: AtomicU64::new(0),
        }
    }

    /// The broadcast currently held by the engine, if any.
    pub async fn active_broadcast(&self) -> Option<Broadcast> {
        self.broadcast.read().await.clone()
    }

    /// Chat channel id of the held broadcast, used as the reply target.
    pub async fn active_chat_channel(&self) -> Option<String> {
        self.broadcast
            .read()
            .await
            .as_ref()
            .map(|b| b.chat_channel_id.clone())
    }

    /// Full in-memory chat history in fetch order.
    pub async fn chat_history(&self) -> Vec<ChatMessage> {
        self.history.read().await.clone()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// One broadcast-discovery cycle: publish [`Event::BroadcastUpdated`]
    /// only when the fetched broadcast differs from the held one. On failure
    /// the held broadcast is retained.
    pub async fn poll_broadcast_once(&self) {
        match self.source.fetch_active_broadcast().await {
            Ok(broadcast) => {
                let changed = self.broadcast.read().await.as_ref() != Some(&broadcast);
                if !changed {
                    return;
                }
                info!(broadcast = %broadcast.id, "active broadcast changed");
                *self.broadcast.write().await = Some(broadcast.clone());
                let event = Event::BroadcastUpdated {
                    broadcast,
                    seq: self.next_seq(),
                };
                let _ = self.event_bus.publish(event).await;
            }
            Err(e) => {
                warn!(error = %e, "broadcast poll failed; retaining known broadcast");
            }
        }
    }

    /// One chat cycle: fetch messages after the stored cursor, append them to
    /// the history and publish exactly one [`Event::MessageBatch`] with the
    /// new messages. Empty batches publish nothing; failures leave the cursor
    /// and history untouched.
    pub async fn poll_chat_once(&self) {
        let channel = self.active_chat_channel().await;
        let Some(channel) = channel else {
            debug!("no active broadcast; skipping chat poll");
            return;
        };

        let token = self.page_token.read().await.clone();
        match self
            .source
            .fetch_new_messages(&channel, token.as_deref())
            .await
        {
            Ok(page) => {
                *self.page_token.write().await = page.next_page_token;
                if page.items.is_empty() {
                    return;
                }
                debug!(count = page.items.len(), "new chat messages");
                self.history.write().await.extend(page.items.iter().cloned());
                let event = Event::MessageBatch {
                    messages: page.items,
                    seq: self.next_seq(),
                };
                let _ = self.event_bus.publish(event).await;
            }
            Err(e) => {
                warn!(error = %e, "chat poll failed; cursor and history unchanged");
            }
        }
    }

    /// One subscription cycle: publish one [`Event::SubscriptionChanged`] per
    /// subscription not seen before.
    pub async fn poll_subscriptions_once(&self) {
        match self.source.fetch_subscriptions().await {
            Ok(subscriptions) => {
                for subscription in subscriptions {
                    if !self.seen_subscriptions.insert(subscription.id.clone()) {
                        continue;
                    }
                    info!(subscriber = %subscription.subscriber_name, "new subscription");
                    let event = Event::SubscriptionChanged {
                        subscription,
                        seq: self.next_seq(),
                    };
                    let _ = self.event_bus.publish(event).await;
                }
            }
            Err(e) => {
                warn!(error = %e, "subscription poll failed");
            }
        }
    }

    /// Spawns the three schedules. Each loops on its own interval until the
    /// shutdown signal arrives; missed ticks are skipped rather than queued.
    pub fn start(
        self: &Arc<Self>,
        shutdown: &tokio::sync::broadcast::Sender<()>,
    ) -> Vec<JoinHandle<()>> {
        vec![
            self.spawn_schedule(Schedule::Broadcast, shutdown.subscribe()),
            self.spawn_schedule(Schedule::Chat, shutdown.subscribe()),
            self.spawn_schedule(Schedule::Subscriptions, shutdown.subscribe()),
        ]
    }

    fn spawn_schedule(
        self: &Arc<Self>,
        schedule: Schedule,
        mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let engine = self.clone();
        let interval = match schedule {
            Schedule::Broadcast => engine.config.broadcast_interval,
            Schedule::Chat => engine.config.chat_interval,
            Schedule::Subscriptions => engine.config.subscription_interval,
        };
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!(?schedule, "schedule stopped");
                        break;
                    }
                    _ = ticker.tick() => match schedule {
                        Schedule::Broadcast => engine.poll_broadcast_once().await,
                        Schedule::Chat => engine.poll_chat_once().await,
                        Schedule::Subscriptions => engine.poll_subscriptions_once().await,
                    },
                }
            }
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Schedule {
    Broadcast,
    Chat,
    Subscriptions,
}
