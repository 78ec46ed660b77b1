//! # Single-Flight Async Cache
//!
//! A generic keyed cache with a pluggable loader. The single-flight guarantee
//! is the point of this module: for any number of concurrent `get` calls on a
//! key with no populated entry, the loader runs exactly once and every caller
//! observes the identical outcome.
//!
//! ## Entry Lifecycle
//!
//! ```text
//! Empty ──get──▶ Loading ──ok──▶ Populated
//!                   │
//!                   └──err──▶ Failed ──get──▶ Loading (retry)
//! ```
//!
//! A `Failed` entry does not poison the key: the next `get` retries the
//! loader. Entries live for the process lifetime; there is no eviction.

use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CacheError {
    #[error("cache load failed: {0}")]
    Load(String),
    #[error("in-flight load was dropped before completing")]
    LoadInterrupted,
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Loader invoked on a cache miss. Implementations typically wrap a
/// [`ChatSource`](crate::source::ChatSource) call such as a user profile fetch.
#[async_trait]
pub trait CacheLoader<K, V>: Send + Sync {
    async fn load(&self, key: &K) -> CacheResult<V>;
}

enum EntryState<V> {
    /// A load is in flight; waiters subscribe to the channel for its outcome.
    Loading(broadcast::Sender<CacheResult<V>>),
    Populated(V),
    Failed,
}

/// # AsyncCache
///
/// Keyed cache with single-flight loads. `V` must be `Clone` because every
/// waiter on a load receives its own copy of the outcome.
pub struct AsyncCache<K, V> {
    entries: DashMap<K, EntryState<V>>,
    loader: Arc<dyn CacheLoader<K, V>>,
}

impl<K, V> AsyncCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(loader: Arc<dyn CacheLoader<K, V>>) -> Self {
        Self {
            entries: DashMap::new(),
            loader,
        }
    }

    /// Returns the cached value for `key`, loading it if necessary.
    ///
    /// - `Populated` entries return immediately.
    /// - `Loading` entries await the in-flight load rather than starting
    ///   a second one.
    /// - `Empty` and `Failed` entries transition to `Loading` and this call
    ///   becomes the load leader.
    pub async fn get(&self, key: &K) -> CacheResult<V> {
        // Claim leadership or subscribe, under the entry guard so a leader
        // cannot complete between our check and our subscription.
        let waiter = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => match occupied.get() {
                EntryState::Populated(value) => return Ok(value.clone()),
                EntryState::Loading(tx) => Some(tx.subscribe()),
                EntryState::Failed => {
                    let (tx, _) = broadcast::channel(1);
                    occupied.insert(EntryState::Loading(tx));
                    None
                }
            },
            Entry::Vacant(vacant) => {
                let (tx, _) = broadcast::channel(1);
                vacant.insert(EntryState::Loading(tx));
                None
            }
        };

        if let Some(mut rx) = waiter {
            debug!(?key, "awaiting in-flight load");
            return match rx.recv().await {
                Ok(outcome) => outcome,
                // Leader dropped without resolving (task aborted mid-load).
                Err(_) => Err(CacheError::LoadInterrupted),
            };
        }

        debug!(?key, "loading");
        let mut guard = LoadGuard {
            entries: &self.entries,
            key,
            armed: true,
        };
        let outcome = self.loader.load(key).await;
        guard.armed = false;
        let tx = {
            let previous = match &outcome {
                Ok(value) => self
                    .entries
                    .insert(key.clone(), EntryState::Populated(value.clone())),
                Err(e) => {
                    warn!(?key, error = %e, "load failed; entry marked Failed");
                    self.entries.insert(key.clone(), EntryState::Failed)
                }
            };
            match previous {
                Some(EntryState::Loading(tx)) => Some(tx),
                _ => None,
            }
        };
        // Resolve every waiter with the same outcome. A send error only means
        // nobody was waiting.
        if let Some(tx) = tx {
            let _ = tx.send(outcome.clone());
        }
        outcome
    }

    /// Number of populated entries (loading and failed entries excluded).
    pub fn populated(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.value(), EntryState::Populated(_)))
            .count()
    }
}

/// Held by the load leader across the loader await. If the leader future is
/// dropped mid-load (its task aborted), the `Loading` entry is removed, which
/// drops the waiter channel's sender: waiters observe `LoadInterrupted`
/// instead of hanging, and the next `get` on the key starts a fresh load.
struct LoadGuard<'a, K: Eq + Hash, V> {
    entries: &'a DashMap<K, EntryState<V>>,
    key: &'a K,
    armed: bool,
}

impl<K: Eq + Hash, V> Drop for LoadGuard<'_, K, V> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.entries
            .remove_if(self.key, |_, state| matches!(state, EntryState::Loading(_)));
    }
}
