//! # Passive Registry
//!
//! Passives are predicate/handler pairs evaluated against every message,
//! independent of the command prefix. Predicates may not mutate shared state,
//! so they are evaluated concurrently; the matched handlers then run
//! sequentially in registration order.
//!
//! A passive that is done (a one-shot redemption, say) removes itself through
//! [`PassiveControl::remove`]; the registry itself is immutable after the
//! build phase. Any mutable memory a passive needs lives inside the
//! implementing type, private to that instance.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::source::SourceError;
use crate::tokenizer::TokenBin;
use crate::types::ChatMessage;

#[derive(Debug, Error)]
pub enum PassiveError {
    #[error("passive handler failed: {0}")]
    Handler(String),
    #[error("source error: {0}")]
    Source(#[from] SourceError),
}

pub type PassiveResult<T> = Result<T, PassiveError>;

/// Handed to a passive's handler; `remove` deregisters the passive
/// permanently, effective from the next message.
pub struct PassiveControl {
    alive: Arc<AtomicBool>,
}

impl PassiveControl {
    pub fn remove(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

/// A predicate/handler pair run against every incoming message.
///
/// `matches` must be side-effect free apart from the instance's own private
/// memory; handlers go through the wallet/cooldown primitives for anything
/// shared.
#[async_trait]
pub trait Passive: Send + Sync {
    async fn matches(&self, message: &ChatMessage, tokens: &TokenBin) -> bool;
    async fn handle(
        &self,
        message: &ChatMessage,
        tokens: &TokenBin,
        ctl: &PassiveControl,
    ) -> PassiveResult<()>;
}

struct PassiveEntry {
    id: Uuid,
    alive: Arc<AtomicBool>,
    passive: Arc<dyn Passive>,
}

#[derive(Default)]
pub struct PassiveRegistryBuilder {
    passives: Vec<Arc<dyn Passive>>,
}

impl PassiveRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_passive(mut self, passive: Arc<dyn Passive>) -> Self {
        self.passives.push(passive);
        self
    }

    pub fn build(self) -> PassiveRegistry {
        PassiveRegistry {
            entries: self
                .passives
                .into_iter()
                .map(|passive| PassiveEntry {
                    id: Uuid::new_v4(),
                    alive: Arc::new(AtomicBool::new(true)),
                    passive,
                })
                .collect(),
        }
    }
}

pub struct PassiveRegistry {
    entries: Vec<PassiveEntry>,
}

impl PassiveRegistry {
    pub fn builder() -> PassiveRegistryBuilder {
        PassiveRegistryBuilder::new()
    }

    /// Number of passives still alive.
    pub fn size(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.alive.load(Ordering::SeqCst))
            .count()
    }

    /// Evaluates every alive passive against one message: predicates run
    /// concurrently, matched handlers run sequentially in registration order.
    /// Handler errors are logged and isolated.
    pub async fn process(&self, message: &ChatMessage, tokens: &TokenBin) {
        let alive: Vec<&PassiveEntry> = self
            .entries
            .iter()
            .filter(|e| e.alive.load(Ordering::SeqCst))
            .collect();

        let checks = alive.iter().map(|e| e.passive.matches(message, tokens));
        let matched = join_all(checks).await;

        for (entry, matched) in alive.into_iter().zip(matched) {
            if !matched {
                continue;
            }
            debug!(passive = %entry.id, message = %message.id, "passive matched");
            let ctl = PassiveControl {
                alive: entry.alive.clone(),
            };
            if let Err(e) = entry.passive.handle(message, tokens, &ctl).await {
                warn!(passive = %entry.id, error = %e, "passive handler failed");
            }
        }
    }
}
