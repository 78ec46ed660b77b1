//! # Bot Runtime
//!
//! Top-level assembly: validates the configuration, opens the wallet ledger,
//! builds the registries and wires the polling engine to the event bus. The
//! runtime registers one internal `MessageBatch` listener that routes every
//! message through the command dispatcher and then the passive dispatcher,
//! in fetch order.
//!
//! `start` spawns the polling schedules; `shutdown` signals them and waits
//! for every task to drain.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::command::{CommandRegistry, CommandRegistryBuilder};
use crate::config::BotConfig;
use crate::cooldown::CooldownTracker;
use crate::error::InternalResult;
use crate::event::{Event, EventBus, EventKind, ListenerFn};
use crate::passive::{PassiveRegistry, PassiveRegistryBuilder};
use crate::polling::PollingEngine;
use crate::source::ChatSource;
use crate::storage::KeyValueStorage;
use crate::tokenizer::tokenize;
use crate::types::{Broadcast, ChatMessage};
use crate::wallet::WalletLedger;

pub struct BotRuntime {
    config: BotConfig,
    event_bus: Arc<EventBus>,
    polling: Arc<PollingEngine>,
    commands: Arc<CommandRegistry>,
    passives: Arc<PassiveRegistry>,
    wallets: Arc<WalletLedger>,
    cooldowns: Arc<CooldownTracker>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BotRuntime {
    /// Assembles a runtime from its parts.
    ///
    /// The configuration is validated here; an invalid configuration or an
    /// unreadable ledger document fails construction, nothing is spawned.
    pub async fn new(
        config: BotConfig,
        source: Arc<dyn ChatSource>,
        storage: Arc<dyn KeyValueStorage>,
        commands: CommandRegistryBuilder,
        passives: PassiveRegistryBuilder,
    ) -> InternalResult<Self> {
        config.validate()?;

        let wallets = Arc::new(
            WalletLedger::load(
                storage,
                &config.wallet_storage_key,
                config.starting_balance,
            )
            .await?,
        );
        let cooldowns = Arc::new(CooldownTracker::new());
        let commands = Arc::new(commands.build(
            wallets.clone(),
            cooldowns.clone(),
            source.clone(),
        )?);
        let passives = Arc::new(passives.build());

        let event_bus = Arc::new(EventBus::new());
        let polling = Arc::new(PollingEngine::new(
            source,
            event_bus.clone(),
            config.polling.clone(),
        ));

        Self::register_message_listener(
            &event_bus,
            commands.clone(),
            passives.clone(),
            polling.clone(),
            config.command_prefix.clone(),
        );

        info!(
            commands = commands.len(),
            passives = passives.size(),
            "runtime assembled"
        );

        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            config,
            event_bus,
            polling,
            commands,
            passives,
            wallets,
            cooldowns,
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        })
    }

    /// The internal listener that turns a message batch into command and
    /// passive runs. Messages are processed strictly in fetch order; for each
    /// message the command path completes before the passive path starts.
    fn register_message_listener(
        event_bus: &EventBus,
        commands: Arc<CommandRegistry>,
        passives: Arc<PassiveRegistry>,
        polling: Arc<PollingEngine>,
        prefix: String,
    ) {
        let listener: ListenerFn = Arc::new(move |event, _handle| {
            let commands = commands.clone();
            let passives = passives.clone();
            let polling = polling.clone();
            let prefix = prefix.clone();
            Box::pin(async move {
                let Event::MessageBatch { messages, .. } = event else {
                    return Ok(());
                };
                let reply_channel = polling.active_chat_channel().await;
                for message in &messages {
                    let tokens = tokenize(&message.text, &prefix);
                    commands
                        .dispatch(message, &tokens, reply_channel.as_deref())
                        .await;
                    passives.process(message, &tokens).await;
                }
                Ok(())
            })
        });
        event_bus.listen(EventKind::MessageBatch, listener);
    }

    /// Spawns the polling schedules. Idempotent in effect only if `shutdown`
    /// was called in between; calling `start` twice otherwise doubles the
    /// schedules.
    pub async fn start(&self) {
        info!("runtime starting");
        let spawned = self.polling.start(&self.shutdown_tx);
        self.handles.lock().await.extend(spawned);
    }

    /// Signals every spawned task to stop and waits for all of them.
    pub async fn shutdown(&self) {
        debug!("runtime shutting down");
        let _ = self.shutdown_tx.send(());
        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        info!("runtime stopped");
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    pub fn polling(&self) -> Arc<PollingEngine> {
        self.polling.clone()
    }

    pub fn commands(&self) -> Arc<CommandRegistry> {
        self.commands.clone()
    }

    pub fn passives(&self) -> Arc<PassiveRegistry> {
        self.passives.clone()
    }

    pub fn wallets(&self) -> Arc<WalletLedger> {
        self.wallets.clone()
    }

    pub fn cooldowns(&self) -> Arc<CooldownTracker> {
        self.cooldowns.clone()
    }

    pub async fn active_broadcast(&self) -> Option<Broadcast> {
        self.polling.active_broadcast().await
    }

    pub async fn chat_history(&self) -> Vec<ChatMessage> {
        self.polling.chat_history().await
    }
}
