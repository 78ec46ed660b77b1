//! # livebot
//!
//! An event-driven runtime core for a live-chat bot. A polling engine watches
//! a remote chat source for the active broadcast, new chat messages and new
//! subscriptions, and turns what it finds into typed events on an
//! [`event::EventBus`]. The runtime routes every message through a
//! [`command::CommandRegistry`] (prefix-triggered handlers with costs,
//! cooldowns and payouts) and a [`passive::PassiveRegistry`]
//! (predicate-matched handlers), both backed by a persistent
//! [`wallet::WalletLedger`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use livebot::command::{Command, CommandRegistry, Payout};
//! use livebot::config::BotConfig;
//! use livebot::passive::PassiveRegistry;
//! use livebot::runtime::BotRuntime;
//! use livebot::storage::FileStorage;
//!
//! # async fn run(source: Arc<dyn livebot::source::ChatSource>) -> livebot::InternalResult<()> {
//! let commands = CommandRegistry::builder().with_command(Command::new(
//!     "tip",
//!     &["t"],
//!     0,
//!     Duration::from_secs(5),
//!     Arc::new(|_msg, tokens, _ctx| {
//!         Box::pin(async move {
//!             let target = tokens.args.first().cloned().unwrap_or_default();
//!             Ok(Some(Payout { user_ids: vec![target], amount: 10 }))
//!         })
//!     }),
//! ));
//!
//! let runtime = BotRuntime::new(
//!     BotConfig::default(),
//!     source,
//!     Arc::new(FileStorage::new("./data")),
//!     commands,
//!     PassiveRegistry::builder(),
//! )
//! .await?;
//!
//! runtime.start().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod command;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod event;
pub mod passive;
pub mod polling;
pub mod runtime;
pub mod source;
pub mod storage;
pub mod tokenizer;
pub mod types;
pub mod wallet;

pub use error::{Error, InternalResult};
pub use event::{Event, EventBus, EventKind};
pub use runtime::BotRuntime;
pub use types::{Broadcast, ChatMessage, MessagePage, Subscription};
