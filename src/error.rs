//! Crate-level error type aggregating the per-module errors.

use thiserror::Error;

use crate::cache::CacheError;
use crate::command::CommandError;
use crate::config::ConfigError;
use crate::event::EventError;
use crate::passive::PassiveError;
use crate::source::SourceError;
use crate::storage::StorageError;
use crate::wallet::WalletError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("event error: {0}")]
    Event(#[from] EventError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("command error: {0}")]
    Command(#[from] CommandError),

    #[error("passive error: {0}")]
    Passive(#[from] PassiveError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;
