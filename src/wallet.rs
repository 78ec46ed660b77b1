//! # Wallet Ledger
//!
//! Per-user integer balances backing the chat economy. Balances change only
//! through [`WalletLedger::transact`], which applies a batch of deltas and
//! persists the full ledger document atomically with respect to the storage
//! write: either every delta is applied and the new document is on disk, or
//! the in-memory state is left untouched.
//!
//! Unseen users are seeded with the configured starting balance on first
//! sight. Seeding checks entry presence, not the balance value, so a user who
//! has legitimately spent down to zero is never re-seeded.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error};

use crate::storage::{KeyValueStorage, StorageError};

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("ledger persistence failed: {0}")]
    Persistence(#[from] StorageError),
    #[error("ledger document malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type WalletResult<T> = Result<T, WalletError>;

/// One wallet credit or debit request: `(user_id, delta)`.
pub type WalletDelta = (String, i64);

pub struct WalletLedger {
    storage: Arc<dyn KeyValueStorage>,
    storage_key: String,
    starting_balance: i64,
    balances: RwLock<HashMap<String, i64>>,
    /// Serializes the read-modify-persist sequence of `transact` so two
    /// transactions never interleave around the persistence await.
    transact_lock: Mutex<()>,
}

impl WalletLedger {
    /// Opens the ledger, reading the persisted document if one exists.
    pub async fn load(
        storage: Arc<dyn KeyValueStorage>,
        storage_key: &str,
        starting_balance: i64,
    ) -> WalletResult<Self> {
        let balances = if storage.exists(storage_key).await? {
            let blob = storage.read(storage_key).await?;
            serde_json::from_slice(&blob)?
        } else {
            HashMap::new()
        };
        debug!(wallets = balances.len(), "wallet ledger loaded");
        Ok(Self {
            storage,
            storage_key: storage_key.to_string(),
            starting_balance,
            balances: RwLock::new(balances),
            transact_lock: Mutex::new(()),
        })
    }

    /// Current balance for `user_id`, seeding an unseen user with the
    /// starting balance. The seed becomes durable with the next transaction.
    pub async fn balance(&self, user_id: &str) -> i64 {
        if let Some(balance) = self.balances.read().await.get(user_id) {
            return *balance;
        }
        *self
            .balances
            .write()
            .await
            .entry(user_id.to_string())
            .or_insert(self.starting_balance)
    }

    /// Applies every `(user, delta)` pair and persists the full ledger, or
    /// does nothing at all.
    ///
    /// Unseen users are seeded before their delta is applied. The in-memory
    /// map commits only after the storage write succeeds, so a persistence
    /// failure leaves memory and disk consistent with each other.
    pub async fn transact(&self, deltas: &[WalletDelta]) -> WalletResult<()> {
        let _guard = self.transact_lock.lock().await;

        let mut next = self.balances.read().await.clone();
        for (user_id, delta) in deltas {
            let balance = next
                .entry(user_id.clone())
                .or_insert(self.starting_balance);
            *balance += delta;
        }

        let blob = serde_json::to_vec(&next)?;
        if let Err(e) = self.storage.write(&self.storage_key, &blob).await {
            error!(error = %e, "ledger write failed; transaction rolled back");
            return Err(WalletError::Persistence(e));
        }

        *self.balances.write().await = next;
        Ok(())
    }
}
