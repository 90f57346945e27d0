//! Per-account nonce bookkeeping.
//!
//! Submissions of one account are serialized through its [`NonceSlot`]: the slot is held
//! from signing until the node accepts (or refuses) the extrinsic, so nonces are handed
//! out strictly in submission order. Different accounts never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use log::info;
use polymesh_core::AccountKey;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Hands out nonces per signing account.
#[derive(Clone, Debug, Default)]
pub struct NonceSequencer {
    accounts: Arc<Mutex<HashMap<AccountKey, Arc<Mutex<Option<u64>>>>>>,
}

impl NonceSequencer {
    /// A sequencer with no known account.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other submission of `account` is in flight and reserves its nonce.
    pub async fn acquire(&self, account: AccountKey) -> NonceSlot {
        let slot = {
            let mut accounts = self.accounts.lock().await;
            Arc::clone(accounts.entry(account).or_default())
        };
        NonceSlot {
            account,
            guard: slot.lock_owned().await,
        }
    }
}

/// Exclusive access to the next nonce of one account.
///
/// Dropping the slot without [`NonceSlot::commit`] leaves the nonce unused.
#[derive(Debug)]
pub struct NonceSlot {
    account: AccountKey,
    guard: OwnedMutexGuard<Option<u64>>,
}

impl NonceSlot {
    /// The nonce to sign with, unless it must first be read from the chain.
    pub fn nonce(&self) -> Option<u64> {
        *self.guard
    }

    /// Replaces the nonce with the one read from the chain.
    pub fn reset(&mut self, nonce: u64) {
        if *self.guard != Some(nonce) {
            info!("🔄 Refreshed nonce of {}: {}", self.account, nonce);
        }
        *self.guard = Some(nonce);
    }

    /// Forgets the nonce so the next submission reads it from the chain again.
    pub fn invalidate(&mut self) {
        *self.guard = None;
    }

    /// Marks the current nonce as used by an accepted submission and releases the slot.
    pub fn commit(mut self) {
        *self.guard = self.guard.map(|nonce| nonce + 1);
    }
}
