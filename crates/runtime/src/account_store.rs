//! In-memory account storage using DashMap for concurrent access
//!
//! Two views are kept: the committed state (what the state root is computed
//! over) and a working snapshot that round processing mutates. A fallback
//! throws the working snapshot away.

use dashmap::DashMap;
use fallback_consensus::{LedgerView, StateRootHash};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

/// 20-byte account address
pub type Address = [u8; 20];

/// Account balance and nonce
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Account {
    pub balance: u128,
    pub nonce: u64,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: u128, required: u128 },

    #[error("balance overflow")]
    Overflow,
}

/// Thread-safe account storage with a committed state and a working snapshot
#[derive(Clone, Default)]
pub struct AccountStore {
    committed: Arc<DashMap<Address, Account>>,
    working: Arc<DashMap<Address, Account>>,
    /// Serializes multi-account updates against commit/reset
    write_lock: Arc<Mutex<()>>,
}

impl AccountStore {
    /// Create a new empty account store
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed account state
    pub fn get_account(&self, address: &Address) -> Option<Account> {
        self.committed.get(address).map(|r| *r.value())
    }

    /// Account state including uncommitted changes
    pub fn get_working(&self, address: &Address) -> Option<Account> {
        self.working.get(address).map(|r| *r.value())
    }

    /// Store an account directly in committed and working state (genesis, sync)
    pub fn store_account(&self, address: Address, account: Account) {
        let _guard = self.write_lock.lock();
        self.committed.insert(address, account);
        self.working.insert(address, account);
    }

    /// Apply a transfer to the working snapshot
    pub fn apply_transfer(
        &self,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), LedgerError> {
        let _guard = self.write_lock.lock();

        let mut sender = self.get_working(from).unwrap_or_default();
        if sender.balance < amount {
            return Err(LedgerError::InsufficientBalance {
                available: sender.balance,
                required: amount,
            });
        }
        sender.balance -= amount;
        sender.nonce += 1;
        self.working.insert(*from, sender);

        let mut receiver = self.get_working(to).unwrap_or_default();
        receiver.balance = receiver.balance.checked_add(amount).ok_or(LedgerError::Overflow)?;
        self.working.insert(*to, receiver);

        Ok(())
    }

    /// Make the working snapshot the committed state
    pub fn commit_working(&self) {
        let _guard = self.write_lock.lock();
        self.committed.clear();
        for entry in self.working.iter() {
            self.committed.insert(*entry.key(), *entry.value());
        }
    }

    /// Reset the working snapshot to the committed state
    pub fn init_temp(&self) {
        let _guard = self.write_lock.lock();
        self.working.clear();
        for entry in self.committed.iter() {
            self.working.insert(*entry.key(), *entry.value());
        }
    }

    /// Root hash over committed accounts in address order
    pub fn state_root_hash(&self) -> StateRootHash {
        let mut accounts: Vec<(Address, Account)> = self
            .committed
            .iter()
            .map(|r| (*r.key(), *r.value()))
            .collect();
        accounts.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let mut hasher = blake3::Hasher::new();
        for (address, account) in &accounts {
            hasher.update(address);
            hasher.update(&account.balance.to_le_bytes());
            hasher.update(&account.nonce.to_le_bytes());
        }

        StateRootHash(*hasher.finalize().as_bytes())
    }

    /// Get committed account count
    pub fn len(&self) -> usize {
        self.committed.len()
    }

    /// Check if store is empty
    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }
}

impl LedgerView for AccountStore {
    fn state_root_hash(&self) -> StateRootHash {
        AccountStore::state_root_hash(self)
    }

    fn reset_working_snapshot(&self) {
        self.init_temp();
        tracing::debug!("Working account snapshot reset to committed state");
    }
}
