//! Transaction bookkeeping for the current round

use crate::account_store::Address;
use dashmap::DashMap;
use fallback_consensus::TransactionBookkeeping;
use parking_lot::Mutex;

/// A value transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub from: Address,
    pub to: Address,
    pub amount: u128,
    pub nonce: u64,
}

impl Transaction {
    /// Compute the transaction hash
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.from);
        hasher.update(&self.to);
        hasher.update(&self.amount.to_le_bytes());
        hasher.update(&self.nonce.to_le_bytes());
        *hasher.finalize().as_bytes()
    }
}

/// Transactions and consensus messages tied to the in-flight round
#[derive(Default)]
pub struct TransactionPool {
    /// Transactions processed during microblock consensus, by epoch
    processed: DashMap<u64, Vec<Transaction>>,
    /// Transactions this node created but that are not confirmed yet
    created: Mutex<Vec<Transaction>>,
    /// Microblock consensus messages received ahead of their round, by consensus id
    microblock_buffer: DashMap<u32, Vec<Vec<u8>>>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&self, epoch: u64, tx: Transaction) {
        self.processed.entry(epoch).or_default().push(tx);
    }

    pub fn processed_count(&self, epoch: u64) -> usize {
        self.processed.get(&epoch).map(|txs| txs.len()).unwrap_or(0)
    }

    pub fn add_created(&self, tx: Transaction) {
        self.created.lock().push(tx);
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }

    pub fn buffer_microblock_message(&self, consensus_id: u32, message: Vec<u8>) {
        self.microblock_buffer
            .entry(consensus_id)
            .or_default()
            .push(message);
    }

    /// Number of buffered microblock consensus messages across all rounds
    pub fn buffered_count(&self) -> usize {
        self.microblock_buffer.iter().map(|r| r.value().len()).sum()
    }
}

impl TransactionBookkeeping for TransactionPool {
    fn discard_processed(&self, epoch: u64) {
        if let Some((_, txs)) = self.processed.remove(&epoch) {
            tracing::debug!("Discarded {} processed transactions of epoch {}", txs.len(), epoch);
        }
    }

    fn discard_pending(&self) {
        let dropped = std::mem::take(&mut *self.created.lock());
        if !dropped.is_empty() {
            tracing::debug!("Discarded {} created transactions", dropped.len());
        }
    }

    fn discard_buffered_microblock_consensus(&self) {
        let buffered = self.buffered_count();
        self.microblock_buffer.clear();
        if buffered > 0 {
            tracing::debug!("Discarded {} buffered microblock consensus messages", buffered);
        }
    }
}
