//! Node collaborators the fallback processor drives

use crate::types::StateRootHash;
use std::sync::Arc;

/// Account state as seen by consensus
pub trait LedgerView: Send + Sync {
    /// Root hash of the committed account state
    fn state_root_hash(&self) -> StateRootHash;

    /// Throw away uncommitted (temp) state and restart from the committed state
    fn reset_working_snapshot(&self);
}

/// Transaction-side leftovers of an abandoned round
pub trait TransactionBookkeeping: Send + Sync {
    fn discard_processed(&self, epoch: u64);
    fn discard_pending(&self);
    fn discard_buffered_microblock_consensus(&self);
}

/// Re-entry into the next round after a fallback
pub trait RoundEntry: Send + Sync {
    fn initiate_pow(&self, epoch: u64);
}

/// Bundle handed to the fallback processor
#[derive(Clone)]
pub struct NodeServices {
    pub ledger: Arc<dyn LedgerView>,
    pub bookkeeping: Arc<dyn TransactionBookkeeping>,
    pub round_entry: Arc<dyn RoundEntry>,
}
