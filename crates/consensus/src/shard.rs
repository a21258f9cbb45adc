//! Shard directory: shard id to ordered member list

use crate::types::Member;
use parking_lot::RwLock;
use std::sync::Arc;

/// Read-mostly view of the current sharding structure
#[derive(Clone, Default)]
pub struct ShardDirectory {
    shards: Arc<RwLock<Vec<Vec<Member>>>>,
}

impl ShardDirectory {
    pub fn new(shards: Vec<Vec<Member>>) -> Self {
        Self {
            shards: Arc::new(RwLock::new(shards)),
        }
    }

    /// Install a new sharding structure (DS block processing)
    pub fn set_shards(&self, shards: Vec<Vec<Member>>) {
        *self.shards.write() = shards;
    }

    pub fn shard_count(&self) -> usize {
        self.shards.read().len()
    }

    /// Copy of a shard's members
    pub fn shard_members(&self, shard_id: u32) -> Option<Vec<Member>> {
        self.shards.read().get(shard_id as usize).cloned()
    }

    pub fn shard_size(&self, shard_id: u32) -> Option<usize> {
        self.shards.read().get(shard_id as usize).map(Vec::len)
    }

    /// Run `f` against a shard without copying it
    pub fn with_shard<R>(&self, shard_id: u32, f: impl FnOnce(&[Member]) -> R) -> Option<R> {
        self.shards.read().get(shard_id as usize).map(|m| f(m))
    }
}
