//! Node Configuration

use anyhow::{bail, Context, Result};
use fallback_consensus::{FallbackConfig, NodeMode};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// First port of the simulated DS committee
pub const DS_BASE_PORT: u16 = 4000;
/// First port of shard 0; shards take consecutive blocks of `shard_size` ports
pub const SHARD_BASE_PORT: u16 = 5000;

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Full shard node or lookup node
    pub mode: NodeMode,
    /// Epoch the node is in when the fallback block arrives
    pub epoch: u64,
    /// Number of shards in the directory
    pub shard_count: usize,
    /// Members per shard
    pub shard_size: usize,
    /// Shard that runs fallback consensus
    pub fallback_shard: u32,
    /// Shard members that co-sign the fallback block
    pub signers: usize,
    /// Consensus id of the fallback leader within its shard
    pub leader_index: u32,
    /// Delay before the node reaches WaitingFallbackBlock
    pub state_transition_delay_ms: u64,
    /// Fallback processing parameters
    pub fallback: FallbackConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            mode: NodeMode::Full,
            epoch: 1,
            shard_count: 2,
            shard_size: 10,
            fallback_shard: 0,
            signers: 10,
            leader_index: 0,
            state_transition_delay_ms: 500,
            fallback: FallbackConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {:?}", path))?;
        let config: NodeConfig = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config {:?}", path))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.shard_count == 0 || self.shard_size == 0 {
            bail!("shard_count and shard_size must be non-zero");
        }
        if self.fallback_shard as usize >= self.shard_count {
            bail!(
                "fallback_shard {} out of range for {} shards",
                self.fallback_shard,
                self.shard_count
            );
        }
        if self.signers > self.shard_size {
            bail!(
                "signers ({}) exceeds shard_size ({})",
                self.signers,
                self.shard_size
            );
        }
        if self.leader_index as usize >= self.shard_size {
            bail!(
                "leader_index {} out of range for shard of {}",
                self.leader_index,
                self.shard_size
            );
        }
        if self.shard_size > (SHARD_BASE_PORT - DS_BASE_PORT) as usize {
            bail!(
                "shard_size {} exceeds the {} ports reserved for the DS committee",
                self.shard_size,
                SHARD_BASE_PORT - DS_BASE_PORT
            );
        }
        let shard_ports = self.shard_count.checked_mul(self.shard_size);
        let available = (u16::MAX - SHARD_BASE_PORT) as usize + 1;
        if shard_ports.map_or(true, |ports| ports > available) {
            bail!(
                "{} shards of {} members do not fit in {} ports from {}",
                self.shard_count,
                self.shard_size,
                available,
                SHARD_BASE_PORT
            );
        }
        Ok(())
    }

    /// First port of `shard`. Only meaningful on a validated config.
    pub fn shard_base_port(&self, shard: usize) -> u16 {
        SHARD_BASE_PORT + (shard * self.shard_size) as u16
    }
}
