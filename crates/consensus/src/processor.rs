//! Fallback block processing
//!
//! Validates an inbound fallback block end to end, reconstitutes the DS
//! committee around the elected leader, cleans up the abandoned round and
//! arms the next fallback timeout.

use crate::committee::CommitteeStore;
use crate::crypto::{BlsMultiSig, MultiSig};
use crate::error::{ErrorKind, FallbackError};
use crate::message::decode_fallback_block;
use crate::services::NodeServices;
use crate::shard::ShardDirectory;
use crate::state::{FallbackSignal, NodeState};
use crate::timer::{FallbackTimeout, FallbackTimer};
use crate::types::{
    FallbackBlock, FallbackConfig, FallbackStats, Member, NetworkAddress, NodeMode, ProtocolState,
};
use crate::verifier::CoSignatureVerifier;
use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;

/// Result of an applied fallback block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackOutcome {
    pub epoch: u64,
    pub shard_id: u32,
    pub leader: Member,
    pub committee_size: usize,
}

/// Handles fallback blocks for this node
pub struct FallbackProcessor {
    config: FallbackConfig,
    node_state: Arc<NodeState>,
    committee: CommitteeStore,
    shards: ShardDirectory,
    verifier: CoSignatureVerifier,
    services: NodeServices,
    signal: Arc<FallbackSignal>,
    timer: FallbackTimer,
    /// Epoch and leader of the last commit; also serializes commits
    last_commit: Mutex<Option<(u64, Member)>>,
    stats: RwLock<FallbackStats>,
}

impl FallbackProcessor {
    /// Process a fallback block message. `true` only if the DS committee
    /// was reconstituted.
    pub fn handle(&self, message: &[u8], offset: usize, from: &NetworkAddress) -> bool {
        match self.process(message, offset, from) {
            Ok(outcome) => {
                tracing::debug!(
                    "Fallback block from {} applied: leader {}, {} committee members",
                    from,
                    outcome.leader,
                    outcome.committee_size
                );
                true
            }
            Err(e) => {
                let epoch = self.node_state.current_epoch();
                match e.kind() {
                    ErrorKind::Structural => tracing::error!(
                        "[epoch {}] Fallback block from {} rejected: {}",
                        epoch,
                        from,
                        e
                    ),
                    ErrorKind::TransientState => tracing::info!(
                        "[epoch {}] Fallback block from {} dropped: {}",
                        epoch,
                        from,
                        e
                    ),
                    _ => tracing::warn!(
                        "[epoch {}] Fallback block from {} rejected: {}",
                        epoch,
                        from,
                        e
                    ),
                }
                self.stats.write().rejected += 1;
                false
            }
        }
    }

    /// Like [`handle`](Self::handle) but reports why a block was rejected
    pub fn process(
        &self,
        message: &[u8],
        offset: usize,
        _from: &NetworkAddress,
    ) -> Result<FallbackOutcome, FallbackError> {
        self.wait_until_ready()?;

        let block = decode_fallback_block(message, offset)?;
        let epoch = self.node_state.current_epoch();
        let (members, leader) = self.validate(&block, epoch)?;

        self.verifier.check_against(&block, &members)?;

        self.commit(epoch, &members, &leader)?;
        self.signal.notify();

        self.cleanup(epoch);

        let shard_id = block.header.shard_id;
        tracing::info!(
            "[epoch {}] DS committee successfully fell back to shard {} with leader {}",
            epoch,
            shard_id,
            leader
        );

        self.timer.schedule();

        let committee_size = self.committee.len();
        {
            let mut stats = self.stats.write();
            stats.accepted += 1;
            stats.last_committed_epoch = Some(epoch);
        }

        Ok(FallbackOutcome {
            epoch,
            shard_id,
            leader,
            committee_size,
        })
    }

    /// Rebuild the DS committee from `shard_id` around `leader`.
    /// `false` if the shard is unknown.
    pub fn update_ds_committee(&self, shard_id: u32, leader: &Member) -> bool {
        let rebuilt = self
            .shards
            .with_shard(shard_id, |members| self.committee.reconstitute(members, leader));
        if rebuilt.is_none() {
            tracing::warn!("Cannot update DS committee: shard {} does not exist", shard_id);
        }
        rebuilt.is_some()
    }

    fn wait_until_ready(&self) -> Result<(), FallbackError> {
        if self.node_state.protocol_state() == ProtocolState::WaitingFallbackBlock {
            return Ok(());
        }

        let grace = self.config.grace_period();
        tracing::info!(
            "Not in state for processing fallback block, waiting up to {:?} for state change",
            grace
        );

        let started = Instant::now();
        if self
            .node_state
            .wait_for_state(ProtocolState::WaitingFallbackBlock, grace)
        {
            tracing::info!(
                "[epoch {}] Transitioned to WaitingFallbackBlock",
                self.node_state.current_epoch()
            );
            Ok(())
        } else {
            Err(FallbackError::NotReady {
                state: self.node_state.protocol_state(),
                waited_ms: started.elapsed().as_millis() as u64,
            })
        }
    }

    /// Contextual checks; returns the shard snapshot used for the rest of
    /// processing and the claimed leader.
    fn validate(
        &self,
        block: &FallbackBlock,
        epoch: u64,
    ) -> Result<(Vec<Member>, Member), FallbackError> {
        let header = &block.header;

        if header.fallback_epoch_no != epoch {
            return Err(FallbackError::EpochMismatch {
                current: epoch,
                received: header.fallback_epoch_no,
            });
        }

        let members =
            self.shards
                .shard_members(header.shard_id)
                .ok_or_else(|| FallbackError::UnknownShard {
                    shard_id: header.shard_id,
                    shard_count: self.shards.shard_count(),
                })?;

        if header.leader_consensus_id as usize >= members.len() {
            return Err(FallbackError::LeaderIndexOutOfRange {
                leader_consensus_id: header.leader_consensus_id,
                shard_size: members.len(),
            });
        }

        let leader = header.leader();
        let position = members.iter().position(|m| *m == leader).ok_or(
            FallbackError::LeaderNotInShard {
                pub_key: header.leader_pub_key,
                address: header.leader_network_info,
            },
        )?;

        if self.config.strict_leader_index && position != header.leader_consensus_id as usize {
            return Err(FallbackError::LeaderIndexMismatch {
                leader_consensus_id: header.leader_consensus_id,
                position,
            });
        }

        let expected = self.services.ledger.state_root_hash();
        if expected != header.state_root_hash {
            return Err(FallbackError::StateRootMismatch {
                expected,
                received: header.state_root_hash,
            });
        }

        Ok((members, leader))
    }

    fn commit(&self, epoch: u64, members: &[Member], leader: &Member) -> Result<(), FallbackError> {
        let mut last_commit = self.last_commit.lock();

        if self.config.reject_equivocation {
            if let Some((committed_epoch, committed_leader)) = last_commit.as_ref() {
                if *committed_epoch == epoch && committed_leader != leader {
                    return Err(FallbackError::Equivocation {
                        epoch,
                        committed: committed_leader.public_key,
                        received: leader.public_key,
                    });
                }
            }
        }

        self.committee.reconstitute(members, leader);
        *last_commit = Some((epoch, leader.clone()));
        Ok(())
    }

    fn cleanup(&self, epoch: u64) {
        match self.node_state.mode() {
            NodeMode::Full => {
                let bookkeeping = &self.services.bookkeeping;
                bookkeeping.discard_processed(epoch);
                bookkeeping.discard_pending();
                bookkeeping.discard_buffered_microblock_consensus();
                self.services.ledger.reset_working_snapshot();
                self.services.round_entry.initiate_pow(epoch);
            }
            NodeMode::Lookup => self.node_state.reset_consensus_counters(),
        }
    }

    pub fn committee(&self) -> &CommitteeStore {
        &self.committee
    }

    pub fn verifier(&self) -> &CoSignatureVerifier {
        &self.verifier
    }

    pub fn signal(&self) -> Arc<FallbackSignal> {
        self.signal.clone()
    }

    pub fn timer(&self) -> &FallbackTimer {
        &self.timer
    }

    pub fn stats(&self) -> FallbackStats {
        self.stats.read().clone()
    }
}

/// Builder for FallbackProcessor
pub struct FallbackProcessorBuilder {
    node_state: Arc<NodeState>,
    committee: CommitteeStore,
    shards: ShardDirectory,
    services: NodeServices,
    config: FallbackConfig,
    multisig: Arc<dyn MultiSig>,
    signal: Arc<FallbackSignal>,
}

impl FallbackProcessorBuilder {
    pub fn new(
        node_state: Arc<NodeState>,
        committee: CommitteeStore,
        shards: ShardDirectory,
        services: NodeServices,
    ) -> Self {
        Self {
            node_state,
            committee,
            shards,
            services,
            config: FallbackConfig::default(),
            multisig: Arc::new(BlsMultiSig),
            signal: Arc::new(FallbackSignal::new()),
        }
    }

    pub fn config(mut self, config: FallbackConfig) -> Self {
        self.config = config;
        self
    }

    pub fn multisig(mut self, multisig: Arc<dyn MultiSig>) -> Self {
        self.multisig = multisig;
        self
    }

    pub fn signal(mut self, signal: Arc<FallbackSignal>) -> Self {
        self.signal = signal;
        self
    }

    /// Build the processor and the receiver of its fallback timeouts
    pub fn build(self) -> (FallbackProcessor, Receiver<FallbackTimeout>) {
        let (timer, timeouts) =
            FallbackTimer::new(self.config.fallback_interval(), self.node_state.clone());

        let processor = FallbackProcessor {
            verifier: CoSignatureVerifier::new(self.shards.clone(), self.multisig),
            config: self.config,
            node_state: self.node_state,
            committee: self.committee,
            shards: self.shards,
            services: self.services,
            signal: self.signal,
            timer,
            last_commit: Mutex::new(None),
            stats: RwLock::new(FallbackStats::default()),
        };

        (processor, timeouts)
    }
}
