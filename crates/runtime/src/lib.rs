//! Node Runtime - in-memory collaborators of the fallback processor
//!
//! This crate provides the pieces of a shard node that fallback processing
//! reads and resets:
//! - Account storage with committed state and a working snapshot
//! - Transaction bookkeeping for the in-flight round
//! - PoW re-entry after a fallback

pub mod account_store;
pub mod pow;
pub mod tx_pool;

pub use account_store::{Account, AccountStore, Address, LedgerError};
pub use pow::{PowLauncher, RoundEvent};
pub use tx_pool::{Transaction, TransactionPool};

use fallback_consensus::{NodeServices, NodeState};
use std::sync::Arc;

/// Runtime collaborators wired for one node
pub struct NodeRuntime {
    pub accounts: Arc<AccountStore>,
    pub tx_pool: Arc<TransactionPool>,
    pub pow: Arc<PowLauncher>,
}

impl NodeRuntime {
    /// Create the runtime and the receiver of its round events
    pub fn new(node_state: Arc<NodeState>) -> (Self, crossbeam_channel::Receiver<RoundEvent>) {
        let (pow, events) = PowLauncher::new(node_state);
        let runtime = Self {
            accounts: Arc::new(AccountStore::new()),
            tx_pool: Arc::new(TransactionPool::new()),
            pow: Arc::new(pow),
        };
        (runtime, events)
    }

    /// Services bundle for the fallback processor
    pub fn services(&self) -> NodeServices {
        NodeServices {
            ledger: self.accounts.clone(),
            bookkeeping: self.tx_pool.clone(),
            round_entry: self.pow.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fallback_consensus::{
        cosign_fallback_block, encode_fallback_message, BlsKeypair, CommitteeStore,
        FallbackBlockHeader, FallbackProcessorBuilder, Member, NetworkAddress, NodeMode,
        ProtocolState, ShardDirectory, MESSAGE_BODY_OFFSET,
    };
    use std::net::SocketAddr;

    #[test]
    fn test_fallback_resets_runtime_and_starts_pow() {
        let state = Arc::new(NodeState::new(
            NodeMode::Full,
            30,
            ProtocolState::WaitingFallbackBlock,
        ));
        let (runtime, events) = NodeRuntime::new(state.clone());

        let alice = [1u8; 20];
        let bob = [2u8; 20];
        runtime.accounts.store_account(alice, Account { balance: 50, nonce: 0 });
        runtime.accounts.apply_transfer(&alice, &bob, 20).unwrap();
        let tx = Transaction { from: alice, to: bob, amount: 20, nonce: 0 };
        runtime.tx_pool.record_processed(30, tx.clone());
        runtime.tx_pool.add_created(tx);
        runtime.tx_pool.buffer_microblock_message(1, vec![0xAA]);

        let keys: Vec<BlsKeypair> = (1..=3u8)
            .map(|i| BlsKeypair::from_ikm(&[i; 32]).unwrap())
            .collect();
        let members: Vec<Member> = keys
            .iter()
            .enumerate()
            .map(|(i, kp)| {
                let addr: SocketAddr = format!("127.0.0.1:{}", 7100 + i).parse().unwrap();
                Member::new(kp.public_key(), NetworkAddress::from(addr))
            })
            .collect();

        let (processor, _timeouts) = FallbackProcessorBuilder::new(
            state.clone(),
            CommitteeStore::new(),
            ShardDirectory::new(vec![members.clone()]),
            runtime.services(),
        )
        .build();

        let header = FallbackBlockHeader {
            fallback_epoch_no: 30,
            shard_id: 0,
            leader_consensus_id: 2,
            leader_pub_key: members[2].public_key,
            leader_network_info: members[2].network_address,
            state_root_hash: runtime.accounts.state_root_hash(),
        };
        let signers: Vec<(usize, &BlsKeypair)> = keys.iter().enumerate().collect();
        let block = cosign_fallback_block(header, 3, &signers, &signers).unwrap();
        let message = encode_fallback_message(&block);

        assert!(processor.handle(&message, MESSAGE_BODY_OFFSET, &members[0].network_address));

        assert_eq!(processor.committee().leader(), Some(members[2].clone()));
        assert_eq!(runtime.tx_pool.processed_count(30), 0);
        assert_eq!(runtime.tx_pool.created_count(), 0);
        assert_eq!(runtime.tx_pool.buffered_count(), 0);
        assert!(runtime.accounts.get_working(&bob).is_none());
        assert_eq!(state.protocol_state(), ProtocolState::Pow);
        assert_eq!(
            events.try_recv().unwrap(),
            RoundEvent::StartPow { fallback_epoch: 30 }
        );
    }
}
