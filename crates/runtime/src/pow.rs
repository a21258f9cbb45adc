//! Re-entry into PoW-based committee election after a fallback

use crossbeam_channel::{unbounded, Receiver, Sender};
use fallback_consensus::{NodeState, ProtocolState, RoundEntry};
use std::sync::Arc;

/// Round lifecycle events for the node driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEvent {
    /// Start PoW for the round following the fallback at `fallback_epoch`
    StartPow { fallback_epoch: u64 },
}

/// Moves the node into PoW and tells the driver to start mining
pub struct PowLauncher {
    node_state: Arc<NodeState>,
    events: Sender<RoundEvent>,
}

impl PowLauncher {
    pub fn new(node_state: Arc<NodeState>) -> (Self, Receiver<RoundEvent>) {
        let (events, receiver) = unbounded();
        (Self { node_state, events }, receiver)
    }
}

impl RoundEntry for PowLauncher {
    fn initiate_pow(&self, epoch: u64) {
        self.node_state.set_state(ProtocolState::Pow);
        tracing::info!("[epoch {}] Initiating PoW for the next DS committee election", epoch);

        if self
            .events
            .send(RoundEvent::StartPow {
                fallback_epoch: epoch,
            })
            .is_err()
        {
            tracing::warn!("PoW driver is gone, StartPow for epoch {} dropped", epoch);
        }
    }
}
