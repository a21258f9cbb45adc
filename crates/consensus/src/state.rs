//! Node protocol state and the signals other threads wait on

use crate::types::{NodeMode, ProtocolState};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Epoch, protocol state and consensus round counters of this node.
///
/// Every state transition wakes threads blocked in
/// [`wait_for_state`](Self::wait_for_state).
pub struct NodeState {
    mode: NodeMode,
    epoch: AtomicU64,
    state: Mutex<ProtocolState>,
    state_changed: Condvar,
    consensus_id: AtomicU32,
    consensus_leader_id: AtomicU32,
}

impl NodeState {
    pub fn new(mode: NodeMode, epoch: u64, state: ProtocolState) -> Self {
        Self {
            mode,
            epoch: AtomicU64::new(epoch),
            state: Mutex::new(state),
            state_changed: Condvar::new(),
            consensus_id: AtomicU32::new(0),
            consensus_leader_id: AtomicU32::new(0),
        }
    }

    pub fn mode(&self) -> NodeMode {
        self.mode
    }

    pub fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Move to the next epoch, returning it
    pub fn advance_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn protocol_state(&self) -> ProtocolState {
        *self.state.lock()
    }

    pub fn set_state(&self, next: ProtocolState) {
        let mut state = self.state.lock();
        if *state != next {
            tracing::debug!("Protocol state {:?} -> {:?}", *state, next);
        }
        *state = next;
        self.state_changed.notify_all();
    }

    /// Block until the node is in `target` or `timeout` elapses.
    /// Returns whether the node reached `target`.
    pub fn wait_for_state(&self, target: ProtocolState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        while *state != target {
            if self
                .state_changed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return *state == target;
            }
        }
        true
    }

    pub fn consensus_id(&self) -> u32 {
        self.consensus_id.load(Ordering::SeqCst)
    }

    pub fn set_consensus_id(&self, id: u32) {
        self.consensus_id.store(id, Ordering::SeqCst);
    }

    pub fn consensus_leader_id(&self) -> u32 {
        self.consensus_leader_id.load(Ordering::SeqCst)
    }

    pub fn set_consensus_leader_id(&self, id: u32) {
        self.consensus_leader_id.store(id, Ordering::SeqCst);
    }

    /// Forget round identifiers of the abandoned consensus round
    pub fn reset_consensus_counters(&self) {
        self.consensus_id.store(0, Ordering::SeqCst);
        self.consensus_leader_id.store(0, Ordering::SeqCst);
    }
}

/// "A fallback block was committed" notification.
///
/// Separate from the protocol state condvar: waiters here care that
/// processing finished, not that it may start.
#[derive(Default)]
pub struct FallbackSignal {
    completed: Mutex<u64>,
    cv: Condvar,
}

impl FallbackSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fallbacks committed so far
    pub fn generation(&self) -> u64 {
        *self.completed.lock()
    }

    pub fn notify(&self) {
        let mut completed = self.completed.lock();
        *completed += 1;
        self.cv.notify_all();
    }

    /// Wait until a fallback newer than `seen` is committed.
    pub fn wait_for_completion(&self, seen: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut completed = self.completed.lock();

        while *completed <= seen {
            if self.cv.wait_until(&mut completed, deadline).timed_out() {
                return *completed > seen;
            }
        }
        true
    }
}
