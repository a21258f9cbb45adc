//! Fallback timeout watchdog
//!
//! After a fallback the new committee gets one interval to produce a block.
//! If the epoch has not moved on when the interval expires, a
//! [`FallbackTimeout`] is emitted so the upstream trigger can start another
//! fallback round.

use crate::state::NodeState;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Emitted when an armed watchdog expires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackTimeout {
    pub epoch: u64,
}

struct Armed {
    epoch: u64,
    _cancel: Sender<()>,
}

/// Arms detached watchdog threads. At most one is live at a time; arming
/// again or dropping the timer cancels the previous one.
pub struct FallbackTimer {
    interval: Duration,
    node_state: Arc<NodeState>,
    events: Sender<FallbackTimeout>,
    armed: Mutex<Option<Armed>>,
}

impl FallbackTimer {
    pub fn new(
        interval: Duration,
        node_state: Arc<NodeState>,
    ) -> (Self, Receiver<FallbackTimeout>) {
        let (events, receiver) = unbounded();
        let timer = Self {
            interval,
            node_state,
            events,
            armed: Mutex::new(None),
        };
        (timer, receiver)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Arm a watchdog for the current epoch. Returns without waiting.
    pub fn schedule(&self) {
        let epoch = self.node_state.current_epoch();
        let (cancel_tx, cancel_rx) = bounded::<()>(1);

        // Replacing the previous sender disconnects its watchdog
        *self.armed.lock() = Some(Armed {
            epoch,
            _cancel: cancel_tx,
        });

        let interval = self.interval;
        let node_state = self.node_state.clone();
        let events = self.events.clone();

        let spawned = thread::Builder::new()
            .name(format!("fallback-timeout-{}", epoch))
            .spawn(move || match cancel_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let current = node_state.current_epoch();
                    if current != epoch {
                        tracing::debug!(
                            "Fallback timeout for epoch {} expired after epoch moved to {}",
                            epoch,
                            current
                        );
                        return;
                    }
                    tracing::warn!(
                        "No DS block for epoch {} within {:?}, fallback timeout fired",
                        epoch,
                        interval
                    );
                    let _ = events.send(FallbackTimeout { epoch });
                }
                _ => {
                    tracing::debug!("Fallback timeout for epoch {} cancelled", epoch);
                }
            });

        match spawned {
            Ok(_) => tracing::debug!("Armed fallback timeout for epoch {} ({:?})", epoch, interval),
            Err(e) => tracing::error!("Failed to spawn fallback timeout watchdog: {}", e),
        }
    }

    /// Disarm the live watchdog, if any
    pub fn cancel(&self) {
        self.armed.lock().take();
    }

    /// Epoch of the most recently armed watchdog
    pub fn armed_epoch(&self) -> Option<u64> {
        self.armed.lock().as_ref().map(|a| a.epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeMode, ProtocolState};

    fn node_state(epoch: u64) -> Arc<NodeState> {
        Arc::new(NodeState::new(NodeMode::Full, epoch, ProtocolState::Pow))
    }

    #[test]
    fn test_fires_when_epoch_unchanged() {
        let (timer, events) = FallbackTimer::new(Duration::from_millis(20), node_state(5));
        timer.schedule();

        assert_eq!(timer.armed_epoch(), Some(5));
        assert_eq!(
            events.recv_timeout(Duration::from_secs(5)).unwrap(),
            FallbackTimeout { epoch: 5 }
        );
    }

    #[test]
    fn test_silent_when_epoch_advanced() {
        let state = node_state(5);
        let (timer, events) = FallbackTimer::new(Duration::from_millis(50), state.clone());
        timer.schedule();
        state.advance_epoch();

        assert!(events.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn test_cancel_and_rearm() {
        let state = node_state(9);
        let (timer, events) = FallbackTimer::new(Duration::from_millis(100), state.clone());

        timer.schedule();
        timer.cancel();
        assert!(timer.armed_epoch().is_none());
        assert!(events.recv_timeout(Duration::from_millis(300)).is_err());

        timer.schedule();
        // Re-arming cancels the first watchdog, so only one event arrives
        timer.schedule();
        assert!(events.recv_timeout(Duration::from_secs(5)).is_ok());
        assert!(events.recv_timeout(Duration::from_millis(300)).is_err());
    }
}
