//! Process-wide control-plane state.
//!
//! The monitored deployment itself is managed elsewhere; the monitor's
//! control surface only needs three mutation points: advance the control
//! epoch, update the replica count, and clear replay state. Engines read
//! this state once per loop iteration and never mutate it.

use parking_lot::RwLock;
use roundscope_core::ControlView;

#[derive(Debug)]
struct ControlInner {
    epoch: i64,
    replica_count: u32,
    fault_override: Option<u32>,
    next_request: Option<String>,
}

/// Shared control-plane state. Cheap to snapshot, mutated only by the
/// control HTTP surface.
#[derive(Debug)]
pub struct ControlState {
    inner: RwLock<ControlInner>,
}

impl ControlState {
    /// Start with no session yet (epoch `-1`).
    pub fn new(replica_count: u32, fault_override: Option<u32>) -> Self {
        Self {
            inner: RwLock::new(ControlInner {
                epoch: -1,
                replica_count,
                fault_override,
                next_request: None,
            }),
        }
    }

    pub fn view(&self) -> ControlView {
        let inner = self.inner.read();
        ControlView {
            epoch: inner.epoch,
            replica_count: inner.replica_count,
            fault_override: inner.fault_override,
        }
    }

    /// Start a new run: advance the epoch, optionally reconfiguring first.
    /// Returns the new epoch.
    pub fn advance_epoch(&self, replica_count: Option<u32>, fault_override: Option<u32>) -> i64 {
        let mut inner = self.inner.write();
        if let Some(n) = replica_count {
            inner.replica_count = n;
        }
        if let Some(f) = fault_override {
            inner.fault_override = Some(f);
        }
        inner.epoch += 1;
        inner.epoch
    }

    /// Change the replica count. Reconfiguration restarts the monitored
    /// run, so this advances the epoch as well. Returns the new epoch.
    pub fn set_replica_count(&self, replica_count: u32) -> i64 {
        let mut inner = self.inner.write();
        inner.replica_count = replica_count;
        inner.epoch += 1;
        inner.epoch
    }

    pub fn set_next_request(&self, payload: Option<String>) {
        self.inner.write().next_request = payload;
    }

    pub fn next_request(&self) -> Option<String> {
        self.inner.read().next_request.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_with_no_session() {
        let control = ControlState::new(7, None);
        let view = control.view();
        assert_eq!(view.epoch, -1);
        assert_eq!(view.replica_count, 7);
        assert_eq!(view.fault_override, None);
    }

    #[test]
    fn test_epoch_advances_monotonically() {
        let control = ControlState::new(7, None);
        assert_eq!(control.advance_epoch(None, None), 0);
        assert_eq!(control.advance_epoch(Some(10), Some(2)), 1);
        let view = control.view();
        assert_eq!(view.replica_count, 10);
        assert_eq!(view.fault_override, Some(2));
    }

    #[test]
    fn test_replica_change_advances_epoch() {
        let control = ControlState::new(7, None);
        control.advance_epoch(None, None);
        assert_eq!(control.set_replica_count(4), 1);
        assert_eq!(control.view().replica_count, 4);
    }

    #[test]
    fn test_next_request_stash() {
        let control = ControlState::new(7, None);
        assert_eq!(control.next_request(), None);
        control.set_next_request(Some("Hello World".to_string()));
        assert_eq!(control.next_request(), Some("Hello World".to_string()));
        control.set_next_request(None);
        assert_eq!(control.next_request(), None);
    }
}
