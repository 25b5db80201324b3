//! Shared rolling log of emitted events.
//!
//! Every emission is appended to a bounded rolling log so a newly attached
//! consumer can resume from an `eid` cursor; without a cursor it receives
//! the most recently completed round. The log is process-wide and cleared
//! by the control plane.

use parking_lot::RwLock;
use roundscope_core::EmittedEvent;
use std::collections::VecDeque;

#[derive(Debug, Default)]
struct ReplayInner {
    log: VecDeque<EmittedEvent>,
    last_round: Vec<EmittedEvent>,
}

/// Bounded rolling log plus a snapshot of the last completed round.
#[derive(Debug)]
pub struct ReplayLog {
    inner: RwLock<ReplayInner>,
    limit: usize,
}

impl ReplayLog {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: RwLock::new(ReplayInner::default()),
            limit: limit.max(1),
        }
    }

    /// Append one emitted event, dropping the oldest entry on overflow.
    pub fn push(&self, event: &EmittedEvent) {
        let mut inner = self.inner.write();
        if inner.log.len() >= self.limit {
            inner.log.pop_front();
        }
        inner.log.push_back(event.clone());
    }

    /// Remember the most recently completed round.
    pub fn set_last_round(&self, events: &[EmittedEvent]) {
        self.inner.write().last_round = events.to_vec();
    }

    /// All retained events with `eid >= from_eid`, in emission order.
    pub fn since(&self, from_eid: u64) -> Vec<EmittedEvent> {
        self.inner
            .read()
            .log
            .iter()
            .filter(|event| event.eid >= from_eid)
            .cloned()
            .collect()
    }

    /// The most recently completed round, in emission order.
    pub fn last_round(&self) -> Vec<EmittedEvent> {
        self.inner.read().last_round.clone()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.log.clear();
        inner.last_round.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().log.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(eid: u64) -> EmittedEvent {
        EmittedEvent {
            eid,
            json: format!("{{\"eid\":{eid}}}"),
        }
    }

    #[test]
    fn test_since_filters_by_cursor() {
        let log = ReplayLog::new(100);
        for eid in 1..=5 {
            log.push(&event(eid));
        }
        let replayed = log.since(3);
        assert_eq!(replayed.iter().map(|e| e.eid).collect::<Vec<_>>(), vec![3, 4, 5]);
        assert!(log.since(99).is_empty());
    }

    #[test]
    fn test_rolling_truncation() {
        let log = ReplayLog::new(3);
        for eid in 1..=10 {
            log.push(&event(eid));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.since(0).iter().map(|e| e.eid).collect::<Vec<_>>(), vec![8, 9, 10]);
    }

    #[test]
    fn test_last_round_snapshot() {
        let log = ReplayLog::new(100);
        assert!(log.last_round().is_empty());
        log.set_last_round(&[event(1), event(2)]);
        assert_eq!(log.last_round().len(), 2);
        log.set_last_round(&[event(3)]);
        assert_eq!(log.last_round().len(), 1);
        assert_eq!(log.last_round()[0].eid, 3);
    }

    #[test]
    fn test_clear_wipes_everything() {
        let log = ReplayLog::new(100);
        log.push(&event(1));
        log.set_last_round(&[event(1)]);
        log.clear();
        assert!(log.is_empty());
        assert!(log.last_round().is_empty());
    }
}
