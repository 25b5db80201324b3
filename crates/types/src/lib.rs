//! Core types for the PBFT round monitor.
//!
//! This crate provides the foundational types shared by the correlation
//! engine and the streaming server:
//!
//! - [`Phase`]: the five protocol message kinds in their fixed execution order
//! - [`EventKind`]: everything an emitted envelope can be (phases + control events)
//! - [`Envelope`]: the canonical normalized output unit, in the wire shape
//!   the visualization frontend consumes
//! - [`CorrelationKey`]: the provisional or final identity of a round in progress
//!
//! Types here are passive data. All correlation logic lives in
//! `roundscope-core`; all I/O lives in `roundscope-server`.

mod envelope;
mod key;
mod phase;

pub use envelope::{Envelope, PrimaryElectedData, SessionStartData, SCHEMA_VERSION};
pub use key::CorrelationKey;
pub use phase::{EventKind, Phase};

/// Sender id used when the origin of an event is unknown or the event was
/// injected by the monitor itself (control events).
pub const UNKNOWN_SENDER: i64 = -1;

/// Compute the fault tolerance `f` for a cluster of `n` replicas.
///
/// Standard PBFT bound: `f = (n - 1) / 3`, floored.
pub fn fault_tolerance(replica_count: u32) -> u32 {
    replica_count.saturating_sub(1) / 3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_tolerance() {
        assert_eq!(fault_tolerance(0), 0);
        assert_eq!(fault_tolerance(1), 0);
        assert_eq!(fault_tolerance(4), 1);
        assert_eq!(fault_tolerance(7), 2);
        assert_eq!(fault_tolerance(10), 3);
    }
}
