//! The canonical normalized output unit.

use crate::phase::EventKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire schema version carried by every emitted envelope.
pub const SCHEMA_VERSION: u32 = 1;

/// One normalized, addressed protocol event in the wire shape the
/// visualization frontend consumes.
///
/// Created once by the envelope builder; `eid` is zero until the sequencer
/// stamps it at emission time, after which the envelope is handed to the
/// sink and discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub schema_ver: u32,
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Event timestamp in microseconds (log timestamp, or wall clock if absent).
    pub ts: u64,
    /// Session label, derived from the control epoch.
    pub sid: String,
    /// Strictly monotonically increasing emission id; assigned by the sequencer.
    pub eid: u64,
    pub view: i64,
    /// Protocol order if known, else client rank, else 0.
    pub seq: i64,
    /// Sender id, or [`crate::UNKNOWN_SENDER`] when origin-less.
    pub from: i64,
    /// Resolved receiver ids. Empty means unaddressed/broadcast, never
    /// "no recipients".
    pub to: Vec<i64>,
    /// The original nested message body, retained for output.
    pub data: Value,
}

/// Payload of the `SessionStart` control event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStartData {
    /// Replica count of the monitored cluster.
    pub n: u32,
    /// Fault tolerance, `(n - 1) / 3` unless overridden by the operator.
    pub f: u32,
}

/// Payload of the `PrimaryElected` control event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryElectedData {
    pub primary: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_shape() {
        let env = Envelope {
            schema_ver: SCHEMA_VERSION,
            kind: EventKind::PrePrepare,
            ts: 1234,
            sid: "run-0".to_string(),
            eid: 42,
            view: 0,
            seq: 7,
            from: 0,
            to: vec![1, 2, 3],
            data: serde_json::json!({"digest": "abc"}),
        };

        let value: Value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["schema_ver"], 1);
        assert_eq!(value["type"], "PrePrepare");
        assert_eq!(value["ts"], 1234);
        assert_eq!(value["sid"], "run-0");
        assert_eq!(value["eid"], 42);
        assert_eq!(value["seq"], 7);
        assert_eq!(value["from"], 0);
        assert_eq!(value["to"], serde_json::json!([1, 2, 3]));
        assert_eq!(value["data"]["digest"], "abc");
    }

    #[test]
    fn test_envelope_round_trips() {
        let env = Envelope {
            schema_ver: SCHEMA_VERSION,
            kind: EventKind::SessionStart,
            ts: 0,
            sid: "run-3".to_string(),
            eid: 1,
            view: 0,
            seq: 0,
            from: crate::UNKNOWN_SENDER,
            to: vec![],
            data: serde_json::to_value(SessionStartData { n: 7, f: 2 }).unwrap(),
        };

        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
    }
}
