//! Emission sequencing: monotonic id assignment, control-event injection,
//! and wire formatting.

use roundscope_types::{
    Envelope, EventKind, PrimaryElectedData, SessionStartData, UNKNOWN_SENDER, SCHEMA_VERSION,
};

/// One formatted, id-stamped event ready for the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedEvent {
    pub eid: u64,
    /// The envelope serialized as a single JSON line.
    pub json: String,
}

impl EmittedEvent {
    /// Render as a self-contained SSE unit: `id: <eid>\ndata: <json>\n\n`.
    pub fn to_sse(&self) -> String {
        format!("id: {}\ndata: {}\n\n", self.eid, self.json)
    }
}

/// Assigns emission ids and formats envelopes for the sink.
///
/// `eid` is the event timestamp forced strictly above the last assigned id,
/// which yields a total, monotonically increasing id space usable as a
/// resumption cursor even though source timestamps are not strictly ordered.
#[derive(Debug, Default)]
pub struct Sequencer {
    last_eid: u64,
    /// Formatted events of the most recently completed round, kept so a
    /// newly attached consumer sees the latest round immediately.
    replay: Vec<EmittedEvent>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp and format one envelope.
    pub fn emit(&mut self, mut envelope: Envelope) -> EmittedEvent {
        let eid = envelope.ts.max(self.last_eid + 1);
        self.last_eid = eid;
        envelope.eid = eid;
        let json = serde_json::to_string(&envelope).expect("envelope is always serializable");
        EmittedEvent { eid, json }
    }

    /// Emit a full round in drain order. When `remember` is set the round
    /// replaces the replay buffer; session-reset flushes pass `false`.
    pub fn emit_round(
        &mut self,
        envelopes: impl IntoIterator<Item = Envelope>,
        remember: bool,
    ) -> Vec<EmittedEvent> {
        let events: Vec<EmittedEvent> = envelopes.into_iter().map(|e| self.emit(e)).collect();
        if remember && !events.is_empty() {
            self.replay = events.clone();
        }
        events
    }

    /// Emit the per-session control pair: `SessionStart` then
    /// `PrimaryElected`. Control events bypass round buffering.
    pub fn emit_session_start(
        &mut self,
        sid: &str,
        replica_count: u32,
        fault_tolerance: u32,
        now_micros: u64,
    ) -> Vec<EmittedEvent> {
        let control = |kind: EventKind, data: serde_json::Value| Envelope {
            schema_ver: SCHEMA_VERSION,
            kind,
            ts: now_micros,
            sid: sid.to_string(),
            eid: 0,
            view: 0,
            seq: 0,
            from: UNKNOWN_SENDER,
            to: vec![],
            data,
        };

        let session_start = control(
            EventKind::SessionStart,
            serde_json::to_value(SessionStartData {
                n: replica_count,
                f: fault_tolerance,
            })
            .expect("control payload is always serializable"),
        );
        let primary_elected = control(
            EventKind::PrimaryElected,
            serde_json::to_value(PrimaryElectedData { primary: 0 })
                .expect("control payload is always serializable"),
        );

        vec![self.emit(session_start), self.emit(primary_elected)]
    }

    pub fn last_eid(&self) -> u64 {
        self.last_eid
    }

    /// The most recently completed round, in emission order.
    pub fn replay(&self) -> &[EmittedEvent] {
        &self.replay
    }

    pub fn clear_replay(&mut self) {
        self.replay.clear();
    }
}
