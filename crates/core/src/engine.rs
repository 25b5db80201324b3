//! The correlation engine.
//!
//! One engine instance serves one stream consumer and owns the full
//! pipeline: normalize, build, correlate, buffer, sequence. The engine is
//! synchronous and performs no I/O; the server drives it with raw payloads
//! and the current wall clock, and forwards whatever it emits.

use crate::build::build_envelope;
use crate::config::EngineConfig;
use crate::normalize::normalize;
use crate::rounds::{Flush, FlushReason, Routed, RoundTable};
use crate::sequence::{EmittedEvent, Sequencer};
use roundscope_types::fault_tolerance;
use tracing::{debug, info, trace};

/// Control-plane values the engine observes each loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlView {
    /// Monotonically increasing run marker; `-1` means no run yet.
    pub epoch: i64,
    pub replica_count: u32,
    pub fault_override: Option<u32>,
}

/// Plain counters the engine maintains; the server scrapes these into its
/// metric registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Raw records offered to the engine.
    pub records_seen: u64,
    /// Records discarded as noise (unparseable, wrong category, unknown kind).
    pub records_discarded: u64,
    /// Protocol-shaped records with no identifiers and no active round.
    pub records_unroutable: u64,
    /// Envelopes handed to the sink.
    pub events_emitted: u64,
    /// Flush counts indexed by [`FlushReason::index`].
    pub rounds_flushed: [u64; FlushReason::COUNT],
}

impl EngineStats {
    pub fn rounds_flushed_for(&self, reason: FlushReason) -> u64 {
        self.rounds_flushed[reason.index()]
    }
}

/// Round-correlation engine for a single consumer stream.
pub struct Engine {
    config: EngineConfig,
    table: RoundTable,
    sequencer: Sequencer,
    /// Control epoch this engine has already emitted control events for.
    epoch: i64,
    sid: String,
    stats: EngineStats,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let table = RoundTable::new(
            config.idle_timeout.as_micros() as u64,
            config.max_live_buffers,
        );
        Self {
            table,
            sequencer: Sequencer::new(),
            epoch: -1,
            sid: session_label(-1),
            config,
            stats: EngineStats::default(),
        }
    }

    /// Reconcile with the control plane. On an epoch change every live
    /// buffer is flushed (not remembered for replay), all round-scoped state
    /// is cleared, and a fresh control-event pair is emitted for the new
    /// run.
    pub fn observe_control(&mut self, control: ControlView, now_micros: u64) -> Vec<EmittedEvent> {
        self.config.replica_count = control.replica_count;
        self.config.fault_override = control.fault_override;

        if control.epoch == self.epoch {
            return Vec::new();
        }
        info!(
            from_epoch = self.epoch,
            to_epoch = control.epoch,
            replicas = control.replica_count,
            "control epoch advanced; resetting round state"
        );

        let mut out = Vec::new();
        for flush in self.table.reset() {
            out.extend(self.emit_flush(flush));
        }

        self.epoch = control.epoch;
        self.sid = session_label(control.epoch);

        if control.epoch >= 0 {
            let f = control
                .fault_override
                .unwrap_or_else(|| fault_tolerance(control.replica_count));
            out.extend(self.sequencer.emit_session_start(
                &self.sid,
                control.replica_count,
                f,
                now_micros,
            ));
            self.stats.events_emitted += 2;
        }
        out
    }

    /// Process one raw record. Returns everything the record caused to be
    /// emitted, which is usually nothing until a round completes.
    pub fn ingest(&mut self, raw: &[u8], now_micros: u64) -> Vec<EmittedEvent> {
        self.stats.records_seen += 1;

        let Some(fields) = normalize(raw, self.config.replica_count) else {
            self.stats.records_discarded += 1;
            trace!("record discarded during normalization");
            return Vec::new();
        };
        let Some(event) = build_envelope(fields, &self.sid, now_micros) else {
            self.stats.records_discarded += 1;
            trace!("record discarded: kind outside the phase mapping");
            return Vec::new();
        };

        let (flushes, routed) = self.table.route(event, now_micros);
        if routed == Routed::Unroutable {
            self.stats.records_unroutable += 1;
        }

        let mut out = Vec::new();
        for flush in flushes {
            out.extend(self.emit_flush(flush));
        }
        out
    }

    /// Idle-timeout pass. Must run on every consumer loop iteration,
    /// including iterations that pulled zero records, or a stalled round
    /// would never surface.
    pub fn tick(&mut self, now_micros: u64) -> Vec<EmittedEvent> {
        let mut out = Vec::new();
        for flush in self.table.take_idle(now_micros) {
            out.extend(self.emit_flush(flush));
        }
        out
    }

    /// Unconditional drain before the engine terminates.
    pub fn drain(&mut self) -> Vec<EmittedEvent> {
        let mut out = Vec::new();
        for flush in self.table.drain_all() {
            out.extend(self.emit_flush(flush));
        }
        out
    }

    /// The most recently completed round, for replay to new consumers.
    pub fn replay(&self) -> &[EmittedEvent] {
        self.sequencer.replay()
    }

    pub fn clear_replay(&mut self) {
        self.sequencer.clear_replay();
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn live_buffers(&self) -> usize {
        self.table.live_buffers()
    }

    pub fn last_eid(&self) -> u64 {
        self.sequencer.last_eid()
    }

    pub fn session_id(&self) -> &str {
        &self.sid
    }

    fn emit_flush(&mut self, flush: Flush) -> Vec<EmittedEvent> {
        debug!(
            key = %flush.key,
            reason = flush.reason.as_str(),
            events = flush.events.len(),
            "round flushed"
        );
        self.stats.rounds_flushed[flush.reason.index()] += 1;

        // Session-reset flushes surface their events but are not remembered
        // for replay.
        let remember = flush.reason != FlushReason::SessionReset;
        let events = self.sequencer.emit_round(
            flush.events.into_iter().map(|buffered| buffered.envelope),
            remember,
        );
        self.stats.events_emitted += events.len() as u64;
        events
    }
}

/// Session label for a control epoch. Epoch `-1` predates the first run.
fn session_label(epoch: i64) -> String {
    if epoch < 0 {
        "standby".to_string()
    } else {
        format!("run-{epoch}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(kind: &str, body: serde_json::Value) -> Vec<u8> {
        let mut message = body;
        message["kind"] = json!(kind);
        serde_json::to_vec(&json!({
            "category": "message-event",
            "participant": message.get("participant").cloned().unwrap_or(json!(null)),
            "message": message,
        }))
        .unwrap()
    }

    fn engine() -> Engine {
        Engine::new(EngineConfig::default())
    }

    fn control(epoch: i64) -> ControlView {
        ControlView {
            epoch,
            replica_count: 7,
            fault_override: None,
        }
    }

    #[test]
    fn test_noise_is_discarded_silently() {
        let mut e = engine();
        assert!(e.ingest(b"garbage", 1).is_empty());
        assert!(e
            .ingest(&serde_json::to_vec(&json!({"category": "message-event", "message": {"kind": "viewchange"}})).unwrap(), 1)
            .is_empty());
        assert_eq!(e.stats().records_discarded, 2);
        assert_eq!(e.stats().records_unroutable, 0);
    }

    #[test]
    fn test_unroutable_is_counted_not_fatal() {
        let mut e = engine();
        assert!(e.ingest(&record("prepare", json!({})), 1).is_empty());
        assert_eq!(e.stats().records_unroutable, 1);
        // Processing continues normally afterwards.
        assert!(e
            .ingest(&record("request", json!({"rank": 1})), 2)
            .is_empty());
        assert_eq!(e.live_buffers(), 1);
    }

    #[test]
    fn test_session_start_emitted_once_per_epoch() {
        let mut e = engine();
        assert!(e.observe_control(control(-1), 10).is_empty());

        let events = e.observe_control(control(0), 20);
        assert_eq!(events.len(), 2);
        assert_eq!(e.session_id(), "run-0");

        assert!(e.observe_control(control(0), 30).is_empty());

        let events = e.observe_control(control(1), 40);
        assert_eq!(events.len(), 2);
        assert_eq!(e.session_id(), "run-1");
    }

    #[test]
    fn test_epoch_advance_flushes_in_flight_rounds() {
        let mut e = engine();
        e.observe_control(control(0), 10);
        e.ingest(&record("request", json!({"rank": 1})), 20);
        assert_eq!(e.live_buffers(), 1);

        let events = e.observe_control(control(1), 30);
        // One flushed request plus the fresh control pair.
        assert_eq!(events.len(), 3);
        assert_eq!(e.live_buffers(), 0);
        assert_eq!(
            e.stats().rounds_flushed_for(FlushReason::SessionReset),
            1
        );
        // Reset flushes are not remembered for replay.
        assert!(e.replay().is_empty());
    }

    #[test]
    fn test_drain_is_unconditional() {
        let mut e = engine();
        e.ingest(&record("request", json!({"rank": 1})), 10);
        e.ingest(&record("prepare", json!({"order": 5})), 20);

        let events = e.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(e.live_buffers(), 0);
        assert_eq!(e.stats().rounds_flushed_for(FlushReason::Shutdown), 2);
        assert_eq!(e.last_eid(), events.last().unwrap().eid);

        // Drained rounds are remembered for replay until explicitly cleared.
        assert!(!e.replay().is_empty());
        e.clear_replay();
        assert!(e.replay().is_empty());
    }

    #[test]
    fn test_eids_monotonic_across_rounds_and_controls() {
        let mut e = engine();
        let mut eids: Vec<u64> = Vec::new();
        eids.extend(e.observe_control(control(0), 5).iter().map(|ev| ev.eid));
        e.ingest(&record("request", json!({"rank": 1, "timestamp": 3})), 10);
        e.ingest(
            &record("preprepare", json!({"order": 7, "rank": 1, "timestamp": 2})),
            11,
        );
        eids.extend(e.drain().iter().map(|ev| ev.eid));

        assert!(eids.windows(2).all(|w| w[0] < w[1]), "eids: {eids:?}");
    }
}
