//! The per-consumer stream loop.
//!
//! Each attached consumer owns a full copy of the correlation engine and a
//! private subscription to the ingest hub; records are processed strictly
//! sequentially, so no locking is needed around engine state. The loop runs
//! the idle-timeout pass on every iteration, including iterations that
//! pulled zero records, and drains the engine unconditionally before
//! releasing its subscription.

use crate::control::ControlState;
use crate::debug_log::DebugLog;
use crate::metrics::metrics;
use crate::replay::ReplayLog;
use crate::source::{RecordSource, SourceError};
use roundscope_core::{EmittedEvent, Engine, EngineStats, FlushReason};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Errors that terminate a consumer loop.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// The record bus is gone. Raised only after a best-effort drain.
    #[error("record source closed")]
    SourceClosed,
}

/// Configuration for the consumer loop.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Maximum records pulled per iteration.
    pub batch_size: usize,
    /// How long one pull waits for its first record.
    pub poll_wait: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 256,
            poll_wait: Duration::from_millis(500),
        }
    }
}

/// Current wall clock in microseconds since the Unix epoch.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Drive one engine against one record source until the consumer detaches
/// or the source closes.
///
/// Emitted events are forwarded to `out` in order; every emission is also
/// appended to the shared replay log and the debug log. Consumer disconnect
/// (the receiving side of `out` dropped) ends the loop cleanly after a
/// drain; a closed source drains first and then surfaces the error.
pub async fn run_consumer<S: RecordSource>(
    mut source: S,
    mut engine: Engine,
    control: Arc<ControlState>,
    replay: Arc<ReplayLog>,
    debug_log: Option<Arc<DebugLog>>,
    out: mpsc::Sender<EmittedEvent>,
    config: ConsumerConfig,
) -> Result<(), ConsumerError> {
    metrics().consumers_connected.inc();
    let _gauge_guard = GaugeGuard;

    let mut last_stats = engine.stats();
    let mut last_rounds = 0u64;

    loop {
        if out.is_closed() {
            info!("consumer detached; draining");
            let events = engine.drain();
            record_emissions(&events, &replay, debug_log.as_deref());
            publish_stats_delta(&engine, &mut last_stats);
            return Ok(());
        }

        let mut events = engine.observe_control(control.view(), now_micros());

        match source.next_batch(config.batch_size, config.poll_wait).await {
            Ok(batch) => {
                for record in &batch {
                    events.extend(engine.ingest(record, now_micros()));
                }
            }
            Err(SourceError::Closed) => {
                warn!("record source closed; draining before shutdown");
                events.extend(engine.drain());
                record_emissions(&events, &replay, debug_log.as_deref());
                for event in events {
                    if out.send(event).await.is_err() {
                        break;
                    }
                }
                publish_stats_delta(&engine, &mut last_stats);
                return Err(ConsumerError::SourceClosed);
            }
        }

        let lagged = source.take_lagged();
        if lagged > 0 {
            warn!(dropped = lagged, "consumer lagged behind the ingest hub");
            metrics().hub_lagged_records.inc_by(lagged as f64);
        }

        // Idle flushing must run even when the batch was empty.
        events.extend(engine.tick(now_micros()));

        record_emissions(&events, &replay, debug_log.as_deref());
        sync_last_round(&engine, &replay, &mut last_rounds);
        publish_stats_delta(&engine, &mut last_stats);

        for event in events {
            if out.send(event).await.is_err() {
                info!("consumer detached mid-round; draining");
                let remainder = engine.drain();
                record_emissions(&remainder, &replay, debug_log.as_deref());
                publish_stats_delta(&engine, &mut last_stats);
                return Ok(());
            }
        }
    }
}

struct GaugeGuard;

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        metrics().consumers_connected.dec();
    }
}

fn record_emissions(events: &[EmittedEvent], replay: &ReplayLog, debug_log: Option<&DebugLog>) {
    for event in events {
        replay.push(event);
        if let Some(log) = debug_log {
            log.append(event);
        }
    }
}

/// Publish the engine's latest completed round to the shared replay log
/// whenever a new remembered round exists.
fn sync_last_round(engine: &Engine, replay: &ReplayLog, last_rounds: &mut u64) {
    let stats = engine.stats();
    let total: u64 = FlushReason::ALL
        .iter()
        .filter(|r| **r != FlushReason::SessionReset)
        .map(|r| stats.rounds_flushed_for(*r))
        .sum();
    if total != *last_rounds {
        *last_rounds = total;
        if !engine.replay().is_empty() {
            replay.set_last_round(engine.replay());
        }
    }
}

fn publish_stats_delta(engine: &Engine, last: &mut EngineStats) {
    let current = engine.stats();
    let m = metrics();
    m.records_consumed
        .inc_by((current.records_seen - last.records_seen) as f64);
    m.records_discarded
        .inc_by((current.records_discarded - last.records_discarded) as f64);
    m.records_unroutable
        .inc_by((current.records_unroutable - last.records_unroutable) as f64);
    m.events_emitted
        .inc_by((current.events_emitted - last.events_emitted) as f64);
    for reason in FlushReason::ALL {
        let delta = current.rounds_flushed_for(reason) - last.rounds_flushed_for(reason);
        if delta > 0 {
            m.rounds_flushed
                .with_label_values(&[reason.as_str()])
                .inc_by(delta as f64);
        }
    }
    *last = current;
}
