//! Server metrics using the native Prometheus client.
//!
//! Metrics are domain-specific rather than generic event counters. Use
//! traces for record-level granularity during investigations.

use prometheus::{register_counter, register_counter_vec, register_gauge, Counter, CounterVec, Gauge};
use std::sync::OnceLock;

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Domain-specific metrics for the streaming server.
pub struct Metrics {
    // === Ingest ===
    pub records_published: Counter,
    pub records_consumed: Counter,
    pub records_discarded: Counter,
    pub records_unroutable: Counter,
    pub hub_lagged_records: Counter,

    // === Rounds ===
    pub rounds_flushed: CounterVec,
    pub events_emitted: Counter,

    // === Consumers ===
    pub consumers_connected: Gauge,
}

impl Metrics {
    fn new() -> Self {
        Self {
            records_published: register_counter!(
                "roundscope_records_published_total",
                "Raw records published to the ingest hub"
            )
            .unwrap(),
            records_consumed: register_counter!(
                "roundscope_records_consumed_total",
                "Raw records offered to correlation engines"
            )
            .unwrap(),
            records_discarded: register_counter!(
                "roundscope_records_discarded_total",
                "Records discarded as noise during normalization"
            )
            .unwrap(),
            records_unroutable: register_counter!(
                "roundscope_records_unroutable_total",
                "Protocol-shaped records with no identifiers and no active round"
            )
            .unwrap(),
            hub_lagged_records: register_counter!(
                "roundscope_hub_lagged_records_total",
                "Records dropped for lagging consumers"
            )
            .unwrap(),
            rounds_flushed: register_counter_vec!(
                "roundscope_rounds_flushed_total",
                "Round buffers flushed, by reason",
                &["reason"]
            )
            .unwrap(),
            events_emitted: register_counter!(
                "roundscope_events_emitted_total",
                "Envelopes emitted to consumer streams"
            )
            .unwrap(),
            consumers_connected: register_gauge!(
                "roundscope_consumers_connected",
                "Currently attached stream consumers"
            )
            .unwrap(),
        }
    }
}

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once() {
        let a = metrics();
        let b = metrics();
        a.records_published.inc();
        assert!(std::ptr::eq(a, b));
    }
}
