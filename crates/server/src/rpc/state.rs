//! Shared state for HTTP handlers.

use crate::consumer::ConsumerConfig;
use crate::control::ControlState;
use crate::debug_log::DebugLog;
use crate::replay::ReplayLog;
use crate::source::IngestHub;
use roundscope_core::EngineConfig;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

/// Shared state for HTTP handlers. Cheap to clone; everything mutable is
/// behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Fan-out point between record producers and stream consumers.
    pub hub: Arc<IngestHub>,
    /// Control-plane state (epoch, replica count, request stash).
    pub control: Arc<ControlState>,
    /// Rolling log of emitted events for resumption and replay.
    pub replay: Arc<ReplayLog>,
    /// Best-effort debug log, if configured.
    pub debug_log: Option<Arc<DebugLog>>,
    /// Template configuration for per-consumer engines.
    pub engine_config: EngineConfig,
    /// Consumer loop configuration.
    pub consumer_config: ConsumerConfig,
    /// Ready flag for the readiness probe.
    pub ready: Arc<AtomicBool>,
    /// Server start time for uptime reporting.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        hub: Arc<IngestHub>,
        control: Arc<ControlState>,
        replay: Arc<ReplayLog>,
        debug_log: Option<Arc<DebugLog>>,
        engine_config: EngineConfig,
        consumer_config: ConsumerConfig,
    ) -> Self {
        Self {
            hub,
            control,
            replay,
            debug_log,
            engine_config,
            consumer_config,
            ready: Arc::new(AtomicBool::new(false)),
            start_time: Instant::now(),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    AppState::new(
        Arc::new(IngestHub::new(256)),
        Arc::new(ControlState::new(7, None)),
        Arc::new(ReplayLog::new(1000)),
        None,
        EngineConfig::default(),
        ConsumerConfig {
            batch_size: 64,
            poll_wait: std::time::Duration::from_millis(10),
        },
    )
}
