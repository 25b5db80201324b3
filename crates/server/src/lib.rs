//! Streaming server for the PBFT round monitor.
//!
//! This crate wraps the synchronous correlation engine with real async I/O:
//!
//! - Record ingest via an HTTP NDJSON endpoint feeding a broadcast hub
//! - One engine instance and one sequential loop per SSE consumer
//! - A control surface that advances the run epoch, reconfigures the
//!   replica count, and clears replay state
//! - A rolling replay log with `from_eid` resumption
//! - A best-effort debug log and Prometheus metrics
//!
//! # Architecture
//!
//! ```text
//! producers ──POST /ingest──▶ IngestHub ──subscribe──▶ consumer loop ──▶ SSE
//!                                                        │  (one per
//!                                                        ▼   connection)
//!                                                      Engine
//! ```
//!
//! No state is shared across consumers except the control plane and the
//! replay log; each consumer's engine is driven strictly sequentially, so
//! the correlation invariants need no locks.

pub mod consumer;
pub mod control;
pub mod debug_log;
pub mod metrics;
pub mod replay;
pub mod rpc;
pub mod source;
pub mod telemetry;

pub use consumer::{now_micros, run_consumer, ConsumerConfig, ConsumerError};
pub use control::ControlState;
pub use debug_log::DebugLog;
pub use replay::ReplayLog;
pub use rpc::{create_router, ApiServer, ApiServerConfig, ApiServerError, ApiServerHandle, AppState};
pub use source::{HubSource, IngestHub, RecordSource, SourceError};
pub use telemetry::{init_logging, TelemetryError};
