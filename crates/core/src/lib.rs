//! Round correlation and windowing engine for the PBFT monitor.
//!
//! The engine reconstructs consensus rounds from individually-arriving,
//! out-of-order, multiplexed log records and re-emits each round as an
//! ordered, addressed event sequence:
//!
//! ```text
//! raw record -> normalize -> build -> correlate/buffer -> flush -> sequence -> sink
//! ```
//!
//! The engine is:
//! - **Synchronous**: no async, no .await
//! - **Deterministic**: same state + record = same emissions
//! - **Pure-ish**: mutates self, but performs no I/O
//!
//! All I/O (the record bus, the SSE sink, timers, the control plane) lives
//! in `roundscope-server`, which drives one engine instance per consumer.

mod build;
mod config;
mod correlate;
mod engine;
mod normalize;
mod rounds;
mod sequence;

pub use build::{build_envelope, RoutableEvent};
pub use config::EngineConfig;
pub use correlate::IdentifierMap;
pub use engine::{ControlView, Engine, EngineStats};
pub use normalize::{normalize, resolve_receiver_name, NormalizedFields};
pub use rounds::{BufferedEvent, Flush, FlushReason, Routed, RoundTable};
pub use sequence::{EmittedEvent, Sequencer};
