//! Roundscope Monitor
//!
//! Production binary for the PBFT round monitor.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (listen on 0.0.0.0:8002)
//! roundscope
//!
//! # Start with a configuration file
//! roundscope --config monitor.toml
//!
//! # Override the listen address and debug log
//! roundscope --listen 127.0.0.1:9000 --debug-log ./live.log
//! ```
//!
//! # Configuration
//!
//! Example TOML:
//!
//! ```toml
//! [server]
//! listen_addr = "0.0.0.0:8002"
//!
//! [engine]
//! idle_timeout_ms = 5000
//! max_live_buffers = 64
//! replicas = 7
//!
//! [consumer]
//! batch_size = 256
//! poll_wait_ms = 500
//!
//! [replay]
//! limit = 10000
//!
//! [debug_log]
//! path = "./live.log"
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use roundscope_core::EngineConfig;
use roundscope_server::{
    init_logging, ApiServer, ApiServerConfig, AppState, ConsumerConfig, ControlState, DebugLog,
    IngestHub, ReplayLog,
};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

/// Roundscope Monitor
///
/// Reconstructs PBFT consensus rounds from a log-record stream and serves
/// them as ordered SSE events.
#[derive(Parser, Debug)]
#[command(name = "roundscope")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address (overrides config)
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Replica count of the monitored cluster (overrides config)
    #[arg(long)]
    replicas: Option<u32>,

    /// Debug log path (overrides config)
    #[arg(long)]
    debug_log: Option<PathBuf>,

    /// Log level filter (overrides RUST_LOG)
    #[arg(long, default_value = "info,roundscope=debug")]
    log_level: String,
}

/// Top-level monitor configuration.
#[derive(Debug, Clone, Default, Deserialize)]
struct MonitorConfig {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    engine: EngineSection,
    #[serde(default)]
    consumer: ConsumerSection,
    #[serde(default)]
    replay: ReplaySection,
    #[serde(default)]
    debug_log: DebugLogSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct ServerSection {
    listen_addr: SocketAddr,
    /// Ingest hub capacity per consumer before lag sets in.
    hub_capacity: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8002)),
            hub_capacity: 4096,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct EngineSection {
    idle_timeout_ms: u64,
    max_live_buffers: usize,
    replicas: u32,
    fault_override: Option<u32>,
}

impl Default for EngineSection {
    fn default() -> Self {
        let defaults = EngineConfig::default();
        Self {
            idle_timeout_ms: defaults.idle_timeout.as_millis() as u64,
            max_live_buffers: defaults.max_live_buffers,
            replicas: defaults.replica_count,
            fault_override: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct ConsumerSection {
    batch_size: usize,
    poll_wait_ms: u64,
}

impl Default for ConsumerSection {
    fn default() -> Self {
        let defaults = ConsumerConfig::default();
        Self {
            batch_size: defaults.batch_size,
            poll_wait_ms: defaults.poll_wait.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct ReplaySection {
    limit: usize,
}

impl Default for ReplaySection {
    fn default() -> Self {
        Self { limit: 10_000 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DebugLogSection {
    path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level).context("failed to initialize logging")?;

    let mut config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str::<MonitorConfig>(&text)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        }
        None => MonitorConfig::default(),
    };

    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }
    if let Some(replicas) = cli.replicas {
        config.engine.replicas = replicas;
    }
    if let Some(path) = cli.debug_log {
        config.debug_log.path = Some(path);
    }

    let debug_log = match &config.debug_log.path {
        Some(path) => {
            let log = DebugLog::open(path)
                .with_context(|| format!("failed to open debug log {}", path.display()))?;
            info!(path = %path.display(), "debug log enabled");
            Some(Arc::new(log))
        }
        None => None,
    };

    let engine_config = EngineConfig {
        idle_timeout: Duration::from_millis(config.engine.idle_timeout_ms),
        max_live_buffers: config.engine.max_live_buffers,
        replica_count: config.engine.replicas,
        fault_override: config.engine.fault_override,
    };
    let consumer_config = ConsumerConfig {
        batch_size: config.consumer.batch_size,
        poll_wait: Duration::from_millis(config.consumer.poll_wait_ms),
    };

    let state = AppState::new(
        Arc::new(IngestHub::new(config.server.hub_capacity)),
        Arc::new(ControlState::new(
            config.engine.replicas,
            config.engine.fault_override,
        )),
        Arc::new(ReplayLog::new(config.replay.limit)),
        debug_log,
        engine_config,
        consumer_config,
    );

    let server = ApiServer::new(
        ApiServerConfig {
            listen_addr: config.server.listen_addr,
        },
        state,
    );
    let handle = server.start().await.context("failed to start API server")?;
    handle.set_ready(true);
    info!(addr = %handle.local_addr(), "roundscope monitor ready");

    signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutdown signal received");
    handle.abort();
    Ok(())
}
