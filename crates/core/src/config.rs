//! Engine configuration.

use std::time::Duration;

/// Configuration for one correlation engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// A buffer not appended to for longer than this is flushed, so a round
    /// with permanently missing messages still surfaces.
    pub idle_timeout: Duration,
    /// Ceiling on concurrently live buffers across all key kinds. On
    /// overflow the buffer with the oldest `first_seen` is flushed before a
    /// new key is admitted.
    pub max_live_buffers: usize,
    /// Replica count of the monitored cluster; updated via the control plane.
    pub replica_count: u32,
    /// Operator override for the fault tolerance reported in `SessionStart`.
    pub fault_override: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(5),
            max_live_buffers: 64,
            replica_count: 7,
            fault_override: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
        assert_eq!(config.max_live_buffers, 64);
        assert_eq!(config.replica_count, 7);
        assert!(config.fault_override.is_none());
    }
}
