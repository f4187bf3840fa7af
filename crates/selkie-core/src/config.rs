//! Configuration for the Selkie runtime
//!
//! TigerStyle: Explicit defaults, validation, reasonable limits.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Number of pooled worker threads started at boot
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Reactor wait timeout in milliseconds
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Cache depth past which a backpressure warning is logged
    #[serde(default = "default_cache_pending_warn")]
    pub cache_pending_warn: usize,

    /// Number of pre-allocated connection events
    #[serde(default = "default_event_conn_pool_size")]
    pub event_conn_pool_size: usize,

    /// Timer thread tick interval in milliseconds
    #[serde(default = "default_timer_tick_ms")]
    pub timer_tick_ms: u64,
}

fn default_worker_pool_size() -> usize {
    WORKER_POOL_SIZE_DEFAULT
}

fn default_poll_timeout_ms() -> u64 {
    POLL_TIMEOUT_MS_DEFAULT
}

fn default_cache_pending_warn() -> usize {
    CACHE_PENDING_COUNT_WARN_DEFAULT
}

fn default_event_conn_pool_size() -> usize {
    EVENT_CONN_POOL_SIZE_DEFAULT
}

fn default_timer_tick_ms() -> u64 {
    TIMER_TICK_MS_DEFAULT
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            poll_timeout_ms: default_poll_timeout_ms(),
            cache_pending_warn: default_cache_pending_warn(),
            event_conn_pool_size: default_event_conn_pool_size(),
            timer_tick_ms: default_timer_tick_ms(),
        }
    }
}

impl RuntimeConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            return Err(Error::InvalidConfiguration {
                field: "worker_pool_size".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.worker_pool_size > WORKER_POOL_SIZE_MAX {
            return Err(Error::InvalidConfiguration {
                field: "worker_pool_size".into(),
                reason: format!("exceeds limit {}", WORKER_POOL_SIZE_MAX),
            });
        }
        if self.poll_timeout_ms == 0 {
            return Err(Error::InvalidConfiguration {
                field: "poll_timeout_ms".into(),
                reason: "must be nonzero".into(),
            });
        }
        if self.cache_pending_warn == 0 {
            return Err(Error::InvalidConfiguration {
                field: "cache_pending_warn".into(),
                reason: "must be nonzero".into(),
            });
        }
        if self.timer_tick_ms == 0 {
            return Err(Error::InvalidConfiguration {
                field: "timer_tick_ms".into(),
                reason: "must be nonzero".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = RuntimeConfig {
            worker_pool_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_pool_rejected() {
        let config = RuntimeConfig {
            worker_pool_size: WORKER_POOL_SIZE_MAX + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
