//! Store Configuration
//!
//! Tuning knobs for the cleanup scheduler and scope resolution. Every field
//! has a default, so a partial JSON document (or none at all) is enough.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SignalError;

/// Configuration for a [`SignalStore`](crate::store::SignalStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Number of cells destroyed per batch in a cleanup pass.
    pub cleanup_chunk_size: usize,

    /// Pending scope count above which the pass is scheduled with a delay.
    /// Ten times this value is the cell count above which batches are
    /// separated by `throttle_delay_ms` instead of a bare yield.
    pub throttle_threshold: usize,

    /// Delay used when throttling, in milliseconds.
    pub throttle_delay_ms: u64,

    /// Upper bound handed to idle schedulers, in milliseconds.
    pub idle_timeout_ms: u64,

    /// Scope used when neither an override nor the resolver yields one.
    pub fallback_scope: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cleanup_chunk_size: 50,
            throttle_threshold: 5,
            throttle_delay_ms: 100,
            idle_timeout_ms: 1000,
            fallback_scope: "ssr".to_string(),
        }
    }
}

impl StoreConfig {
    /// Parse a configuration from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, SignalError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the scheduler cannot work with.
    pub fn validate(&self) -> Result<(), SignalError> {
        if self.cleanup_chunk_size == 0 {
            return Err(SignalError::InvalidConfig(
                "cleanup_chunk_size must be at least 1".to_string(),
            ));
        }
        if self.fallback_scope.is_empty() {
            return Err(SignalError::InvalidConfig(
                "fallback_scope must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn throttle_delay(&self) -> Duration {
        Duration::from_millis(self.throttle_delay_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Cell count above which batches are spaced by the throttle delay.
    pub fn burst_threshold(&self) -> usize {
        self.throttle_threshold.saturating_mul(10)
    }
}
