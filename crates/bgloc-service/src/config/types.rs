//! Configuration types for the location service
//!
//! Defines:
//! - `Settings` - Service settings (`config.toml`)
//! - Related sub-sections for retry, permission and event delivery

use std::time::Duration;

use serde::{Deserialize, Serialize};

use bgloc_core::TrackingConfig;
use bgloc_provider::BackoffPolicy;

/// Service settings (config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub permission: PermissionSettings,

    #[serde(default)]
    pub events: EventSettings,

    /// Config used when the host starts tracking without its own
    #[serde(default)]
    pub tracking: TrackingConfig,
}

/// Resubscription backoff for transient provider errors
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrySettings {
    /// First retry delay in milliseconds
    #[serde(default = "default_retry_base_ms")]
    pub base_ms: u64,

    /// Retry delay cap in milliseconds
    #[serde(default = "default_retry_max_ms")]
    pub max_ms: u64,

    /// Jitter as a fraction of the delay (0.2 = ±20%)
    #[serde(default = "default_retry_jitter")]
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            base_ms: default_retry_base_ms(),
            max_ms: default_retry_max_ms(),
            jitter: default_retry_jitter(),
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.base_ms),
            Duration::from_millis(self.max_ms.max(self.base_ms)),
            self.jitter,
        )
    }
}

fn default_retry_base_ms() -> u64 {
    1_000
}

fn default_retry_max_ms() -> u64 {
    60_000
}

fn default_retry_jitter() -> f64 {
    0.2
}

/// Permission prompt settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PermissionSettings {
    /// How long to wait for the platform to answer a permission prompt
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for PermissionSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl PermissionSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

/// Event delivery settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventSettings {
    /// Buffer between the service and the host listener; events beyond it are dropped
    #[serde(default = "default_listener_capacity")]
    pub listener_capacity: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            listener_capacity: default_listener_capacity(),
        }
    }
}

fn default_listener_capacity() -> usize {
    64
}
