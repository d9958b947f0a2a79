//! Location provider seam
//!
//! A provider is the platform source of fixes (GPS, network, fused). The
//! service talks to it through [`LocationProvider`]: one `subscribe` per
//! subscription generation, one `unsubscribe` to release it. Fixes and
//! mid-subscription errors flow back over an `mpsc` sink as
//! [`ProviderUpdate`]s tagged with the generation they belong to, so the
//! service can discard anything from a subscription it has already dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use bgloc_core::{AccuracyMode, ErrorKind, LocationFix, TrackingConfig};

/// Global subscription generation counter
static GENERATION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique subscription generation.
///
/// Generations only grow, so an update tagged with anything other than the
/// session's current generation is stale, even across sessions.
pub fn next_generation() -> u64 {
    GENERATION_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// What the service asks the provider for
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub interval: Duration,
    pub fastest_interval: Duration,
    pub distance_filter_meters: f64,
    pub accuracy: AccuracyMode,
}

impl From<&TrackingConfig> for ProviderRequest {
    fn from(config: &TrackingConfig) -> Self {
        Self {
            interval: Duration::from_millis(u64::from(config.interval_millis)),
            fastest_interval: Duration::from_millis(u64::from(config.fastest_interval_millis)),
            distance_filter_meters: config.distance_filter_meters,
            accuracy: config.accuracy_mode,
        }
    }
}

/// Classified provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Brief loss of signal; the provider may recover on its own
    SignalLost,
    /// The provider did not answer in time
    Timeout,
    /// Location services are switched off
    Disabled,
    /// The OS withdrew location permission
    PermissionRevoked,
    /// The provider refused the requested configuration
    Rejected,
}

/// Error reported by a provider, either from `subscribe` or mid-subscription
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn signal_lost(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::SignalLost, message)
    }

    pub fn disabled(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Disabled, message)
    }

    pub fn permission_revoked() -> Self {
        Self::new(
            ProviderErrorKind::PermissionRevoked,
            "location permission revoked",
        )
    }

    /// Transient errors are retried by resubscribing; everything else ends the session
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::SignalLost | ProviderErrorKind::Timeout
        )
    }

    /// Host-facing kind reported when this error is surfaced
    pub fn error_kind(&self) -> ErrorKind {
        match self.kind {
            ProviderErrorKind::SignalLost | ProviderErrorKind::Timeout => {
                ErrorKind::TransientProviderError
            }
            ProviderErrorKind::PermissionRevoked => ErrorKind::PermissionRevoked,
            ProviderErrorKind::Disabled | ProviderErrorKind::Rejected => {
                ErrorKind::ProviderUnavailable
            }
        }
    }
}

impl From<ProviderError> for bgloc_core::Error {
    fn from(err: ProviderError) -> Self {
        match err.kind {
            ProviderErrorKind::SignalLost | ProviderErrorKind::Timeout => {
                bgloc_core::Error::transient_provider(err.message)
            }
            ProviderErrorKind::PermissionRevoked => bgloc_core::Error::PermissionRevoked,
            ProviderErrorKind::Disabled | ProviderErrorKind::Rejected => {
                bgloc_core::Error::provider_unavailable(err.message)
            }
        }
    }
}

/// Something the provider reports for a live subscription
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    Fix(LocationFix),
    Error(ProviderError),
}

/// A [`ProviderEvent`] tagged with the subscription generation it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderUpdate {
    pub generation: u64,
    pub event: ProviderEvent,
}

impl ProviderUpdate {
    pub fn fix(generation: u64, fix: LocationFix) -> Self {
        Self {
            generation,
            event: ProviderEvent::Fix(fix),
        }
    }

    pub fn error(generation: u64, error: ProviderError) -> Self {
        Self {
            generation,
            event: ProviderEvent::Error(error),
        }
    }
}

/// Sink a provider pushes updates into
pub type UpdateSink = mpsc::Sender<ProviderUpdate>;

/// Platform location source
///
/// `subscribe` resolves once the provider has acknowledged (or rejected) the
/// request; interval filtering is the provider's job. After `unsubscribe`
/// returns, the provider must not push further updates for that generation,
/// though the service tolerates stragglers.
#[trait_variant::make(LocationProvider: Send)]
pub trait LocalLocationProvider {
    /// Start delivering updates for `generation` into `sink`
    async fn subscribe(
        &self,
        generation: u64,
        request: ProviderRequest,
        sink: UpdateSink,
    ) -> Result<(), ProviderError>;

    /// Stop delivering updates for `generation`. Unknown generations are ignored.
    async fn unsubscribe(&self, generation: u64);
}
