//! # bgloc-provider - Location Provider Seam
//!
//! The boundary between the tracking service and the platform's location
//! source.
//!
//! Depends on [`bgloc_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Provider Contract
//! - [`LocationProvider`] - Async subscribe/unsubscribe contract (Send futures)
//! - [`ProviderRequest`] - Interval, distance filter and accuracy derived from a config
//! - [`ProviderUpdate`] - A fix or error tagged with its subscription generation
//! - [`ProviderError`] - Classified provider failure (transient vs permanent)
//! - [`next_generation()`] - Allocate a process-unique subscription generation
//!
//! ### Retry
//! - [`BackoffPolicy`] - Exponential backoff with jitter for resubscription
//!
//! ### Simulation
//! - [`SimulatedProvider`] - Scriptable in-process provider

pub mod backoff;
pub mod provider;
pub mod simulated;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

// Public API re-exports
pub use backoff::BackoffPolicy;
pub use provider::{
    next_generation, LocalLocationProvider, LocationProvider, ProviderError, ProviderErrorKind,
    ProviderEvent, ProviderRequest, ProviderUpdate, UpdateSink,
};
pub use simulated::SimulatedProvider;
