//! # bgloc-core - Core Domain Types
//!
//! Foundation crate for background location tracking. Provides the domain
//! types shared by the provider seam and the service, the error type, the
//! host-facing event model and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, chrono, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`TrackingConfig`] - Interval, distance filter, accuracy and notification text
//! - [`AccuracyMode`] - Requested provider accuracy (High, Balanced, Low, Passive)
//! - [`LocationFix`] - A single reported position with metadata
//! - [`PermissionState`] - Cached location permission state
//! - [`SessionState`] - Lifecycle state of a tracking session
//! - [`HostHandle`] - Opaque handle to a host-owned resource
//!
//! ### Events (`events`)
//! - [`SessionEvent`] - Location updates, state changes and errors sent to the host
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`ErrorKind`] - Host-facing error taxonomy carried by events
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use bgloc_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;
pub mod prelude;
pub mod types;

// Re-export commonly used types at crate root for convenience
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use events::SessionEvent;
pub use types::{
    AccuracyMode, HostHandle, LocationFix, PermissionState, SessionState, TrackingConfig,
};
