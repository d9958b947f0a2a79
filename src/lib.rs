//! Background Location
//!
//! Platform-independent core of a background location tracking plugin, plus
//! a headless runner that plays scripted scenarios against it.
//!
//! The service itself lives in the workspace crates:
//! - [`bgloc_core`] - domain types, errors, logging
//! - [`bgloc_provider`] - location provider seam and simulated provider
//! - [`bgloc_service`] - session, permission gate, events and the engine

pub mod headless;

// Re-export main entry points
pub use headless::{run_scenario, PermissionAnswer, Scenario, Step, StepAction};
