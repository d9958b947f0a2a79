//! Headless mode - scripted scenarios with JSON event output
//!
//! Runs the location service against a simulated provider and activity,
//! driven by a [`Scenario`] file, and writes what the host would observe as
//! structured JSON events.
//!
//! # Event Format
//!
//! Events are output as NDJSON (newline-delimited JSON), one event per line.
//! Each event has an "event" field indicating its type, along with event-specific data.
//!
//! # Example Output
//!
//! ```json
//! {"event":"scenario_started","name":"walk","steps":4,"timestamp":1704700001000}
//! {"event":"state_changed","state":"running","timestamp":1704700001002}
//! {"event":"location_update","fix":{"latitude":52.52,"longitude":13.4,"timestampMillis":0},"timestamp":1704700001010}
//! ```

pub mod runner;
pub mod scenario;

pub use runner::run_scenario;
pub use scenario::{PermissionAnswer, Scenario, Step, StepAction};

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

use bgloc_core::{ErrorKind, LocationFix, PermissionState, SessionEvent, SessionState};
use bgloc_service::ServiceStatus;

/// Events emitted in headless mode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    ScenarioStarted {
        name: String,
        steps: usize,
        timestamp: i64,
    },

    /// Fix forwarded to the host
    LocationUpdate {
        fix: LocationFix,
        /// Provider timestamp as RFC 3339, when representable
        #[serde(skip_serializing_if = "Option::is_none")]
        recorded_at: Option<DateTime<Utc>>,
        timestamp: i64,
    },

    /// Session state transition
    StateChanged {
        #[serde(flatten)]
        state: SessionState,
        timestamp: i64,
    },

    /// Asynchronous failure reported to the host
    Error { kind: ErrorKind, timestamp: i64 },

    /// A permission request resolved
    PermissionResolved {
        state: PermissionState,
        timestamp: i64,
    },

    /// A scripted host command was rejected
    CommandFailed {
        step: usize,
        action: String,
        kind: Option<ErrorKind>,
        message: String,
        timestamp: i64,
    },

    ScenarioCompleted {
        status: ServiceStatus,
        timestamp: i64,
    },
}

impl HeadlessEvent {
    /// Write this event to `out` as one JSON line
    pub fn emit<W: Write>(&self, out: &mut W) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        if let Err(e) = writeln!(out, "{}", json) {
            error!("Failed to write headless event: {}", e);
            return;
        }

        // Flush to ensure immediate output
        if let Err(e) = out.flush() {
            error!("Failed to flush headless output: {}", e);
        }
    }

    /// Get current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    // ─────────────────────────────────────────────────────────
    // Convenience constructors
    // ─────────────────────────────────────────────────────────

    pub fn scenario_started(name: &str, steps: usize) -> Self {
        Self::ScenarioStarted {
            name: name.to_string(),
            steps,
            timestamp: Self::now(),
        }
    }

    pub fn permission_resolved(state: PermissionState) -> Self {
        Self::PermissionResolved {
            state,
            timestamp: Self::now(),
        }
    }

    pub fn command_failed(step: usize, action: &str, error: &bgloc_core::Error) -> Self {
        Self::CommandFailed {
            step,
            action: action.to_string(),
            kind: error.kind(),
            message: error.to_string(),
            timestamp: Self::now(),
        }
    }

    pub fn scenario_completed(status: ServiceStatus) -> Self {
        Self::ScenarioCompleted {
            status,
            timestamp: Self::now(),
        }
    }
}

impl From<SessionEvent> for HeadlessEvent {
    fn from(event: SessionEvent) -> Self {
        let timestamp = Self::now();
        match event {
            SessionEvent::LocationUpdate(fix) => Self::LocationUpdate {
                recorded_at: fix.recorded_at(),
                fix,
                timestamp,
            },
            SessionEvent::StateChanged(state) => Self::StateChanged { state, timestamp },
            SessionEvent::Error(kind) => Self::Error { kind, timestamp },
        }
    }
}
