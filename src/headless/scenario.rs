//! Scenario files for the headless runner
//!
//! A scenario scripts one run of the service: how the simulated activity
//! answers permission prompts, the tracking config, and a list of timed
//! steps that either issue host commands or drive the simulated provider.
//!
//! ```toml
//! name = "three fixes"
//! initial_permission = "unknown"
//! permission_answer = "granted"
//!
//! [tracking]
//! interval_millis = 5000
//! fastest_interval_millis = 5000
//!
//! [[steps]]
//! action = "request_permission"
//!
//! [[steps]]
//! action = "start"
//!
//! [[steps]]
//! after_ms = 100
//! action = "fix"
//! latitude = 52.52
//! longitude = 13.40
//! timestamp_millis = 0
//! ```

use std::path::Path;

use serde::Deserialize;

use bgloc_core::prelude::*;
use bgloc_core::{LocationFix, PermissionState, TrackingConfig};
use bgloc_provider::{ProviderError, ProviderErrorKind};
use bgloc_service::PermissionOutcome;

/// How the scripted activity answers permission prompts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionAnswer {
    #[default]
    Granted,
    Denied,
    DeniedPermanently,
    /// Never answer; the request runs into its timeout
    Silent,
}

impl PermissionAnswer {
    pub fn outcome(&self) -> Option<PermissionOutcome> {
        match self {
            PermissionAnswer::Granted => Some(PermissionOutcome::Granted),
            PermissionAnswer::Denied => Some(PermissionOutcome::Denied),
            PermissionAnswer::DeniedPermanently => Some(PermissionOutcome::DeniedPermanently),
            PermissionAnswer::Silent => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,

    /// Permission state before the first prompt
    #[serde(default)]
    pub initial_permission: PermissionState,

    #[serde(default)]
    pub permission_answer: PermissionAnswer,

    /// Delay before the activity answers a prompt
    #[serde(default)]
    pub answer_delay_ms: u64,

    /// Config for `start`; the settings default is used when absent
    #[serde(default)]
    pub tracking: Option<TrackingConfig>,

    /// Quiet time after the last step before the run is wrapped up
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_settle_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Wait this long after the previous step
    #[serde(default)]
    pub after_ms: u64,

    #[serde(flatten)]
    pub action: StepAction,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
    // Host commands
    RequestPermission,
    Start,
    Pause,
    Resume,
    Stop,

    // Lifecycle
    AttachActivity,
    DetachActivity,
    RevokePermission,
    DetachEngine,

    // Simulated provider
    Fix {
        latitude: f64,
        longitude: f64,
        timestamp_millis: u64,
        #[serde(default)]
        accuracy_meters: Option<f64>,
    },
    ProviderError {
        kind: ProviderErrorKind,
        #[serde(default)]
        message: String,
    },
    SetProviderAvailable {
        available: bool,
    },
}

impl StepAction {
    pub fn name(&self) -> &'static str {
        match self {
            StepAction::RequestPermission => "request_permission",
            StepAction::Start => "start",
            StepAction::Pause => "pause",
            StepAction::Resume => "resume",
            StepAction::Stop => "stop",
            StepAction::AttachActivity => "attach_activity",
            StepAction::DetachActivity => "detach_activity",
            StepAction::RevokePermission => "revoke_permission",
            StepAction::DetachEngine => "detach_engine",
            StepAction::Fix { .. } => "fix",
            StepAction::ProviderError { .. } => "provider_error",
            StepAction::SetProviderAvailable { .. } => "set_provider_available",
        }
    }

    /// Fix to push, for `fix` steps
    pub fn to_fix(&self) -> Option<LocationFix> {
        match self {
            StepAction::Fix {
                latitude,
                longitude,
                timestamp_millis,
                accuracy_meters,
            } => {
                let fix = LocationFix::new(*latitude, *longitude, *timestamp_millis);
                Some(match accuracy_meters {
                    Some(meters) => fix.with_accuracy(*meters),
                    None => fix,
                })
            }
            _ => None,
        }
    }

    /// Error to push, for `provider_error` steps
    pub fn to_provider_error(&self) -> Option<ProviderError> {
        match self {
            StepAction::ProviderError { kind, message } => {
                Some(ProviderError::new(*kind, message.clone()))
            }
            _ => None,
        }
    }
}

impl Scenario {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("Invalid scenario: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        let scenario = Self::parse(&content)?;
        if let Some(config) = &scenario.tracking {
            config.validate()?;
        }
        Ok(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgloc_core::AccuracyMode;

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::parse(
            r#"
name = "walk"
initial_permission = "granted"
permission_answer = "denied"

[tracking]
interval_millis = 5000
fastest_interval_millis = 5000
accuracy_mode = "balanced"

[[steps]]
action = "start"

[[steps]]
after_ms = 250
action = "fix"
latitude = 1.5
longitude = 2.5
timestamp_millis = 1000
accuracy_meters = 4.0

[[steps]]
action = "provider_error"
kind = "signal_lost"

[[steps]]
action = "set_provider_available"
available = false
"#,
        )
        .unwrap();

        assert_eq!(scenario.name, "walk");
        assert_eq!(scenario.initial_permission, PermissionState::Granted);
        assert_eq!(scenario.permission_answer, PermissionAnswer::Denied);
        assert_eq!(
            scenario.tracking.as_ref().unwrap().accuracy_mode,
            AccuracyMode::Balanced
        );
        assert_eq!(scenario.settle_ms, 100);
        assert_eq!(scenario.steps.len(), 4);

        assert_eq!(scenario.steps[0].action, StepAction::Start);
        assert_eq!(scenario.steps[0].after_ms, 0);

        let fix = scenario.steps[1].action.to_fix().unwrap();
        assert_eq!(scenario.steps[1].after_ms, 250);
        assert_eq!(fix.timestamp_millis, 1000);
        assert_eq!(fix.accuracy_meters, Some(4.0));

        let error = scenario.steps[2].action.to_provider_error().unwrap();
        assert!(error.is_transient());

        assert_eq!(
            scenario.steps[3].action,
            StepAction::SetProviderAvailable { available: false }
        );
    }

    #[test]
    fn test_parse_defaults() {
        let scenario = Scenario::parse("").unwrap();
        assert_eq!(scenario.initial_permission, PermissionState::Unknown);
        assert_eq!(scenario.permission_answer, PermissionAnswer::Granted);
        assert!(scenario.tracking.is_none());
        assert!(scenario.steps.is_empty());
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = Scenario::parse("[[steps]]\naction = \"teleport\"\n").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_load_rejects_invalid_tracking_config() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("scenario.toml");
        std::fs::write(
            &path,
            "[tracking]\ninterval_millis = 1000\nfastest_interval_millis = 2000\n",
        )
        .unwrap();

        let err = Scenario::load(&path).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidConfig));
    }

    #[test]
    fn test_silent_answer_has_no_outcome() {
        assert_eq!(PermissionAnswer::Silent.outcome(), None);
        assert_eq!(
            PermissionAnswer::Granted.outcome(),
            Some(PermissionOutcome::Granted)
        );
    }
}
