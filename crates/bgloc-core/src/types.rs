//! Core domain types for background location tracking

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result};

// ─────────────────────────────────────────────────────────
// Tracking configuration
// ─────────────────────────────────────────────────────────

/// Accuracy requested from the location provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccuracyMode {
    #[default]
    High,
    Balanced,
    Low,
    Passive,
}

impl std::fmt::Display for AccuracyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccuracyMode::High => write!(f, "high"),
            AccuracyMode::Balanced => write!(f, "balanced"),
            AccuracyMode::Low => write!(f, "low"),
            AccuracyMode::Passive => write!(f, "passive"),
        }
    }
}

/// Configuration of one tracking session.
///
/// Immutable once a session starts: replacing it means stopping the session
/// and starting a new one.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(from = "TrackingConfigFile")]
pub struct TrackingConfig {
    /// Desired interval between fixes
    pub interval_millis: u32,

    /// Fastest rate the host is willing to accept fixes at
    pub fastest_interval_millis: u32,

    /// Minimum movement before the provider reports a new fix
    pub distance_filter_meters: f64,

    pub accuracy_mode: AccuracyMode,

    /// Foreground-service notification title
    pub notification_title: String,

    /// Foreground-service notification body
    pub notification_text: String,
}

/// Serialized form of [`TrackingConfig`].
///
/// A missing `fastest_interval_millis` follows `interval_millis`.
#[derive(Deserialize)]
struct TrackingConfigFile {
    #[serde(default = "default_interval_millis")]
    interval_millis: u32,

    #[serde(default)]
    fastest_interval_millis: Option<u32>,

    #[serde(default)]
    distance_filter_meters: f64,

    #[serde(default)]
    accuracy_mode: AccuracyMode,

    #[serde(default = "default_notification_title")]
    notification_title: String,

    #[serde(default = "default_notification_text")]
    notification_text: String,
}

impl From<TrackingConfigFile> for TrackingConfig {
    fn from(file: TrackingConfigFile) -> Self {
        Self {
            interval_millis: file.interval_millis,
            fastest_interval_millis: file.fastest_interval_millis.unwrap_or(file.interval_millis),
            distance_filter_meters: file.distance_filter_meters,
            accuracy_mode: file.accuracy_mode,
            notification_title: file.notification_title,
            notification_text: file.notification_text,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            interval_millis: default_interval_millis(),
            fastest_interval_millis: default_interval_millis(),
            distance_filter_meters: 0.0,
            accuracy_mode: AccuracyMode::default(),
            notification_title: default_notification_title(),
            notification_text: default_notification_text(),
        }
    }
}

fn default_interval_millis() -> u32 {
    1000
}

fn default_notification_title() -> String {
    "Background location".to_string()
}

fn default_notification_text() -> String {
    "Tracking location in background".to_string()
}

impl TrackingConfig {
    pub fn with_interval(mut self, interval_millis: u32, fastest_interval_millis: u32) -> Self {
        self.interval_millis = interval_millis;
        self.fastest_interval_millis = fastest_interval_millis;
        self
    }

    pub fn with_distance_filter(mut self, meters: f64) -> Self {
        self.distance_filter_meters = meters;
        self
    }

    pub fn with_accuracy(mut self, accuracy_mode: AccuracyMode) -> Self {
        self.accuracy_mode = accuracy_mode;
        self
    }

    pub fn with_notification(mut self, title: impl Into<String>, text: impl Into<String>) -> Self {
        self.notification_title = title.into();
        self.notification_text = text.into();
        self
    }

    /// Check the configuration constraints.
    ///
    /// Runs before any session state transition so a rejected config leaves the
    /// session untouched.
    pub fn validate(&self) -> Result<()> {
        if self.interval_millis == 0 {
            return Err(Error::invalid_config("interval_millis must be positive"));
        }
        if self.fastest_interval_millis > self.interval_millis {
            return Err(Error::invalid_config(format!(
                "fastest_interval_millis ({}) exceeds interval_millis ({})",
                self.fastest_interval_millis, self.interval_millis
            )));
        }
        if !self.distance_filter_meters.is_finite() || self.distance_filter_meters < 0.0 {
            return Err(Error::invalid_config(format!(
                "distance_filter_meters must be a non-negative number, got {}",
                self.distance_filter_meters
            )));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────
// Location fixes
// ─────────────────────────────────────────────────────────

/// A single reported position
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude_meters: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_meters: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_mps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearing_degrees: Option<f64>,
    /// Milliseconds since the Unix epoch, as reported by the provider
    pub timestamp_millis: u64,
}

impl LocationFix {
    pub fn new(latitude: f64, longitude: f64, timestamp_millis: u64) -> Self {
        Self {
            latitude,
            longitude,
            altitude_meters: None,
            accuracy_meters: None,
            speed_mps: None,
            bearing_degrees: None,
            timestamp_millis,
        }
    }

    pub fn with_altitude(mut self, meters: f64) -> Self {
        self.altitude_meters = Some(meters);
        self
    }

    pub fn with_accuracy(mut self, meters: f64) -> Self {
        self.accuracy_meters = Some(meters);
        self
    }

    pub fn with_motion(mut self, speed_mps: f64, bearing_degrees: f64) -> Self {
        self.speed_mps = Some(speed_mps);
        self.bearing_degrees = Some(bearing_degrees);
        self
    }

    /// Provider timestamp as a UTC datetime, if representable
    pub fn recorded_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        i64::try_from(self.timestamp_millis)
            .ok()
            .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
    }
}

// ─────────────────────────────────────────────────────────
// Permission state
// ─────────────────────────────────────────────────────────

/// Cached location permission state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    #[default]
    Unknown,
    Granted,
    DeniedOnce,
    DeniedPermanently,
}

impl PermissionState {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionState::Granted)
    }
}

impl std::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionState::Unknown => write!(f, "unknown"),
            PermissionState::Granted => write!(f, "granted"),
            PermissionState::DeniedOnce => write!(f, "denied once"),
            PermissionState::DeniedPermanently => write!(f, "denied permanently"),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Session state
// ─────────────────────────────────────────────────────────

/// Lifecycle state of a tracking session
///
/// ```text
/// Idle -> Starting -> Running <-> Paused -> Stopped
///            |           |          |
///            +-----------+----------+---> Failed(reason)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Running,
    Paused,
    Stopped,
    Failed(ErrorKind),
}

impl SessionState {
    /// `Stopped` and `Failed` end a session
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Failed(_))
    }

    /// Whether the session holds (or is acquiring) a provider subscription
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Starting | SessionState::Running)
    }

    /// Whether a fresh `start()` is allowed from this state
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            SessionState::Idle | SessionState::Stopped | SessionState::Failed(_)
        )
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Idle | Stopped | Failed(_), Starting) => true,
            (Starting, Running) => true,
            (Running, Paused) | (Paused, Running) => true,
            (Starting | Running | Paused, Stopped) => true,
            (Starting | Running | Paused, Failed(_)) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Starting => write!(f, "starting"),
            SessionState::Running => write!(f, "running"),
            SessionState::Paused => write!(f, "paused"),
            SessionState::Stopped => write!(f, "stopped"),
            SessionState::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Host handles
// ─────────────────────────────────────────────────────────

/// Opaque handle to a host-owned resource (messenger, application context).
///
/// The service never dereferences these; it only hands them back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct HostHandle(pub u64);

impl std::fmt::Display for HostHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "host#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracking_config_defaults() {
        let config = TrackingConfig::default();
        assert_eq!(config.interval_millis, 1000);
        assert_eq!(config.fastest_interval_millis, 1000);
        assert_eq!(config.accuracy_mode, AccuracyMode::High);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tracking_config_rejects_fastest_above_interval() {
        let config = TrackingConfig::default().with_interval(1000, 2000);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
        assert!(err.to_string().contains("fastest_interval_millis"));
    }

    #[test]
    fn test_tracking_config_rejects_negative_distance() {
        let config = TrackingConfig::default().with_distance_filter(-1.0);
        assert!(config.validate().is_err());

        let config = TrackingConfig::default().with_distance_filter(f64::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tracking_config_rejects_zero_interval() {
        let config = TrackingConfig::default().with_interval(0, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tracking_config_equal_intervals_are_valid() {
        let config = TrackingConfig::default()
            .with_interval(5000, 5000)
            .with_distance_filter(0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tracking_config_deserialize_partial() {
        let json = r#"{"interval_millis": 5000, "accuracy_mode": "balanced"}"#;
        let config: TrackingConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.interval_millis, 5000);
        assert_eq!(config.fastest_interval_millis, 5000);
        assert_eq!(config.accuracy_mode, AccuracyMode::Balanced);
        assert_eq!(config.notification_title, "Background location");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tracking_config_missing_fastest_follows_interval() {
        let config: TrackingConfig = serde_json::from_str(r#"{"interval_millis": 500}"#).unwrap();
        assert_eq!(config.fastest_interval_millis, 500);
        assert!(config.validate().is_ok());

        let config: TrackingConfig = serde_json::from_str(
            r#"{"interval_millis": 5000, "fastest_interval_millis": 2000}"#,
        )
        .unwrap();
        assert_eq!(config.fastest_interval_millis, 2000);

        let config: TrackingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, TrackingConfig::default());
    }

    #[test]
    fn test_tracking_config_serialize_roundtrip_keeps_fastest() {
        let config = TrackingConfig::default().with_interval(5000, 1000);
        let json = serde_json::to_string(&config).unwrap();
        let back: TrackingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_location_fix_serializes_camel_case() {
        let fix = LocationFix::new(52.52, 13.405, 1_700_000_000_000).with_accuracy(4.5);
        let json = serde_json::to_value(&fix).unwrap();
        assert_eq!(json["accuracyMeters"], 4.5);
        assert_eq!(json["timestampMillis"], 1_700_000_000_000u64);
        assert!(json.get("speedMps").is_none());
    }

    #[test]
    fn test_location_fix_recorded_at() {
        let fix = LocationFix::new(0.0, 0.0, 1_000);
        let at = fix.recorded_at().unwrap();
        assert_eq!(at.timestamp_millis(), 1_000);
    }

    #[test]
    fn test_permission_state_helpers() {
        assert!(PermissionState::Granted.is_granted());
        assert!(!PermissionState::DeniedOnce.is_granted());
        assert!(!PermissionState::Unknown.is_granted());
    }

    #[test]
    fn test_session_state_transitions() {
        use SessionState::*;
        assert!(Idle.can_transition_to(&Starting));
        assert!(Starting.can_transition_to(&Running));
        assert!(Running.can_transition_to(&Paused));
        assert!(Paused.can_transition_to(&Running));
        assert!(Paused.can_transition_to(&Stopped));
        assert!(Starting.can_transition_to(&Failed(ErrorKind::ProviderUnavailable)));
        assert!(Stopped.can_transition_to(&Starting));

        assert!(!Idle.can_transition_to(&Running));
        assert!(!Idle.can_transition_to(&Paused));
        assert!(!Starting.can_transition_to(&Paused));
        assert!(!Stopped.can_transition_to(&Stopped));
        assert!(!Failed(ErrorKind::ProviderUnavailable).can_transition_to(&Running));
    }

    #[test]
    fn test_session_state_terminal() {
        assert!(SessionState::Stopped.is_terminal());
        assert!(SessionState::Failed(ErrorKind::PermissionRevoked).is_terminal());
        assert!(!SessionState::Paused.is_terminal());
        assert!(!SessionState::Idle.is_terminal());
    }

    #[test]
    fn test_session_state_serialization() {
        let json = serde_json::to_string(&SessionState::Running).unwrap();
        assert_eq!(json, r#"{"state":"running"}"#);

        let json =
            serde_json::to_string(&SessionState::Failed(ErrorKind::ProviderUnavailable)).unwrap();
        assert_eq!(json, r#"{"state":"failed","reason":"provider_unavailable"}"#);
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(
            SessionState::Failed(ErrorKind::ProviderUnavailable).to_string(),
            "failed (provider unavailable)"
        );
    }
}
