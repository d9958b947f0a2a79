//! Events delivered from the location service to the host

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::types::{LocationFix, SessionState};

/// Outbound event for the host application.
///
/// Each variant maps onto one host callback (`onLocationUpdate`,
/// `onSessionStateChanged`, `onError`). Events are fire-and-forget: they are
/// delivered at most once to the listener attached at emit time.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A fix accepted by a running session
    LocationUpdate(LocationFix),

    /// The session moved to a new state
    StateChanged(SessionState),

    /// An asynchronous failure discovered after a command was accepted
    Error(ErrorKind),
}

impl SessionEvent {
    /// Returns a short string label for this event type (for logging/debugging).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::LocationUpdate(_) => "location_update",
            Self::StateChanged(_) => "state_changed",
            Self::Error(_) => "error",
        }
    }

    /// Name of the host-side callback this event is dispatched to
    pub fn host_method(&self) -> &'static str {
        match self {
            Self::LocationUpdate(_) => "onLocationUpdate",
            Self::StateChanged(_) => "onSessionStateChanged",
            Self::Error(_) => "onError",
        }
    }

    pub fn as_fix(&self) -> Option<&LocationFix> {
        match self {
            Self::LocationUpdate(fix) => Some(fix),
            _ => None,
        }
    }

    pub fn as_state(&self) -> Option<SessionState> {
        match self {
            Self::StateChanged(state) => Some(*state),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_event_type_labels() {
        let event = SessionEvent::StateChanged(SessionState::Running);
        assert_eq!(event.event_type(), "state_changed");
        assert_eq!(event.host_method(), "onSessionStateChanged");

        let event = SessionEvent::Error(ErrorKind::ProviderUnavailable);
        assert_eq!(event.event_type(), "error");
        assert_eq!(event.host_method(), "onError");

        let event = SessionEvent::LocationUpdate(LocationFix::new(1.0, 2.0, 3));
        assert_eq!(event.event_type(), "location_update");
        assert_eq!(event.host_method(), "onLocationUpdate");
    }

    #[test]
    fn test_session_event_accessors() {
        let fix = LocationFix::new(1.0, 2.0, 3);
        let event = SessionEvent::LocationUpdate(fix.clone());
        assert_eq!(event.as_fix(), Some(&fix));
        assert_eq!(event.as_state(), None);

        let event = SessionEvent::StateChanged(SessionState::Paused);
        assert_eq!(event.as_state(), Some(SessionState::Paused));
        assert!(event.as_fix().is_none());
    }

    #[test]
    fn test_session_event_json_shape() {
        let event = SessionEvent::Error(ErrorKind::PermissionRevoked);
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"event":"error","data":"permission_revoked"}"#);

        let event = SessionEvent::StateChanged(SessionState::Stopped);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "state_changed");
        assert_eq!(value["data"]["state"], "stopped");
    }
}
