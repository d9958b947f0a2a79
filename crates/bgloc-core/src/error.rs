//! Service error types with rich context

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{PermissionState, SessionState};

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Host-facing error taxonomy.
///
/// This is the payload of [`crate::SessionEvent::Error`] and the reason carried by
/// [`SessionState::Failed`]. It is deliberately data-free so the host can match on
/// it without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    /// Permission was withdrawn while a session was live
    PermissionRevoked,
    PermissionTimeout,
    NoActivityAttached,
    NoEngineAttached,
    AlreadyRunning,
    InvalidTransition,
    ProviderUnavailable,
    /// Retried internally, never the reason of a failed session
    TransientProviderError,
    InvalidConfig,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::PermissionRevoked => "permission revoked",
            ErrorKind::PermissionTimeout => "permission request timed out",
            ErrorKind::NoActivityAttached => "no activity attached",
            ErrorKind::NoEngineAttached => "no engine attached",
            ErrorKind::AlreadyRunning => "already running",
            ErrorKind::InvalidTransition => "invalid transition",
            ErrorKind::ProviderUnavailable => "provider unavailable",
            ErrorKind::TransientProviderError => "transient provider error",
            ErrorKind::InvalidConfig => "invalid config",
        };
        f.write_str(label)
    }
}

/// Service error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Permission Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Location permission not granted (current state: {state})")]
    PermissionDenied { state: PermissionState },

    #[error("Location permission revoked while tracking")]
    PermissionRevoked,

    #[error("Permission request #{token} was not answered within {timeout_ms}ms")]
    PermissionTimeout { token: u64, timeout_ms: u64 },

    #[error("Permission request was cancelled")]
    PermissionCancelled,

    #[error("No activity attached; cannot show the permission prompt")]
    NoActivityAttached,

    // ─────────────────────────────────────────────────────────────
    // Lifecycle Errors
    // ─────────────────────────────────────────────────────────────
    #[error("No engine attached to the location service")]
    NoEngineAttached,

    #[error("A tracking session is already active (state: {state})")]
    AlreadyRunning { state: SessionState },

    #[error("Cannot {action} while session is {from}")]
    InvalidTransition {
        from: SessionState,
        action: &'static str,
    },

    // ─────────────────────────────────────────────────────────────
    // Provider Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Location provider unavailable: {message}")]
    ProviderUnavailable { message: String },

    #[error("Transient location provider error: {message}")]
    TransientProvider { message: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid tracking configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ─────────────────────────────────────────────────────────────
    // Channel/Communication Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Channel send error: {message}")]
    ChannelSend { message: String },

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn provider_unavailable(message: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            message: message.into(),
        }
    }

    pub fn transient_provider(message: impl Into<String>) -> Self {
        Self::TransientProvider {
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn channel_send(message: impl Into<String>) -> Self {
        Self::ChannelSend {
            message: message.into(),
        }
    }

    pub fn invalid_transition(from: SessionState, action: &'static str) -> Self {
        Self::InvalidTransition { from, action }
    }

    /// Host-facing kind of this error, if it belongs to the tracking taxonomy.
    ///
    /// Infrastructure errors (IO, JSON, channels, settings) have no kind; they
    /// never reach the host as an event.
    pub fn kind(&self) -> Option<ErrorKind> {
        let kind = match self {
            Error::PermissionDenied { .. } | Error::PermissionCancelled => {
                ErrorKind::PermissionDenied
            }
            Error::PermissionRevoked => ErrorKind::PermissionRevoked,
            Error::PermissionTimeout { .. } => ErrorKind::PermissionTimeout,
            Error::NoActivityAttached => ErrorKind::NoActivityAttached,
            Error::NoEngineAttached => ErrorKind::NoEngineAttached,
            Error::AlreadyRunning { .. } => ErrorKind::AlreadyRunning,
            Error::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Error::ProviderUnavailable { .. } => ErrorKind::ProviderUnavailable,
            Error::TransientProvider { .. } => ErrorKind::TransientProviderError,
            Error::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            Error::Io(_)
            | Error::Json(_)
            | Error::Config { .. }
            | Error::ChannelSend { .. }
            | Error::ChannelClosed => return None,
        };
        Some(kind)
    }

    /// Check if this is a recoverable error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::TransientProvider { .. }
                | Error::PermissionTimeout { .. }
                | Error::PermissionCancelled
                | Error::AlreadyRunning { .. }
                | Error::InvalidTransition { .. }
                | Error::ChannelSend { .. }
        )
    }

    /// Check if this error should tear down the service
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ChannelClosed)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions (for use with color-eyre)
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = Error::provider_unavailable("location services disabled");
        assert_eq!(
            err.to_string(),
            "Location provider unavailable: location services disabled"
        );

        let err = Error::AlreadyRunning {
            state: SessionState::Running,
        };
        assert!(err.to_string().contains("running"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.kind(), None);
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            Error::PermissionDenied {
                state: PermissionState::DeniedOnce
            }
            .kind(),
            Some(ErrorKind::PermissionDenied)
        );
        assert_eq!(
            Error::NoActivityAttached.kind(),
            Some(ErrorKind::NoActivityAttached)
        );
        assert_eq!(
            Error::transient_provider("signal lost").kind(),
            Some(ErrorKind::TransientProviderError)
        );
        assert_eq!(
            Error::invalid_config("bad interval").kind(),
            Some(ErrorKind::InvalidConfig)
        );
        assert_eq!(Error::ChannelClosed.kind(), None);
    }

    #[test]
    fn test_error_is_recoverable() {
        assert!(Error::transient_provider("gps").is_recoverable());
        assert!(Error::invalid_transition(SessionState::Idle, "pause").is_recoverable());
        assert!(!Error::provider_unavailable("disabled").is_recoverable());
        assert!(!Error::PermissionRevoked.is_recoverable());
    }

    #[test]
    fn test_error_is_fatal() {
        assert!(Error::ChannelClosed.is_fatal());
        assert!(!Error::NoEngineAttached.is_fatal());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = Error::invalid_transition(SessionState::Paused, "pause");
        assert_eq!(err.to_string(), "Cannot pause while session is paused");
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ProviderUnavailable).unwrap();
        assert_eq!(json, "\"provider_unavailable\"");
    }
}
