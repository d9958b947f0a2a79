//! Message types for the service loop (TEA pattern)

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use bgloc_core::prelude::*;
use bgloc_core::{PermissionState, SessionEvent, TrackingConfig};
use bgloc_provider::{ProviderError, ProviderUpdate};

use crate::permission::{PermissionOutcome, PermissionPrompt, PermissionToken};
use crate::registry::{HostBinding, ServiceStatus};

/// Answer channel for a host command
pub type Reply<T> = oneshot::Sender<Result<T>>;

/// Everything the engine reacts to, processed one at a time
#[derive(Debug)]
pub enum Message {
    // ─────────────────────────────────────────────────────────
    // Lifecycle hooks
    // ─────────────────────────────────────────────────────────
    AttachEngine {
        binding: HostBinding,
        reply: Reply<()>,
    },
    DetachEngine {
        reply: Reply<()>,
    },
    AttachActivity {
        activity: Weak<dyn PermissionPrompt>,
        reply: Reply<()>,
    },
    DetachActivity,
    DetachActivityForConfigChanges,
    ReattachActivityForConfigChanges {
        activity: Weak<dyn PermissionPrompt>,
        reply: Reply<()>,
    },
    AttachListener {
        listener: mpsc::Sender<SessionEvent>,
    },
    DetachListener,

    // ─────────────────────────────────────────────────────────
    // Host commands
    // ─────────────────────────────────────────────────────────
    /// `None` starts with the configured default
    StartTracking {
        config: Option<TrackingConfig>,
        reply: Reply<()>,
    },
    PauseTracking {
        reply: Reply<()>,
    },
    ResumeTracking {
        reply: Reply<()>,
    },
    StopTracking {
        reply: Reply<()>,
    },
    RequestPermission {
        reply: Reply<PermissionState>,
    },
    GetStatus {
        reply: oneshot::Sender<ServiceStatus>,
    },

    // ─────────────────────────────────────────────────────────
    // Platform callbacks
    // ─────────────────────────────────────────────────────────
    PermissionResult {
        token: PermissionToken,
        outcome: PermissionOutcome,
    },
    PermissionRevoked,
    /// A prompt's wait ran out; the loop decides whether it really timed out
    PermissionTimedOut {
        token: PermissionToken,
        timeout: Duration,
        response_rx: oneshot::Receiver<PermissionState>,
        reply: Reply<PermissionState>,
    },

    /// Fix or error pushed by the provider
    Provider(ProviderUpdate),
    SubscriptionAcked {
        generation: u64,
    },
    SubscriptionFailed {
        generation: u64,
        error: ProviderError,
    },
    RetryElapsed {
        generation: u64,
    },

    /// Detach the engine and stop the loop
    Shutdown,
}
