//! Location permission gate
//!
//! Caches the current [`PermissionState`] and correlates prompt results with
//! the request that launched them. Every prompt gets a fresh
//! [`PermissionToken`]; a result carrying a token that is no longer pending
//! (already answered, timed out, cancelled) is ignored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::oneshot;
use tokio::time::Instant;

use bgloc_core::prelude::*;
use bgloc_core::PermissionState;

/// Global permission token counter
static TOKEN_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Correlation id of one permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PermissionToken(u64);

impl PermissionToken {
    fn next() -> Self {
        Self(TOKEN_COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Rebuild a token from the raw id the platform echoed back
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PermissionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shows the platform permission dialog.
///
/// Implemented by the attached activity. The answer comes back later through
/// the service's `on_permission_result` hook, tagged with the same token.
#[cfg_attr(test, mockall::automock)]
pub trait PermissionPrompt: Send + Sync {
    fn launch_request(&self, token: PermissionToken) -> Result<()>;
}

/// What the platform answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    Granted,
    Denied,
    /// Denied with "don't ask again"
    DeniedPermanently,
}

impl From<bool> for PermissionOutcome {
    fn from(granted: bool) -> Self {
        if granted {
            PermissionOutcome::Granted
        } else {
            PermissionOutcome::Denied
        }
    }
}

/// Result of [`PermissionGate::request`]
#[derive(Debug)]
pub enum PermissionRequest {
    /// Answered from the cache without prompting
    Resolved(PermissionState),
    /// A prompt is showing; `response_rx` yields the answer exactly once
    Pending {
        token: PermissionToken,
        response_rx: oneshot::Receiver<PermissionState>,
    },
}

#[derive(Debug)]
struct PendingPermission {
    response_tx: oneshot::Sender<PermissionState>,
    created_at: Instant,
}

/// Cached permission state plus in-flight prompts
#[derive(Debug, Default)]
pub struct PermissionGate {
    state: PermissionState,
    pending: HashMap<PermissionToken, PendingPermission>,
    consecutive_denials: u32,
}

impl PermissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PermissionState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    /// Cached permission state
    pub fn check(&self) -> PermissionState {
        self.state
    }

    /// Ask the platform for permission.
    ///
    /// `Granted` and `DeniedPermanently` resolve from the cache; prompting
    /// again would not change either. Otherwise the prompt is launched on
    /// `prompt`, which must be present.
    pub fn request(&mut self, prompt: Option<&dyn PermissionPrompt>) -> Result<PermissionRequest> {
        if matches!(
            self.state,
            PermissionState::Granted | PermissionState::DeniedPermanently
        ) {
            debug!("Permission request answered from cache: {}", self.state);
            return Ok(PermissionRequest::Resolved(self.state));
        }

        let prompt = prompt.ok_or(Error::NoActivityAttached)?;
        let token = PermissionToken::next();
        prompt.launch_request(token)?;

        let (response_tx, response_rx) = oneshot::channel();
        self.pending.insert(
            token,
            PendingPermission {
                response_tx,
                created_at: Instant::now(),
            },
        );
        info!("Permission prompt {} launched", token);

        Ok(PermissionRequest::Pending { token, response_rx })
    }

    /// Apply a platform answer.
    ///
    /// Returns `false` (and changes nothing) if `token` is not pending.
    pub fn resolve(&mut self, token: PermissionToken, outcome: PermissionOutcome) -> bool {
        let Some(pending) = self.pending.remove(&token) else {
            debug!("Ignoring permission result for stale token {}", token);
            return false;
        };

        self.state = match outcome {
            PermissionOutcome::Granted => {
                self.consecutive_denials = 0;
                PermissionState::Granted
            }
            PermissionOutcome::Denied => {
                self.consecutive_denials += 1;
                if self.consecutive_denials >= 2 {
                    PermissionState::DeniedPermanently
                } else {
                    PermissionState::DeniedOnce
                }
            }
            PermissionOutcome::DeniedPermanently => {
                self.consecutive_denials += 1;
                PermissionState::DeniedPermanently
            }
        };

        info!(
            "Permission prompt {} answered after {:?}: {}",
            token,
            pending.created_at.elapsed(),
            self.state
        );
        // The waiter may have timed out already
        let _ = pending.response_tx.send(self.state);
        true
    }

    /// Retire a token whose prompt went unanswered. Returns `true` if it was pending.
    pub fn expire(&mut self, token: PermissionToken) -> bool {
        let expired = self.pending.remove(&token).is_some();
        if expired {
            warn!("Permission prompt {} timed out", token);
        }
        expired
    }

    /// Retire every pending token. Waiters see their channel close.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        if count > 0 {
            debug!("Cancelling {} pending permission prompt(s)", count);
        }
        self.pending.clear();
        count
    }

    /// The OS withdrew permission; the user may be asked again
    pub fn revoke(&mut self) {
        warn!("Location permission revoked (was {})", self.state);
        self.state = PermissionState::DeniedOnce;
        self.consecutive_denials = 1;
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, token: PermissionToken) -> bool {
        self.pending.contains_key(&token)
    }
}
