//! Update function - applies one message to the registry (TEA pattern)

use std::time::Duration;

use tokio::sync::oneshot;

use bgloc_core::prelude::*;
use bgloc_core::PermissionState;

use crate::config::Settings;
use crate::message::{Message, Reply};
use crate::permission::{PermissionRequest, PermissionToken};
use crate::registry::ServiceRegistry;
use crate::session::ProviderCommand;

/// Work the engine performs after an update
#[derive(Debug)]
pub enum UpdateAction {
    /// Talk to the provider or arm a retry timer
    Provider(ProviderCommand),

    /// Wait (bounded) for a permission prompt, then answer `reply`
    AwaitPermission {
        token: PermissionToken,
        response_rx: oneshot::Receiver<PermissionState>,
        timeout: Duration,
        reply: Reply<PermissionState>,
    },
}

#[derive(Debug, Default)]
pub struct UpdateResult {
    pub actions: Vec<UpdateAction>,
    /// Stop the loop after this message
    pub quit: bool,
}

impl UpdateResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn provider(commands: Vec<ProviderCommand>) -> Self {
        Self {
            actions: commands.into_iter().map(UpdateAction::Provider).collect(),
            quit: false,
        }
    }

    pub fn action(action: UpdateAction) -> Self {
        Self {
            actions: vec![action],
            quit: false,
        }
    }

    pub fn quit() -> Self {
        Self {
            actions: Vec::new(),
            quit: true,
        }
    }
}

/// Process a message and update state
pub fn update(registry: &mut ServiceRegistry, message: Message, settings: &Settings) -> UpdateResult {
    match message {
        // ─────────────────────────────────────────────────────────
        // Lifecycle hooks
        // ─────────────────────────────────────────────────────────
        Message::AttachEngine { binding, reply } => {
            registry.attach_engine(binding);
            let _ = reply.send(Ok(()));
            UpdateResult::none()
        }

        Message::DetachEngine { reply } => {
            let commands = registry.detach_engine();
            let _ = reply.send(Ok(()));
            UpdateResult::provider(commands)
        }

        Message::AttachActivity { activity, reply } => {
            let _ = reply.send(registry.attach_activity(activity));
            UpdateResult::none()
        }

        Message::DetachActivity => {
            registry.detach_activity();
            UpdateResult::none()
        }

        Message::DetachActivityForConfigChanges => {
            registry.detach_activity_for_config_changes();
            UpdateResult::none()
        }

        Message::ReattachActivityForConfigChanges { activity, reply } => {
            let _ = reply.send(registry.reattach_activity_for_config_changes(activity));
            UpdateResult::none()
        }

        Message::AttachListener { listener } => {
            registry.attach_listener(listener);
            UpdateResult::none()
        }

        Message::DetachListener => {
            registry.detach_listener();
            UpdateResult::none()
        }

        // ─────────────────────────────────────────────────────────
        // Host commands
        // ─────────────────────────────────────────────────────────
        Message::StartTracking { config, reply } => {
            let config = config.unwrap_or_else(|| settings.tracking.clone());
            respond(reply, registry.start_tracking(config), "start")
        }

        Message::PauseTracking { reply } => respond(reply, registry.pause_tracking(), "pause"),

        Message::ResumeTracking { reply } => respond(reply, registry.resume_tracking(), "resume"),

        Message::StopTracking { reply } => respond(reply, registry.stop_tracking(), "stop"),

        Message::RequestPermission { reply } => match registry.request_permission() {
            Ok(PermissionRequest::Resolved(state)) => {
                let _ = reply.send(Ok(state));
                UpdateResult::none()
            }
            Ok(PermissionRequest::Pending { token, response_rx }) => {
                UpdateResult::action(UpdateAction::AwaitPermission {
                    token,
                    response_rx,
                    timeout: settings.permission.request_timeout(),
                    reply,
                })
            }
            Err(e) => {
                debug!("Permission request rejected: {}", e);
                let _ = reply.send(Err(e));
                UpdateResult::none()
            }
        },

        Message::GetStatus { reply } => {
            let _ = reply.send(registry.status());
            UpdateResult::none()
        }

        // ─────────────────────────────────────────────────────────
        // Platform callbacks
        // ─────────────────────────────────────────────────────────
        Message::PermissionResult { token, outcome } => {
            registry.on_permission_result(token, outcome);
            UpdateResult::none()
        }

        Message::PermissionRevoked => UpdateResult::provider(registry.on_permission_revoked()),

        Message::PermissionTimedOut {
            token,
            timeout,
            mut response_rx,
            reply,
        } => {
            let result = if registry.on_permission_timeout(token) {
                Err(Error::PermissionTimeout {
                    token: token.value(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            } else {
                // Answered (or cancelled) before the timeout reached the loop
                response_rx.try_recv().map_err(|_| Error::PermissionCancelled)
            };
            let _ = reply.send(result);
            UpdateResult::none()
        }

        Message::Provider(update) => UpdateResult::provider(registry.on_provider_update(update)),

        Message::SubscriptionAcked { generation } => {
            UpdateResult::provider(registry.on_subscription_acked(generation))
        }

        Message::SubscriptionFailed { generation, error } => {
            UpdateResult::provider(registry.on_subscription_failed(generation, &error))
        }

        Message::RetryElapsed { generation } => {
            UpdateResult::provider(registry.on_retry_elapsed(generation))
        }

        Message::Shutdown => UpdateResult::quit(),
    }
}

/// Answer a synchronous command and schedule its provider work
fn respond(
    reply: Reply<()>,
    result: Result<Vec<ProviderCommand>>,
    command: &'static str,
) -> UpdateResult {
    match result {
        Ok(commands) => {
            let _ = reply.send(Ok(()));
            UpdateResult::provider(commands)
        }
        Err(e) => {
            if e.is_recoverable() {
                debug!("{} rejected: {}", command, e);
            } else {
                warn!("{} rejected: {}", command, e);
            }
            let _ = reply.send(Err(e));
            UpdateResult::none()
        }
    }
}
