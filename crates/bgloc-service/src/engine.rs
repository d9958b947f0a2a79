//! Engine - the single owner of service state
//!
//! The engine holds the [`ServiceRegistry`] and processes one [`Message`] at
//! a time, merging host commands with provider updates. Hosts talk to it
//! through a cloneable [`ServiceHandle`].
//!
//! ```text
//! ServiceHandle ──Message──┐
//!                          ├──> Engine::run ──update()──> handle_action ──> tokio tasks
//! LocationProvider ─Update─┘                                               │
//!        ^                                                                 │
//!        └──────────────────── subscribe / unsubscribe ────────────────────┘
//! ```

use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use bgloc_core::prelude::*;
use bgloc_core::{PermissionState, SessionEvent, SessionState, TrackingConfig};
use bgloc_provider::{BackoffPolicy, LocationProvider, ProviderUpdate, UpdateSink};

use crate::actions::handle_action;
use crate::config::Settings;
use crate::event_channel::listener_channel;
use crate::handler;
use crate::message::{Message, Reply};
use crate::permission::{PermissionOutcome, PermissionPrompt, PermissionToken};
use crate::registry::{HostBinding, ServiceRegistry, ServiceStatus};
use crate::session::ProviderCommand;

/// Capacity of the engine's message queue
const MESSAGE_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the provider update queue
const UPDATE_CHANNEL_CAPACITY: usize = 256;

pub struct Engine<P> {
    registry: ServiceRegistry,
    provider: Arc<P>,
    settings: Settings,
    backoff: BackoffPolicy,
    msg_tx: mpsc::Sender<Message>,
    msg_rx: mpsc::Receiver<Message>,
    update_tx: UpdateSink,
    update_rx: mpsc::Receiver<ProviderUpdate>,
}

impl<P> std::fmt::Debug for Engine<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("backoff", &self.backoff)
            .field("provider", &"<provider>")
            .finish()
    }
}

impl<P> Engine<P>
where
    P: LocationProvider + Send + Sync + 'static,
{
    pub fn new(provider: P, settings: Settings) -> Self {
        Self::with_registry(provider, settings, ServiceRegistry::new())
    }

    /// Build around an existing registry (e.g. one seeded with a permission state)
    pub fn with_registry(provider: P, settings: Settings, registry: ServiceRegistry) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let (update_tx, update_rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let backoff = settings.retry.policy();

        Self {
            registry,
            provider: Arc::new(provider),
            settings,
            backoff,
            msg_tx,
            msg_rx,
            update_tx,
            update_rx,
        }
    }

    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle {
            msg_tx: self.msg_tx.clone(),
            listener_capacity: self.settings.events.listener_capacity,
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Apply one message and dispatch its actions. Returns `true` to quit.
    pub fn process_message(&mut self, message: Message) -> bool {
        let result = handler::update(&mut self.registry, message, &self.settings);
        for action in result.actions {
            handle_action(
                action,
                &self.provider,
                self.msg_tx.clone(),
                &self.update_tx,
                &self.backoff,
            );
        }
        result.quit
    }

    /// Process messages until [`Message::Shutdown`], then tear down.
    pub async fn run(mut self) {
        info!("Location service engine started");

        loop {
            let message = tokio::select! {
                Some(message) = self.msg_rx.recv() => message,
                Some(update) = self.update_rx.recv() => Message::Provider(update),
                else => break,
            };
            if self.process_message(message) {
                break;
            }
        }

        self.shutdown().await;
        info!("Location service engine stopped");
    }

    /// Spawn [`Engine::run`] on the current runtime
    pub fn spawn(self) -> (ServiceHandle, JoinHandle<()>) {
        let handle = self.handle();
        (handle, tokio::spawn(self.run()))
    }

    async fn shutdown(&mut self) {
        // Unsubscribe inline; spawned tasks may not run once the loop is gone
        for command in self.registry.detach_engine() {
            if let ProviderCommand::Unsubscribe { generation } = command {
                self.provider.unsubscribe(generation).await;
            }
        }
    }
}

/// Cloneable host-side entry point into a running [`Engine`]
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    msg_tx: mpsc::Sender<Message>,
    listener_capacity: usize,
}

impl ServiceHandle {
    async fn send(&self, message: Message) -> Result<()> {
        self.msg_tx
            .send(message)
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Message) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(make(reply)).await?;
        response.await.map_err(|_| Error::ChannelClosed)?
    }

    // ─────────────────────────────────────────────────────────
    // Lifecycle hooks
    // ─────────────────────────────────────────────────────────

    pub async fn attach_engine(&self, binding: HostBinding) -> Result<()> {
        self.call(|reply| Message::AttachEngine { binding, reply })
            .await
    }

    pub async fn detach_engine(&self) -> Result<()> {
        self.call(|reply| Message::DetachEngine { reply }).await
    }

    pub async fn attach_activity(&self, activity: Weak<dyn PermissionPrompt>) -> Result<()> {
        self.call(|reply| Message::AttachActivity { activity, reply })
            .await
    }

    pub async fn detach_activity(&self) -> Result<()> {
        self.send(Message::DetachActivity).await
    }

    pub async fn detach_activity_for_config_changes(&self) -> Result<()> {
        self.send(Message::DetachActivityForConfigChanges).await
    }

    pub async fn reattach_activity_for_config_changes(
        &self,
        activity: Weak<dyn PermissionPrompt>,
    ) -> Result<()> {
        self.call(|reply| Message::ReattachActivityForConfigChanges { activity, reply })
            .await
    }

    /// Attach a new listener and return its receiving end
    pub async fn attach_listener(&self) -> Result<mpsc::Receiver<SessionEvent>> {
        let (listener, events) = listener_channel(self.listener_capacity);
        self.send(Message::AttachListener { listener }).await?;
        Ok(events)
    }

    pub async fn detach_listener(&self) -> Result<()> {
        self.send(Message::DetachListener).await
    }

    pub async fn on_permission_result(&self, token: PermissionToken, granted: bool) -> Result<()> {
        self.on_permission_outcome(token, PermissionOutcome::from(granted))
            .await
    }

    pub async fn on_permission_outcome(
        &self,
        token: PermissionToken,
        outcome: PermissionOutcome,
    ) -> Result<()> {
        self.send(Message::PermissionResult { token, outcome }).await
    }

    pub async fn on_permission_revoked(&self) -> Result<()> {
        self.send(Message::PermissionRevoked).await
    }

    // ─────────────────────────────────────────────────────────
    // Host commands
    // ─────────────────────────────────────────────────────────

    pub async fn start_tracking(&self, config: TrackingConfig) -> Result<()> {
        self.call(|reply| Message::StartTracking {
            config: Some(config),
            reply,
        })
        .await
    }

    /// Start with the `[tracking]` config from settings
    pub async fn start_tracking_with_defaults(&self) -> Result<()> {
        self.call(|reply| Message::StartTracking {
            config: None,
            reply,
        })
        .await
    }

    pub async fn pause_tracking(&self) -> Result<()> {
        self.call(|reply| Message::PauseTracking { reply }).await
    }

    pub async fn resume_tracking(&self) -> Result<()> {
        self.call(|reply| Message::ResumeTracking { reply }).await
    }

    pub async fn stop_tracking(&self) -> Result<()> {
        self.call(|reply| Message::StopTracking { reply }).await
    }

    /// Resolves once the platform answers, the request times out or is cancelled
    pub async fn request_permission(&self) -> Result<PermissionState> {
        self.call(|reply| Message::RequestPermission { reply }).await
    }

    pub async fn status(&self) -> Result<ServiceStatus> {
        let (reply, response) = oneshot::channel();
        self.send(Message::GetStatus { reply }).await?;
        response.await.map_err(|_| Error::ChannelClosed)
    }

    pub async fn permission_state(&self) -> Result<PermissionState> {
        Ok(self.status().await?.permission)
    }

    pub async fn session_state(&self) -> Result<SessionState> {
        Ok(self.status().await?.session)
    }

    pub async fn is_tracking(&self) -> Result<bool> {
        Ok(self.status().await?.tracking)
    }

    /// Ask the engine to detach and exit its loop
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Message::Shutdown).await
    }
}
