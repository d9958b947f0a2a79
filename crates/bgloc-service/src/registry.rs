//! Process-wide service state
//!
//! [`ServiceRegistry`] ties the host binding, the permission gate, the
//! event channel and the current [`TrackingSession`] together. It is owned
//! by exactly one writer (the engine task); every method is synchronous and
//! returns the provider work the caller must carry out.

use std::sync::{Arc, Weak};

use serde::Serialize;
use tokio::sync::mpsc;

use bgloc_core::prelude::*;
use bgloc_core::{HostHandle, LocationFix, PermissionState, SessionEvent, SessionState, TrackingConfig};
use bgloc_provider::{ProviderError, ProviderEvent, ProviderUpdate};

use crate::event_channel::EventChannel;
use crate::permission::{
    PermissionGate, PermissionOutcome, PermissionPrompt, PermissionRequest, PermissionToken,
};
use crate::session::{ProviderCommand, TrackingSession};

/// Host-owned resources handed over on engine attach
///
/// The activity is held weakly: the host recreates it freely (rotation,
/// config changes) and the service must never keep it alive.
#[derive(Debug, Clone)]
pub struct HostBinding {
    pub messenger: HostHandle,
    pub application_context: HostHandle,
    activity: Option<Weak<dyn PermissionPrompt>>,
}

impl HostBinding {
    pub fn new(messenger: HostHandle, application_context: HostHandle) -> Self {
        Self {
            messenger,
            application_context,
            activity: None,
        }
    }

    /// The attached activity, if it is still alive
    pub fn activity(&self) -> Option<Arc<dyn PermissionPrompt>> {
        self.activity.as_ref().and_then(|activity| activity.upgrade())
    }

    pub fn has_activity(&self) -> bool {
        self.activity().is_some()
    }
}

/// Snapshot answered to status queries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    pub engine_attached: bool,
    pub activity_attached: bool,
    pub permission: PermissionState,
    pub session: SessionState,
    pub tracking: bool,
    pub last_fix: Option<LocationFix>,
    pub events_delivered: u64,
    pub events_dropped: u64,
}

#[derive(Debug, Default)]
pub struct ServiceRegistry {
    binding: Option<HostBinding>,
    session: Option<TrackingSession>,
    permission: PermissionGate,
    events: EventChannel,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_permission(state: PermissionState) -> Self {
        Self {
            permission: PermissionGate::with_state(state),
            ..Self::default()
        }
    }

    fn require_engine(&self) -> Result<&HostBinding> {
        self.binding.as_ref().ok_or(Error::NoEngineAttached)
    }

    // ─────────────────────────────────────────────────────────
    // Lifecycle hooks
    // ─────────────────────────────────────────────────────────

    pub fn attach_engine(&mut self, binding: HostBinding) {
        if let Some(old) = self.binding.replace(binding) {
            warn!(
                "Engine re-attached without detach (was messenger {})",
                old.messenger
            );
        } else {
            info!("Engine attached");
        }
    }

    /// Stop any live session, cancel pending prompts and drop the binding.
    ///
    /// The `Stopped` event goes out before the listener is detached.
    pub fn detach_engine(&mut self) -> Vec<ProviderCommand> {
        let commands = match self.session.take() {
            Some(mut session) => session.stop(&mut self.events),
            None => Vec::new(),
        };
        self.permission.cancel_all();
        self.events.detach_listener();

        if self.binding.take().is_some() {
            info!("Engine detached");
        }
        commands
    }

    pub fn is_engine_attached(&self) -> bool {
        self.binding.is_some()
    }

    pub fn attach_activity(&mut self, activity: Weak<dyn PermissionPrompt>) -> Result<()> {
        let binding = self.binding.as_mut().ok_or(Error::NoEngineAttached)?;
        binding.activity = Some(activity);
        debug!("Activity attached");
        Ok(())
    }

    /// Forget the activity. A running session is not affected.
    pub fn detach_activity(&mut self) {
        if let Some(binding) = self.binding.as_mut() {
            if binding.activity.take().is_some() {
                debug!("Activity detached");
            }
        }
    }

    pub fn detach_activity_for_config_changes(&mut self) {
        debug!("Activity detaching for config change");
        self.detach_activity();
    }

    pub fn reattach_activity_for_config_changes(
        &mut self,
        activity: Weak<dyn PermissionPrompt>,
    ) -> Result<()> {
        debug!("Activity reattaching after config change");
        self.attach_activity(activity)
    }

    pub fn attach_listener(&mut self, listener: mpsc::Sender<SessionEvent>) {
        self.events.attach_listener(listener);
    }

    pub fn detach_listener(&mut self) {
        self.events.detach_listener();
    }

    // ─────────────────────────────────────────────────────────
    // Host commands
    // ─────────────────────────────────────────────────────────

    pub fn start_tracking(&mut self, config: TrackingConfig) -> Result<Vec<ProviderCommand>> {
        self.require_engine()?;
        let permission = self.permission.check();
        self.session
            .get_or_insert_with(TrackingSession::new)
            .start(config, permission, &mut self.events)
    }

    pub fn pause_tracking(&mut self) -> Result<Vec<ProviderCommand>> {
        self.require_engine()?;
        match self.session.as_mut() {
            Some(session) => session.pause(&mut self.events),
            None => Err(Error::invalid_transition(SessionState::Idle, "pause")),
        }
    }

    pub fn resume_tracking(&mut self) -> Result<Vec<ProviderCommand>> {
        self.require_engine()?;
        match self.session.as_mut() {
            Some(session) => session.resume(&mut self.events),
            None => Err(Error::invalid_transition(SessionState::Idle, "resume")),
        }
    }

    /// Stop the session and retire pending permission prompts
    pub fn stop_tracking(&mut self) -> Result<Vec<ProviderCommand>> {
        self.require_engine()?;
        self.permission.cancel_all();
        Ok(self
            .session
            .as_mut()
            .map(|session| session.stop(&mut self.events))
            .unwrap_or_default())
    }

    pub fn request_permission(&mut self) -> Result<PermissionRequest> {
        let activity = self.require_engine()?.activity();
        self.permission.request(activity.as_deref())
    }

    pub fn permission_state(&self) -> PermissionState {
        self.permission.check()
    }

    pub fn session_state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(TrackingSession::state)
            .unwrap_or_default()
    }

    pub fn is_tracking(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(TrackingSession::is_tracking)
    }

    pub fn session(&self) -> Option<&TrackingSession> {
        self.session.as_ref()
    }

    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            engine_attached: self.is_engine_attached(),
            activity_attached: self
                .binding
                .as_ref()
                .is_some_and(HostBinding::has_activity),
            permission: self.permission.check(),
            session: self.session_state(),
            tracking: self.is_tracking(),
            last_fix: self.session.as_ref().and_then(|s| s.last_fix().cloned()),
            events_delivered: self.events.delivered_count(),
            events_dropped: self.events.dropped_count(),
        }
    }

    // ─────────────────────────────────────────────────────────
    // Platform callbacks
    // ─────────────────────────────────────────────────────────

    /// Returns `false` for stale or duplicate results
    pub fn on_permission_result(&mut self, token: PermissionToken, outcome: PermissionOutcome) -> bool {
        self.permission.resolve(token, outcome)
    }

    pub fn on_permission_timeout(&mut self, token: PermissionToken) -> bool {
        self.permission.expire(token)
    }

    pub fn on_permission_revoked(&mut self) -> Vec<ProviderCommand> {
        self.permission.revoke();
        match self.session.as_mut() {
            Some(session) => session.on_permission_revoked(&mut self.events),
            None => Vec::new(),
        }
    }

    pub fn on_provider_update(&mut self, update: ProviderUpdate) -> Vec<ProviderCommand> {
        let Some(session) = self.session.as_mut() else {
            trace!("No session, dropping update from #{}", update.generation);
            return Vec::new();
        };

        match update.event {
            ProviderEvent::Fix(fix) => {
                session.on_fix(update.generation, fix, &mut self.events);
                Vec::new()
            }
            ProviderEvent::Error(error) => {
                session.on_provider_error(update.generation, &error, &mut self.events)
            }
        }
    }

    pub fn on_subscription_acked(&mut self, generation: u64) -> Vec<ProviderCommand> {
        match self.session.as_mut() {
            Some(session) => session.on_subscribed(generation, &mut self.events),
            None => vec![ProviderCommand::Unsubscribe { generation }],
        }
    }

    pub fn on_subscription_failed(
        &mut self,
        generation: u64,
        error: &ProviderError,
    ) -> Vec<ProviderCommand> {
        match self.session.as_mut() {
            Some(session) => session.on_subscribe_failed(generation, error, &mut self.events),
            None => Vec::new(),
        }
    }

    pub fn on_retry_elapsed(&mut self, generation: u64) -> Vec<ProviderCommand> {
        match self.session.as_mut() {
            Some(session) => session.on_retry_elapsed(generation),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_channel::listener_channel;
    use crate::permission::MockPermissionPrompt;
    use bgloc_provider::test_utils::{test_config, test_fix};

    fn binding() -> HostBinding {
        HostBinding::new(HostHandle(1), HostHandle(2))
    }

    fn attached(permission: PermissionState) -> (ServiceRegistry, mpsc::Receiver<SessionEvent>) {
        let mut registry = ServiceRegistry::with_permission(permission);
        registry.attach_engine(binding());
        let (tx, rx) = listener_channel(64);
        registry.attach_listener(tx);
        (registry, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    fn subscribe_generation(commands: &[ProviderCommand]) -> u64 {
        match commands {
            [ProviderCommand::Subscribe { generation, .. }] => *generation,
            other => panic!("expected a single subscribe, got {:?}", other),
        }
    }

    fn running(registry: &mut ServiceRegistry) -> u64 {
        let generation = subscribe_generation(&registry.start_tracking(test_config()).unwrap());
        registry.on_subscription_acked(generation);
        generation
    }

    #[test]
    fn test_commands_require_engine() {
        let mut registry = ServiceRegistry::with_permission(PermissionState::Granted);

        assert!(matches!(
            registry.start_tracking(test_config()),
            Err(Error::NoEngineAttached)
        ));
        assert!(matches!(registry.stop_tracking(), Err(Error::NoEngineAttached)));
        assert!(matches!(registry.request_permission(), Err(Error::NoEngineAttached)));

        let prompt: Arc<dyn PermissionPrompt> = Arc::new(MockPermissionPrompt::new());
        assert!(matches!(
            registry.attach_activity(Arc::downgrade(&prompt)),
            Err(Error::NoEngineAttached)
        ));
    }

    #[test]
    fn test_detach_engine_while_running_emits_one_stopped() {
        let (mut registry, mut rx) = attached(PermissionState::Granted);
        let generation = running(&mut registry);
        drain(&mut rx);

        let commands = registry.detach_engine();

        assert_eq!(commands, vec![ProviderCommand::Unsubscribe { generation }]);
        assert_eq!(
            drain(&mut rx),
            vec![SessionEvent::StateChanged(SessionState::Stopped)]
        );
        assert!(!registry.is_engine_attached());
        assert!(registry.session().is_none());
        assert!(!registry.events().has_listener());

        // A second detach has nothing left to stop
        assert!(registry.detach_engine().is_empty());
    }

    #[test]
    fn test_detach_engine_cancels_pending_permission() {
        let (mut registry, _rx) = attached(PermissionState::Unknown);
        let mut mock = MockPermissionPrompt::new();
        mock.expect_launch_request().times(1).returning(|_| Ok(()));
        let prompt: Arc<dyn PermissionPrompt> = Arc::new(mock);
        registry.attach_activity(Arc::downgrade(&prompt)).unwrap();

        let token = match registry.request_permission().unwrap() {
            PermissionRequest::Pending { token, .. } => token,
            other => panic!("expected pending, got {:?}", other),
        };
        registry.detach_engine();

        assert!(!registry.on_permission_result(token, PermissionOutcome::Granted));
        assert_eq!(registry.permission_state(), PermissionState::Unknown);
    }

    #[test]
    fn test_activity_detach_keeps_session_running() {
        let (mut registry, mut rx) = attached(PermissionState::Granted);
        let prompt: Arc<dyn PermissionPrompt> = Arc::new(MockPermissionPrompt::new());
        registry.attach_activity(Arc::downgrade(&prompt)).unwrap();
        let generation = running(&mut registry);
        drain(&mut rx);

        registry.detach_activity_for_config_changes();
        assert!(!registry.status().activity_attached);
        registry.on_provider_update(ProviderUpdate::fix(generation, test_fix(1)));

        registry
            .reattach_activity_for_config_changes(Arc::downgrade(&prompt))
            .unwrap();
        assert!(registry.status().activity_attached);

        assert_eq!(registry.session_state(), SessionState::Running);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn test_dropped_activity_counts_as_detached() {
        let (mut registry, _rx) = attached(PermissionState::Unknown);
        let prompt: Arc<dyn PermissionPrompt> = Arc::new(MockPermissionPrompt::new());
        registry.attach_activity(Arc::downgrade(&prompt)).unwrap();
        drop(prompt);

        assert!(matches!(
            registry.request_permission(),
            Err(Error::NoActivityAttached)
        ));
    }

    #[test]
    fn test_pause_without_session_is_invalid() {
        let (mut registry, _rx) = attached(PermissionState::Granted);
        let err = registry.pause_tracking().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidTransition));
        assert_eq!(registry.session_state(), SessionState::Idle);
    }

    #[test]
    fn test_stop_without_session_is_noop() {
        let (mut registry, mut rx) = attached(PermissionState::Granted);
        assert!(registry.stop_tracking().unwrap().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_ack_without_session_is_released() {
        let (mut registry, _rx) = attached(PermissionState::Granted);
        assert_eq!(
            registry.on_subscription_acked(42),
            vec![ProviderCommand::Unsubscribe { generation: 42 }]
        );
    }

    #[test]
    fn test_permission_revoked_fails_session() {
        let (mut registry, mut rx) = attached(PermissionState::Granted);
        let generation = running(&mut registry);
        drain(&mut rx);

        let commands = registry.on_permission_revoked();

        assert_eq!(commands, vec![ProviderCommand::Unsubscribe { generation }]);
        assert_eq!(registry.permission_state(), PermissionState::DeniedOnce);
        assert_eq!(
            drain(&mut rx),
            vec![
                SessionEvent::Error(ErrorKind::PermissionRevoked),
                SessionEvent::StateChanged(SessionState::Failed(ErrorKind::PermissionRevoked)),
            ]
        );
        assert!(matches!(
            registry.start_tracking(test_config()),
            Err(Error::PermissionDenied { .. })
        ));
    }

    #[test]
    fn test_status_snapshot() {
        let (mut registry, _rx) = attached(PermissionState::Granted);
        let generation = running(&mut registry);
        registry.on_provider_update(ProviderUpdate::fix(generation, test_fix(500)));

        let status = registry.status();
        assert!(status.engine_attached);
        assert!(!status.activity_attached);
        assert_eq!(status.permission, PermissionState::Granted);
        assert_eq!(status.session, SessionState::Running);
        assert!(status.tracking);
        assert_eq!(status.last_fix.map(|f| f.timestamp_millis), Some(500));
        assert_eq!(status.events_delivered, 3);
    }

    #[test]
    fn test_listener_attach_without_engine() {
        let mut registry = ServiceRegistry::new();
        let (tx, _rx) = listener_channel(4);
        registry.attach_listener(tx);
        registry.detach_listener();
        registry.detach_listener();
        assert!(!registry.events().has_listener());
    }
}
