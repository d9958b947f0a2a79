//! Tracking session state machine
//!
//! [`TrackingSession`] is synchronous: every operation mutates state, emits
//! events through the [`EventChannel`] and returns the [`ProviderCommand`]s
//! the caller must execute. Nothing here awaits; the engine runs the
//! commands and feeds their outcomes back in (`on_subscribed`,
//! `on_subscribe_failed`, `on_retry_elapsed`).
//!
//! Each provider subscription carries a generation from
//! [`next_generation`]. Only updates tagged with the current generation
//! affect the session, so a stopped, paused or failed session is deaf to
//! its old subscriptions.

use bgloc_core::prelude::*;
use bgloc_core::{LocationFix, PermissionState, SessionEvent, SessionState, TrackingConfig};
use bgloc_provider::{next_generation, ProviderError, ProviderRequest};

use crate::event_channel::EventChannel;

/// Provider work requested by a session transition
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCommand {
    Subscribe {
        generation: u64,
        request: ProviderRequest,
    },
    Unsubscribe {
        generation: u64,
    },
    /// Resubscribe as `generation` after the backoff for `attempt`
    ScheduleRetry {
        generation: u64,
        attempt: u32,
    },
}

/// One background tracking run
#[derive(Debug, Default)]
pub struct TrackingSession {
    state: SessionState,
    config: TrackingConfig,
    /// Current subscription generation; `None` while nothing is subscribed
    generation: Option<u64>,
    /// Provider acknowledged the current generation
    subscribed: bool,
    /// Current generation is waiting for its backoff timer
    retry_pending: bool,
    /// Consecutive transient failures since the last delivered fix
    retry_attempt: u32,
    last_fix: Option<LocationFix>,
}

impl TrackingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Running or paused (the host's "is the service running" query)
    pub fn is_tracking(&self) -> bool {
        matches!(self.state, SessionState::Running | SessionState::Paused)
    }

    pub fn last_fix(&self) -> Option<&LocationFix> {
        self.last_fix.as_ref()
    }

    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub fn retry_attempt(&self) -> u32 {
        self.retry_attempt
    }

    // ─────────────────────────────────────────────────────────
    // Host commands
    // ─────────────────────────────────────────────────────────

    /// Begin a run with `config`.
    ///
    /// Rejections leave the session untouched and emit nothing.
    pub fn start(
        &mut self,
        config: TrackingConfig,
        permission: PermissionState,
        events: &mut EventChannel,
    ) -> Result<Vec<ProviderCommand>> {
        config.validate()?;
        if !permission.is_granted() {
            return Err(Error::PermissionDenied { state: permission });
        }
        if !self.state.can_start() {
            return Err(Error::AlreadyRunning { state: self.state });
        }

        let generation = next_generation();
        let request = ProviderRequest::from(&config);
        info!(
            "Starting session #{generation}: every {}ms ({}), distance filter {}m",
            config.interval_millis, config.accuracy_mode, config.distance_filter_meters
        );

        self.config = config;
        self.generation = Some(generation);
        self.subscribed = false;
        self.retry_pending = false;
        self.retry_attempt = 0;
        self.last_fix = None;
        self.transition(SessionState::Starting, events);

        Ok(vec![ProviderCommand::Subscribe {
            generation,
            request,
        }])
    }

    /// Stop fix delivery, keeping the config. Idempotent once paused.
    pub fn pause(&mut self, events: &mut EventChannel) -> Result<Vec<ProviderCommand>> {
        match self.state {
            SessionState::Running => {
                let commands = self.release();
                self.transition(SessionState::Paused, events);
                Ok(commands)
            }
            SessionState::Paused => Ok(Vec::new()),
            other => Err(Error::invalid_transition(other, "pause")),
        }
    }

    /// Resubscribe with the retained config
    pub fn resume(&mut self, events: &mut EventChannel) -> Result<Vec<ProviderCommand>> {
        if self.state != SessionState::Paused {
            return Err(Error::invalid_transition(self.state, "resume"));
        }

        let generation = next_generation();
        self.generation = Some(generation);
        self.retry_attempt = 0;
        self.transition(SessionState::Running, events);

        Ok(vec![ProviderCommand::Subscribe {
            generation,
            request: ProviderRequest::from(&self.config),
        }])
    }

    /// Release the provider and end the run.
    ///
    /// A no-op for sessions that never started or already ended, so calling
    /// it twice emits a single `Stopped`.
    pub fn stop(&mut self, events: &mut EventChannel) -> Vec<ProviderCommand> {
        if self.state.is_terminal() || self.state == SessionState::Idle {
            return Vec::new();
        }

        let commands = self.release();
        self.transition(SessionState::Stopped, events);
        commands
    }

    /// The OS withdrew location permission
    pub fn on_permission_revoked(&mut self, events: &mut EventChannel) -> Vec<ProviderCommand> {
        match self.state {
            SessionState::Starting | SessionState::Running | SessionState::Paused => {
                self.fail(ErrorKind::PermissionRevoked, events)
            }
            _ => Vec::new(),
        }
    }

    // ─────────────────────────────────────────────────────────
    // Provider callbacks
    // ─────────────────────────────────────────────────────────

    /// The provider acknowledged `generation`
    pub fn on_subscribed(
        &mut self,
        generation: u64,
        events: &mut EventChannel,
    ) -> Vec<ProviderCommand> {
        if self.generation != Some(generation) {
            // Acked after we moved on; release it so it doesn't leak
            debug!("Releasing stale subscription #{generation}");
            return vec![ProviderCommand::Unsubscribe { generation }];
        }

        self.subscribed = true;
        match self.state {
            SessionState::Starting => self.transition(SessionState::Running, events),
            SessionState::Running => debug!("Subscription #{generation} re-established"),
            _ => {}
        }
        Vec::new()
    }

    /// `subscribe` for `generation` returned an error
    pub fn on_subscribe_failed(
        &mut self,
        generation: u64,
        error: &ProviderError,
        events: &mut EventChannel,
    ) -> Vec<ProviderCommand> {
        if self.generation != Some(generation) {
            debug!("Ignoring subscribe failure for stale #{generation}: {error}");
            return Vec::new();
        }
        self.handle_error(error, events)
    }

    /// The provider reported an error for a live subscription
    pub fn on_provider_error(
        &mut self,
        generation: u64,
        error: &ProviderError,
        events: &mut EventChannel,
    ) -> Vec<ProviderCommand> {
        if self.generation != Some(generation) || self.retry_pending {
            debug!("Ignoring provider error from stale #{generation}: {error}");
            return Vec::new();
        }
        self.handle_error(error, events)
    }

    /// Backoff for `generation` elapsed
    pub fn on_retry_elapsed(&mut self, generation: u64) -> Vec<ProviderCommand> {
        if !self.retry_pending || self.generation != Some(generation) || !self.state.is_active() {
            debug!("Ignoring retry timer for stale #{generation}");
            return Vec::new();
        }

        self.retry_pending = false;
        info!(
            "Resubscribing as #{generation} (attempt {})",
            self.retry_attempt
        );
        vec![ProviderCommand::Subscribe {
            generation,
            request: ProviderRequest::from(&self.config),
        }]
    }

    /// A fix arrived for `generation`. Returns `true` if it was forwarded.
    ///
    /// Fixes older than the last forwarded one are dropped, never reordered.
    pub fn on_fix(&mut self, generation: u64, fix: LocationFix, events: &mut EventChannel) -> bool {
        if self.state != SessionState::Running || self.generation != Some(generation) {
            trace!(
                "Dropping fix from #{generation} (session {}, current {:?})",
                self.state,
                self.generation
            );
            return false;
        }

        if let Some(last) = &self.last_fix {
            if fix.timestamp_millis < last.timestamp_millis {
                debug!(
                    "Dropping out-of-order fix at {} (last delivered {})",
                    fix.timestamp_millis, last.timestamp_millis
                );
                return false;
            }
        }

        self.retry_attempt = 0;
        self.last_fix = Some(fix.clone());
        events.emit(SessionEvent::LocationUpdate(fix));
        true
    }

    // ─────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────

    fn handle_error(
        &mut self,
        error: &ProviderError,
        events: &mut EventChannel,
    ) -> Vec<ProviderCommand> {
        if error.is_transient() {
            warn!("Transient provider error, will resubscribe: {error}");
            self.schedule_retry()
        } else {
            error!("Permanent provider error: {error}");
            self.fail(error.error_kind(), events)
        }
    }

    fn schedule_retry(&mut self) -> Vec<ProviderCommand> {
        let mut commands = self.release();
        self.retry_attempt = self.retry_attempt.saturating_add(1);

        let generation = next_generation();
        self.generation = Some(generation);
        self.retry_pending = true;
        commands.push(ProviderCommand::ScheduleRetry {
            generation,
            attempt: self.retry_attempt,
        });
        commands
    }

    fn fail(&mut self, reason: ErrorKind, events: &mut EventChannel) -> Vec<ProviderCommand> {
        let commands = self.release();
        events.emit(SessionEvent::Error(reason));
        self.transition(SessionState::Failed(reason), events);
        commands
    }

    /// Drop the current generation, unsubscribing if one was issued
    fn release(&mut self) -> Vec<ProviderCommand> {
        let pending_retry = std::mem::take(&mut self.retry_pending);
        self.subscribed = false;
        match self.generation.take() {
            // A generation waiting on its timer was never subscribed
            Some(_) if pending_retry => Vec::new(),
            Some(generation) => vec![ProviderCommand::Unsubscribe { generation }],
            None => Vec::new(),
        }
    }

    fn transition(&mut self, next: SessionState, events: &mut EventChannel) {
        if next == self.state {
            return;
        }
        if !self.state.can_transition_to(&next) {
            warn!("Unexpected session transition {} -> {}", self.state, next);
        }
        debug!("Session {} -> {}", self.state, next);
        self.state = next;
        events.emit(SessionEvent::StateChanged(next));
    }
}
