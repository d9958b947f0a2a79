//! Headless mode runner - plays a scenario against the service
//!
//! The service runs on a [`SimulatedProvider`] with a scripted activity that
//! answers permission prompts the way the scenario says. Every event the host
//! listener receives is written out as NDJSON.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use bgloc_core::prelude::Result;
use bgloc_core::{HostHandle, SessionEvent};
use bgloc_provider::SimulatedProvider;
use bgloc_service::{
    Engine, HostBinding, PermissionOutcome, PermissionPrompt, PermissionToken, ServiceHandle,
    ServiceRegistry, ServiceStatus, Settings,
};

use super::scenario::{Scenario, Step, StepAction};
use super::HeadlessEvent;

/// Activity stand-in that answers prompts after a fixed delay
struct ScriptedActivity {
    handle: ServiceHandle,
    answer: Option<PermissionOutcome>,
    delay: Duration,
}

impl PermissionPrompt for ScriptedActivity {
    fn launch_request(&self, token: PermissionToken) -> Result<()> {
        let Some(outcome) = self.answer else {
            debug!("Scripted activity leaving prompt {} unanswered", token);
            return Ok(());
        };

        let handle = self.handle.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = handle.on_permission_outcome(token, outcome).await {
                warn!("Scripted activity could not answer prompt {}: {}", token, e);
            }
        });
        Ok(())
    }
}

/// Run `scenario` to completion, writing events to `out`.
///
/// Returns the service status observed after the last step.
pub async fn run_scenario<W: Write>(
    scenario: &Scenario,
    settings: Settings,
    out: &mut W,
) -> Result<ServiceStatus> {
    info!("═══════════════════════════════════════════════════════");
    info!("Running scenario '{}' ({} steps)", scenario.name, scenario.steps.len());
    info!("═══════════════════════════════════════════════════════");

    let provider = SimulatedProvider::new();
    let engine = Engine::with_registry(
        provider.clone(),
        settings,
        ServiceRegistry::with_permission(scenario.initial_permission),
    );
    let (handle, join) = engine.spawn();

    handle
        .attach_engine(HostBinding::new(HostHandle(1), HostHandle(2)))
        .await?;
    let mut events = handle.attach_listener().await?;

    let activity: Arc<dyn PermissionPrompt> = Arc::new(ScriptedActivity {
        handle: handle.clone(),
        answer: scenario.permission_answer.outcome(),
        delay: Duration::from_millis(scenario.answer_delay_ms),
    });
    handle.attach_activity(Arc::downgrade(&activity)).await?;

    HeadlessEvent::scenario_started(&scenario.name, scenario.steps.len()).emit(out);

    for (index, step) in scenario.steps.iter().enumerate() {
        forward_events_for(&mut events, Duration::from_millis(step.after_ms), out).await;
        run_step(index, step, scenario, &handle, &provider, &activity, out).await;
    }
    forward_events_for(&mut events, Duration::from_millis(scenario.settle_ms), out).await;

    let status = handle.status().await?;
    handle.shutdown().await?;
    if let Err(e) = join.await {
        warn!("Engine task ended abnormally: {}", e);
    }

    // The listener closes once the engine has torn down
    while let Some(event) = events.recv().await {
        HeadlessEvent::from(event).emit(out);
    }
    HeadlessEvent::scenario_completed(status.clone()).emit(out);

    info!("Scenario '{}' finished: session {}", scenario.name, status.session);
    Ok(status)
}

/// Write listener events to `out` until `wait` has elapsed
async fn forward_events_for<W: Write>(
    events: &mut mpsc::Receiver<SessionEvent>,
    wait: Duration,
    out: &mut W,
) {
    let deadline = tokio::time::sleep(wait);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => match event {
                Some(event) => HeadlessEvent::from(event).emit(out),
                // Listener detached (engine detached); just wait out the step
                None => {
                    (&mut deadline).await;
                    break;
                }
            },
        }
    }
}

async fn run_step<W: Write>(
    index: usize,
    step: &Step,
    scenario: &Scenario,
    handle: &ServiceHandle,
    provider: &SimulatedProvider,
    activity: &Arc<dyn PermissionPrompt>,
    out: &mut W,
) {
    debug!("Step {}: {}", index, step.action.name());

    let result = match &step.action {
        StepAction::RequestPermission => match handle.request_permission().await {
            Ok(state) => {
                HeadlessEvent::permission_resolved(state).emit(out);
                Ok(())
            }
            Err(e) => Err(e),
        },
        StepAction::Start => match &scenario.tracking {
            Some(config) => handle.start_tracking(config.clone()).await,
            None => handle.start_tracking_with_defaults().await,
        },
        StepAction::Pause => handle.pause_tracking().await,
        StepAction::Resume => handle.resume_tracking().await,
        StepAction::Stop => handle.stop_tracking().await,
        StepAction::AttachActivity => handle.attach_activity(Arc::downgrade(activity)).await,
        StepAction::DetachActivity => handle.detach_activity().await,
        StepAction::RevokePermission => handle.on_permission_revoked().await,
        StepAction::DetachEngine => handle.detach_engine().await,
        StepAction::Fix { .. } => {
            if let Some(fix) = step.action.to_fix() {
                provider.push_fix(fix);
            }
            Ok(())
        }
        StepAction::ProviderError { .. } => {
            if let Some(error) = step.action.to_provider_error() {
                provider.push_error(error);
            }
            Ok(())
        }
        StepAction::SetProviderAvailable { available } => {
            provider.set_available(*available);
            Ok(())
        }
    };

    if let Err(e) = result {
        if e.is_fatal() {
            warn!("Step {} ({}): service is gone: {}", index, step.action.name(), e);
        } else {
            debug!("Step {} ({}) failed: {}", index, step.action.name(), e);
        }
        HeadlessEvent::command_failed(index, step.action.name(), &e).emit(out);
    }
}
