//! Action handlers: UpdateAction dispatch and background task spawning

use std::sync::Arc;

use tokio::sync::mpsc;

use bgloc_core::prelude::*;
use bgloc_provider::{BackoffPolicy, LocationProvider, UpdateSink};

use crate::handler::UpdateAction;
use crate::message::Message;
use crate::session::ProviderCommand;

/// Execute an action by spawning a background task
///
/// Outcomes come back to the loop as messages on `msg_tx`.
pub fn handle_action<P>(
    action: UpdateAction,
    provider: &Arc<P>,
    msg_tx: mpsc::Sender<Message>,
    update_tx: &UpdateSink,
    backoff: &BackoffPolicy,
) where
    P: LocationProvider + Send + Sync + 'static,
{
    match action {
        UpdateAction::Provider(ProviderCommand::Subscribe {
            generation,
            request,
        }) => {
            let provider = Arc::clone(provider);
            let sink = update_tx.clone();
            tokio::spawn(async move {
                let message = match provider.subscribe(generation, request, sink).await {
                    Ok(()) => Message::SubscriptionAcked { generation },
                    Err(error) => Message::SubscriptionFailed { generation, error },
                };
                report(&msg_tx, message).await;
            });
        }

        UpdateAction::Provider(ProviderCommand::Unsubscribe { generation }) => {
            let provider = Arc::clone(provider);
            tokio::spawn(async move {
                provider.unsubscribe(generation).await;
            });
        }

        UpdateAction::Provider(ProviderCommand::ScheduleRetry {
            generation,
            attempt,
        }) => {
            let delay = backoff.delay(attempt);
            info!(
                "Retrying subscription as #{} in {:?} (attempt {})",
                generation, delay, attempt
            );
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                report(&msg_tx, Message::RetryElapsed { generation }).await;
            });
        }

        UpdateAction::AwaitPermission {
            token,
            response_rx,
            timeout,
            reply,
        } => {
            tokio::spawn(async move {
                let mut response_rx = response_rx;
                let result = match tokio::time::timeout(timeout, &mut response_rx).await {
                    Ok(Ok(state)) => Ok(state),
                    // Sender dropped: stop() or engine detach retired the token
                    Ok(Err(_)) => Err(Error::PermissionCancelled),
                    Err(_) => {
                        // An answer may already be queued; the loop settles it
                        let message = Message::PermissionTimedOut {
                            token,
                            timeout,
                            response_rx,
                            reply,
                        };
                        report(&msg_tx, message).await;
                        return;
                    }
                };
                let _ = reply.send(result);
            });
        }
    }
}

/// Hand a task outcome back to the loop
async fn report(msg_tx: &mpsc::Sender<Message>, message: Message) {
    if let Err(e) = msg_tx
        .send(message)
        .await
        .map_err(|e| Error::channel_send(e.to_string()))
    {
        debug!("Dropping task outcome, loop has stopped: {}", e);
    }
}
