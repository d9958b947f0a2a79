//! Outbound event delivery to the host listener
//!
//! At most once, never buffered: with no listener attached, or with the
//! listener's queue full, the event is dropped.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use bgloc_core::prelude::*;
use bgloc_core::SessionEvent;

/// Create a bounded listener channel
pub fn listener_channel(
    capacity: usize,
) -> (mpsc::Sender<SessionEvent>, mpsc::Receiver<SessionEvent>) {
    mpsc::channel(capacity.max(1))
}

#[derive(Debug, Default)]
pub struct EventChannel {
    listener: Option<mpsc::Sender<SessionEvent>>,
    delivered: u64,
    dropped: u64,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `listener`, replacing any previous one
    pub fn attach_listener(&mut self, listener: mpsc::Sender<SessionEvent>) {
        if self.listener.replace(listener).is_some() {
            debug!("Event listener replaced");
        } else {
            debug!("Event listener attached");
        }
    }

    pub fn detach_listener(&mut self) {
        if self.listener.take().is_some() {
            debug!("Event listener detached");
        }
    }

    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    /// Deliver `event` to the listener. Returns `true` if it was queued.
    pub fn emit(&mut self, event: SessionEvent) -> bool {
        let Some(listener) = &self.listener else {
            trace!("No listener, dropping {} event", event.event_type());
            self.dropped += 1;
            return false;
        };

        match listener.try_send(event) {
            Ok(()) => {
                self.delivered += 1;
                true
            }
            Err(TrySendError::Full(event)) => {
                warn!("Listener queue full, dropping {} event", event.event_type());
                self.dropped += 1;
                false
            }
            Err(TrySendError::Closed(event)) => {
                debug!(
                    "Listener gone, dropping {} event and detaching",
                    event.event_type()
                );
                self.listener = None;
                self.dropped += 1;
                false
            }
        }
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }
}
