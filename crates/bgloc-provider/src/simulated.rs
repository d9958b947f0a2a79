//! In-process provider driven by explicit pushes
//!
//! Used by the headless scenario runner and by tests. Fixes and errors are
//! injected with [`SimulatedProvider::push_fix`] / [`SimulatedProvider::push_error`]
//! and fanned out to every live subscription, tagged with that subscription's
//! generation.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bgloc_core::prelude::*;
use bgloc_core::LocationFix;

use crate::provider::{
    LocationProvider, ProviderError, ProviderRequest, ProviderUpdate, UpdateSink,
};

#[derive(Debug)]
struct Subscription {
    request: ProviderRequest,
    sink: UpdateSink,
}

#[derive(Debug, Default)]
struct SimulatedState {
    /// When `Some`, location services are off and `subscribe` fails with this error
    unavailable: Option<ProviderError>,
    /// One-shot rejection for the next `subscribe` call
    reject_next: Option<ProviderError>,
    subscriptions: BTreeMap<u64, Subscription>,
    subscribe_calls: usize,
    unsubscribe_calls: usize,
}

/// Scriptable [`LocationProvider`]
///
/// Cheap to clone; clones share the same subscriptions.
#[derive(Debug, Clone, Default)]
pub struct SimulatedProvider {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Toggle location services. Turning them off does not end live
    /// subscriptions; push an error for that.
    pub fn set_available(&self, available: bool) {
        let mut state = self.lock();
        state.unavailable = if available {
            None
        } else {
            Some(ProviderError::disabled("location services are disabled"))
        };
    }

    /// Make the next `subscribe` call fail with `error`
    pub fn reject_next_subscribe(&self, error: ProviderError) {
        self.lock().reject_next = Some(error);
    }

    /// Deliver a fix to every live subscription. Returns how many received it.
    pub fn push_fix(&self, fix: LocationFix) -> usize {
        self.broadcast(|generation| ProviderUpdate::fix(generation, fix.clone()))
    }

    /// Deliver an error to every live subscription. Returns how many received it.
    pub fn push_error(&self, error: ProviderError) -> usize {
        self.broadcast(|generation| ProviderUpdate::error(generation, error.clone()))
    }

    fn broadcast(&self, make: impl Fn(u64) -> ProviderUpdate) -> usize {
        let state = self.lock();
        let mut delivered = 0;
        for (generation, subscription) in &state.subscriptions {
            match subscription.sink.try_send(make(*generation)) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Simulated provider: dropping update for #{generation}: {e}"),
            }
        }
        if state.subscriptions.is_empty() {
            debug!("Simulated provider: no live subscriptions, update dropped");
        }
        delivered
    }

    /// Generations with a live subscription, oldest first
    pub fn active_generations(&self) -> Vec<u64> {
        self.lock().subscriptions.keys().copied().collect()
    }

    /// Request of the live subscription for `generation`
    pub fn request_for(&self, generation: u64) -> Option<ProviderRequest> {
        self.lock()
            .subscriptions
            .get(&generation)
            .map(|s| s.request.clone())
    }

    pub fn subscribe_calls(&self) -> usize {
        self.lock().subscribe_calls
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.lock().unsubscribe_calls
    }
}

impl LocationProvider for SimulatedProvider {
    async fn subscribe(
        &self,
        generation: u64,
        request: ProviderRequest,
        sink: UpdateSink,
    ) -> std::result::Result<(), ProviderError> {
        let mut state = self.lock();
        state.subscribe_calls += 1;

        if let Some(error) = state.reject_next.take() {
            info!("Simulated provider: rejecting subscription #{generation}: {error}");
            return Err(error);
        }
        if let Some(error) = state.unavailable.clone() {
            info!("Simulated provider: unavailable for subscription #{generation}");
            return Err(error);
        }

        debug!(
            "Simulated provider: subscription #{generation} every {:?} ({})",
            request.interval, request.accuracy
        );
        state
            .subscriptions
            .insert(generation, Subscription { request, sink });
        Ok(())
    }

    async fn unsubscribe(&self, generation: u64) {
        let mut state = self.lock();
        state.unsubscribe_calls += 1;
        if state.subscriptions.remove(&generation).is_some() {
            debug!("Simulated provider: subscription #{generation} released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderErrorKind, ProviderEvent};
    use bgloc_core::TrackingConfig;
    use tokio::sync::mpsc;

    fn request() -> ProviderRequest {
        ProviderRequest::from(&TrackingConfig::default())
    }

    #[tokio::test]
    async fn test_subscribe_and_push_fix() {
        let provider = SimulatedProvider::new();
        let (tx, mut rx) = mpsc::channel(8);

        provider.subscribe(7, request(), tx).await.unwrap();
        assert_eq!(provider.active_generations(), vec![7]);

        let delivered = provider.push_fix(LocationFix::new(1.0, 2.0, 100));
        assert_eq!(delivered, 1);

        let update = rx.recv().await.unwrap();
        assert_eq!(update.generation, 7);
        assert!(matches!(update.event, ProviderEvent::Fix(ref f) if f.timestamp_millis == 100));
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let provider = SimulatedProvider::new();
        let (tx, _rx) = mpsc::channel(8);

        provider.subscribe(3, request(), tx).await.unwrap();
        provider.unsubscribe(3).await;

        assert!(provider.active_generations().is_empty());
        assert_eq!(provider.push_fix(LocationFix::new(0.0, 0.0, 1)), 0);
        assert_eq!(provider.unsubscribe_calls(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_provider_rejects_subscribe() {
        let provider = SimulatedProvider::new();
        provider.set_available(false);
        let (tx, _rx) = mpsc::channel(8);

        let err = provider.subscribe(1, request(), tx).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Disabled);
        assert!(provider.active_generations().is_empty());
    }

    #[tokio::test]
    async fn test_reject_next_is_one_shot() {
        let provider = SimulatedProvider::new();
        provider.reject_next_subscribe(ProviderError::signal_lost("cold start"));
        let (tx, _rx) = mpsc::channel(8);

        tokio_test::assert_err!(provider.subscribe(1, request(), tx.clone()).await);
        tokio_test::assert_ok!(provider.subscribe(2, request(), tx).await);
        assert_eq!(provider.subscribe_calls(), 2);
    }

    #[tokio::test]
    async fn test_push_error_tags_generation() {
        let provider = SimulatedProvider::new();
        let (tx, mut rx) = mpsc::channel(8);
        provider.subscribe(11, request(), tx).await.unwrap();

        provider.push_error(ProviderError::signal_lost("tunnel"));

        let update = rx.recv().await.unwrap();
        assert_eq!(update.generation, 11);
        assert!(matches!(update.event, ProviderEvent::Error(ref e) if e.is_transient()));
    }

    #[test]
    fn test_push_without_subscribers_drops() {
        let provider = SimulatedProvider::new();
        assert_eq!(provider.push_fix(LocationFix::new(0.0, 0.0, 0)), 0);
    }

    #[tokio::test]
    async fn test_request_for_returns_subscription_request() {
        let provider = SimulatedProvider::new();
        let (tx, _rx) = mpsc::channel(1);
        provider.subscribe(5, request(), tx).await.unwrap();
        assert_eq!(provider.request_for(5), Some(request()));
        assert_eq!(provider.request_for(6), None);
    }
}
