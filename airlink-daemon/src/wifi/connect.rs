/*!
 * Connection Coordinator
 * Scoped network requests and process-wide traffic binding
 */

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::context::WifiContext;
use super::platform::{NetworkBinder, NetworkRequester, Platform};
use super::{
    AttemptId, AttemptRecord, AttemptState, Binding, ConnectionOutcome, ConnectionRequest,
    NetworkDescriptor, NetworkHandle, PlatformTier,
};
use crate::error::WifiError;

#[derive(Debug)]
enum NetworkEvent {
    Available(NetworkHandle),
    Unavailable,
    Lost(NetworkHandle),
}

enum Dispatch {
    Register {
        id: AttemptId,
        request: ConnectionRequest,
        outcome: oneshot::Sender<ConnectionOutcome>,
    },
    Callback {
        id: AttemptId,
        event: NetworkEvent,
    },
    Expired {
        id: AttemptId,
    },
}

/// Callback surface handed to the platform with each request.
///
/// Every call lands on the coordinator's single dispatch queue, so the
/// order in which the platform fires callbacks is the order in which they
/// take effect.
#[derive(Clone)]
pub struct NetworkCallback {
    id: AttemptId,
    dispatch: mpsc::UnboundedSender<Dispatch>,
}

impl NetworkCallback {
    pub fn attempt(&self) -> AttemptId {
        self.id
    }

    pub fn on_available(&self, handle: NetworkHandle) {
        self.deliver(NetworkEvent::Available(handle));
    }

    pub fn on_unavailable(&self) {
        self.deliver(NetworkEvent::Unavailable);
    }

    pub fn on_lost(&self, handle: NetworkHandle) {
        self.deliver(NetworkEvent::Lost(handle));
    }

    fn deliver(&self, event: NetworkEvent) {
        if self.dispatch.send(Dispatch::Callback { id: self.id, event }).is_err() {
            tracing::debug!("Callback for attempt {} after coordinator shutdown", self.id);
        }
    }
}

/// Handle on one in-flight connection attempt.
#[derive(Debug)]
pub struct ConnectionAttempt {
    pub id: AttemptId,
    outcome: oneshot::Receiver<ConnectionOutcome>,
}

impl ConnectionAttempt {
    /// Waits for the attempt to settle.
    pub async fn outcome(self) -> ConnectionOutcome {
        self.outcome.await.unwrap_or(ConnectionOutcome::Abandoned)
    }
}

pub struct ConnectionCoordinator {
    tier: PlatformTier,
    requester: Option<Arc<dyn NetworkRequester>>,
    dispatch: mpsc::UnboundedSender<Dispatch>,
    task: JoinHandle<()>,
}

impl ConnectionCoordinator {
    /// Starts the dispatch task. `timeout` bounds how long an attempt may
    /// stay unanswered; `None` waits forever.
    pub fn start(ctx: Arc<WifiContext>, platform: &Platform, timeout: Option<Duration>) -> Self {
        let (dispatch, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher {
            ctx,
            binder: platform.binder.clone(),
            timeout,
            attempts: HashMap::new(),
            expired: HashMap::new(),
            dispatch: dispatch.clone(),
        };
        let task = tokio::spawn(dispatcher.run(rx));

        Self {
            tier: platform.tier,
            requester: platform.requester.clone(),
            dispatch,
            task,
        }
    }

    /// Requests a connection to exactly this SSID and BSSID.
    ///
    /// Returns without waiting for the platform. Overlapping attempts are
    /// not deduplicated; whichever is granted last owns the binding.
    pub fn connect(&self, descriptor: &NetworkDescriptor) -> Result<ConnectionAttempt, WifiError> {
        let requester = match &self.requester {
            Some(requester) if self.tier.supports_scoped_requests() => requester,
            _ => {
                tracing::error!(
                    "Cannot connect to {}: scoped requests unavailable on the {} tier",
                    descriptor.display_name(),
                    self.tier
                );
                return Err(WifiError::CapabilityUnsupported {
                    operation: "scoped connection request",
                    tier: self.tier,
                });
            }
        };

        let request = ConnectionRequest::scoped(descriptor)?;
        let id = Uuid::new_v4();
        let (outcome_tx, outcome_rx) = oneshot::channel();

        // Registration is queued ahead of any callback the platform can fire.
        self.dispatch
            .send(Dispatch::Register {
                id,
                request: request.clone(),
                outcome: outcome_tx,
            })
            .map_err(|_| WifiError::ConnectionAbandoned(descriptor.display_name().to_string()))?;

        let callback = NetworkCallback {
            id,
            dispatch: self.dispatch.clone(),
        };

        tracing::info!("Requesting network {} ({}), attempt {}", request.ssid, request.bssid, id);
        if let Err(e) = requester.request_network(request, callback.clone()) {
            tracing::warn!("Network request for attempt {} was not accepted: {}", id, e);
            callback.on_unavailable();
        }

        Ok(ConnectionAttempt {
            id,
            outcome: outcome_rx,
        })
    }
}

impl Drop for ConnectionCoordinator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Attempt {
    request: ConnectionRequest,
    started_at: chrono::DateTime<Utc>,
    outcome: oneshot::Sender<ConnectionOutcome>,
    timer: Option<JoinHandle<()>>,
}

/// An attempt we stopped waiting for while the platform may still answer.
struct Expired {
    request: ConnectionRequest,
    started_at: chrono::DateTime<Utc>,
}

/// Sole writer of the traffic binding.
struct Dispatcher {
    ctx: Arc<WifiContext>,
    binder: Arc<dyn NetworkBinder>,
    timeout: Option<Duration>,
    attempts: HashMap<AttemptId, Attempt>,
    expired: HashMap<AttemptId, Expired>,
    dispatch: mpsc::UnboundedSender<Dispatch>,
}

impl Dispatcher {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Dispatch>) {
        while let Some(message) = rx.recv().await {
            match message {
                Dispatch::Register { id, request, outcome } => self.register(id, request, outcome),
                Dispatch::Callback { id, event } => self.on_event(id, event).await,
                Dispatch::Expired { id } => {
                    if let Some(attempt) = self.attempts.get(&id) {
                        tracing::debug!(
                            "No answer for {} ({}) within {:?}, giving up",
                            attempt.request.ssid,
                            attempt.request.bssid,
                            self.timeout.unwrap_or_default()
                        );
                        self.settle(id, ConnectionOutcome::Abandoned);
                    }
                }
            }
        }
    }

    fn register(
        &mut self,
        id: AttemptId,
        request: ConnectionRequest,
        outcome: oneshot::Sender<ConnectionOutcome>,
    ) {
        let timer = self.timeout.map(|timeout| {
            let dispatch = self.dispatch.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let _ = dispatch.send(Dispatch::Expired { id });
            })
        });

        let started_at = Utc::now();
        self.ctx.record_attempt(AttemptRecord {
            id,
            ssid: request.ssid.clone(),
            bssid: request.bssid,
            state: AttemptState::Requested,
            started_at,
        });
        self.attempts.insert(
            id,
            Attempt {
                request,
                started_at,
                outcome,
                timer,
            },
        );
    }

    async fn on_event(&mut self, id: AttemptId, event: NetworkEvent) {
        match event {
            NetworkEvent::Available(handle) => self.on_available(id, handle).await,
            NetworkEvent::Unavailable => self.on_unavailable(id),
            NetworkEvent::Lost(handle) => self.on_lost(handle),
        }
    }

    async fn on_available(&mut self, id: AttemptId, handle: NetworkHandle) {
        if let Some(attempt) = self.attempts.get(&id) {
            let request = attempt.request.clone();
            let outcome = if self.bind(&request, &handle).await {
                ConnectionOutcome::Bound(handle)
            } else {
                ConnectionOutcome::Rejected
            };
            self.settle(id, outcome);
            return;
        }

        // The platform joined after we gave up; the device is on that network
        // now, so traffic has to follow it.
        let Some(expired) = self.expired.remove(&id) else {
            tracing::debug!("Ignoring late availability of network {} for attempt {}", handle.net_id, id);
            return;
        };
        tracing::info!("Attempt {} answered after it was abandoned", id);
        let still_latest = self.ctx.last_attempt().is_some_and(|record| record.id == id);
        if self.bind(&expired.request, &handle).await && still_latest {
            self.ctx.record_attempt(AttemptRecord {
                id,
                ssid: expired.request.ssid,
                bssid: expired.request.bssid,
                state: AttemptState::Bound(handle),
                started_at: expired.started_at,
            });
        }
    }

    /// Routes all traffic through `handle`. Returns whether it worked.
    async fn bind(&self, request: &ConnectionRequest, handle: &NetworkHandle) -> bool {
        match self.binder.bind_all_traffic_to(handle).await {
            Ok(()) => {
                tracing::info!(
                    "Connected to {} ({}), traffic bound to network {} on {}",
                    request.ssid,
                    request.bssid,
                    handle.net_id,
                    handle.interface
                );
                self.ctx.set_binding(Binding {
                    handle: handle.clone(),
                    ssid: request.ssid.clone(),
                    bssid: request.bssid,
                });
                true
            }
            Err(e) => {
                tracing::error!("Network {} became available but binding failed: {}", request.ssid, e);
                false
            }
        }
    }

    fn on_unavailable(&mut self, id: AttemptId) {
        if self.expired.remove(&id).is_some() {
            tracing::debug!("Platform gave up on abandoned attempt {}", id);
            return;
        }
        if !self.attempts.contains_key(&id) {
            tracing::debug!("Ignoring late rejection for attempt {}", id);
            return;
        }
        self.settle(id, ConnectionOutcome::Rejected);
    }

    fn on_lost(&mut self, handle: NetworkHandle) {
        if self.ctx.clear_binding(&handle) {
            tracing::warn!("Bound network {} on {} was lost", handle.net_id, handle.interface);
        }
    }

    fn settle(&mut self, id: AttemptId, outcome: ConnectionOutcome) {
        let Some(attempt) = self.attempts.remove(&id) else {
            return;
        };
        if let Some(timer) = attempt.timer {
            timer.abort();
        }

        let failure = match &outcome {
            ConnectionOutcome::Bound(_) => None,
            ConnectionOutcome::Rejected => Some(WifiError::ConnectionRejected(attempt.request.ssid.clone())),
            ConnectionOutcome::Abandoned => Some(WifiError::ConnectionAbandoned(attempt.request.ssid.clone())),
        };
        if let Some(e) = failure {
            tracing::warn!("Attempt {} ({}): {}", id, attempt.request.bssid, e);
        }

        self.ctx.record_attempt(AttemptRecord {
            id,
            ssid: attempt.request.ssid.clone(),
            bssid: attempt.request.bssid,
            state: outcome.clone().into(),
            started_at: attempt.started_at,
        });
        if outcome == ConnectionOutcome::Abandoned {
            self.expired.insert(
                id,
                Expired {
                    request: attempt.request,
                    started_at: attempt.started_at,
                },
            );
        }
        let _ = attempt.outcome.send(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wifi::testing::{descriptor, handle, FakePlatform, FakeRequester, RecordingBinder};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_millis(500);

    fn coffee() -> NetworkDescriptor {
        descriptor("CoffeeShop", "AA:BB:CC:00:11:22")
    }

    fn library() -> NetworkDescriptor {
        descriptor("Library", "AA:BB:CC:00:11:33")
    }

    #[tokio::test]
    async fn test_immediate_grant_binds_traffic() {
        let mut fakes = FakePlatform::new(PlatformTier::Managed);
        fakes.requester = Arc::new(FakeRequester::answering_immediately(handle(7)));
        let ctx = Arc::new(WifiContext::new());
        let coordinator = ConnectionCoordinator::start(ctx.clone(), &fakes.platform(), None);

        let attempt = coordinator.connect(&coffee()).unwrap();
        let outcome = timeout(WAIT, attempt.outcome()).await.expect("Timeout");

        assert_eq!(outcome, ConnectionOutcome::Bound(handle(7)));
        assert_eq!(ctx.binding(), Some(handle(7)));
        assert_eq!(fakes.binder.history(), vec![handle(7)]);
    }

    #[tokio::test]
    async fn test_request_is_scoped_to_one_access_point() {
        let fakes = FakePlatform::new(PlatformTier::Managed);
        let coordinator =
            ConnectionCoordinator::start(Arc::new(WifiContext::new()), &fakes.platform(), None);

        coordinator.connect(&coffee()).unwrap();

        let requests = fakes.requester.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].ssid, "CoffeeShop");
        assert_eq!(requests[0].bssid.to_string(), "AA:BB:CC:00:11:22");
    }

    #[tokio::test]
    async fn test_legacy_tier_refuses_without_submitting() {
        let fakes = FakePlatform::new(PlatformTier::Legacy);
        let ctx = Arc::new(WifiContext::new());
        let coordinator = ConnectionCoordinator::start(ctx.clone(), &fakes.platform(), None);

        let result = coordinator.connect(&coffee());

        assert!(matches!(
            result,
            Err(WifiError::CapabilityUnsupported { tier: PlatformTier::Legacy, .. })
        ));
        assert_eq!(fakes.requester.submitted(), 0);
        assert!(ctx.last_attempt().is_none());
    }

    #[tokio::test]
    async fn test_last_granted_attempt_wins_binding() {
        let fakes = FakePlatform::new(PlatformTier::Managed);
        let ctx = Arc::new(WifiContext::new());
        let coordinator = ConnectionCoordinator::start(ctx.clone(), &fakes.platform(), None);

        let first = coordinator.connect(&coffee()).unwrap();
        let second = coordinator.connect(&library()).unwrap();

        // Second request answers first.
        fakes.requester.callback(1).on_available(handle(2));
        fakes.requester.callback(0).on_available(handle(1));

        assert_eq!(timeout(WAIT, first.outcome()).await.unwrap(), ConnectionOutcome::Bound(handle(1)));
        assert_eq!(timeout(WAIT, second.outcome()).await.unwrap(), ConnectionOutcome::Bound(handle(2)));
        assert_eq!(ctx.binding(), Some(handle(1)));
        assert_eq!(fakes.binder.history(), vec![handle(2), handle(1)]);
    }

    #[tokio::test]
    async fn test_reversed_fire_order_reverses_winner() {
        let fakes = FakePlatform::new(PlatformTier::Managed);
        let ctx = Arc::new(WifiContext::new());
        let coordinator = ConnectionCoordinator::start(ctx.clone(), &fakes.platform(), None);

        let first = coordinator.connect(&coffee()).unwrap();
        let second = coordinator.connect(&library()).unwrap();

        fakes.requester.callback(0).on_available(handle(1));
        fakes.requester.callback(1).on_available(handle(2));

        timeout(WAIT, first.outcome()).await.unwrap();
        timeout(WAIT, second.outcome()).await.unwrap();
        assert_eq!(ctx.binding(), Some(handle(2)));
    }

    #[tokio::test]
    async fn test_only_first_terminal_callback_counts() {
        let fakes = FakePlatform::new(PlatformTier::Managed);
        let ctx = Arc::new(WifiContext::new());
        let coordinator = ConnectionCoordinator::start(ctx.clone(), &fakes.platform(), None);

        let attempt = coordinator.connect(&coffee()).unwrap();
        let callback = fakes.requester.callback(0);
        callback.on_unavailable();
        callback.on_available(handle(3));

        assert_eq!(timeout(WAIT, attempt.outcome()).await.unwrap(), ConnectionOutcome::Rejected);

        // Flush the queue behind the late callback.
        let flush = coordinator.connect(&library()).unwrap();
        fakes.requester.callback(1).on_unavailable();
        timeout(WAIT, flush.outcome()).await.unwrap();

        assert_eq!(ctx.binding(), None);
        assert!(fakes.binder.history().is_empty());
    }

    #[tokio::test]
    async fn test_unsubmitted_request_is_rejected() {
        let mut fakes = FakePlatform::new(PlatformTier::Managed);
        fakes.requester = Arc::new(FakeRequester::refusing_submission());
        let coordinator =
            ConnectionCoordinator::start(Arc::new(WifiContext::new()), &fakes.platform(), None);

        let attempt = coordinator.connect(&coffee()).unwrap();
        assert_eq!(timeout(WAIT, attempt.outcome()).await.unwrap(), ConnectionOutcome::Rejected);
    }

    #[tokio::test]
    async fn test_binder_failure_rejects_attempt() {
        let mut fakes = FakePlatform::new(PlatformTier::Managed);
        fakes.binder = Arc::new(RecordingBinder::failing());
        let ctx = Arc::new(WifiContext::new());
        let coordinator = ConnectionCoordinator::start(ctx.clone(), &fakes.platform(), None);

        let attempt = coordinator.connect(&coffee()).unwrap();
        fakes.requester.callback(0).on_available(handle(4));

        assert_eq!(timeout(WAIT, attempt.outcome()).await.unwrap(), ConnectionOutcome::Rejected);
        assert_eq!(ctx.binding(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_attempt_is_abandoned_after_timeout() {
        let fakes = FakePlatform::new(PlatformTier::Managed);
        let ctx = Arc::new(WifiContext::new());
        let coordinator = ConnectionCoordinator::start(
            ctx.clone(),
            &fakes.platform(),
            Some(Duration::from_secs(30)),
        );

        let attempt = coordinator.connect(&coffee()).unwrap();
        let outcome = attempt.outcome().await;

        assert_eq!(outcome, ConnectionOutcome::Abandoned);
        assert_eq!(ctx.last_attempt().unwrap().state, AttemptState::Abandoned);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_after_timeout_still_binds_traffic() {
        let fakes = FakePlatform::new(PlatformTier::Managed);
        let ctx = Arc::new(WifiContext::new());
        let coordinator = ConnectionCoordinator::start(
            ctx.clone(),
            &fakes.platform(),
            Some(Duration::from_secs(30)),
        );

        let attempt = coordinator.connect(&coffee()).unwrap();
        assert_eq!(attempt.outcome().await, ConnectionOutcome::Abandoned);

        tokio::time::sleep(Duration::from_secs(15)).await;
        fakes.requester.callback(0).on_available(handle(7));

        // Settles behind the late answer in the queue.
        let flush = coordinator.connect(&library()).unwrap();
        fakes.requester.callback(1).on_unavailable();
        flush.outcome().await;

        assert_eq!(ctx.binding(), Some(handle(7)));
        assert_eq!(fakes.binder.history(), vec![handle(7)]);
        let bound = ctx.bound_network().unwrap();
        assert_eq!(bound.ssid, "CoffeeShop");
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_after_timeout_is_recorded_on_the_attempt() {
        let fakes = FakePlatform::new(PlatformTier::Managed);
        let ctx = Arc::new(WifiContext::new());
        let coordinator = ConnectionCoordinator::start(
            ctx.clone(),
            &fakes.platform(),
            Some(Duration::from_secs(30)),
        );

        let attempt = coordinator.connect(&coffee()).unwrap();
        let id = attempt.id;
        attempt.outcome().await;
        fakes.requester.callback(0).on_available(handle(7));

        while ctx.binding().is_none() {
            tokio::task::yield_now().await;
        }

        let record = ctx.last_attempt().unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.state, AttemptState::Bound(handle(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_join_leaves_newer_attempt_record() {
        let fakes = FakePlatform::new(PlatformTier::Managed);
        let ctx = Arc::new(WifiContext::new());
        let coordinator = ConnectionCoordinator::start(
            ctx.clone(),
            &fakes.platform(),
            Some(Duration::from_secs(30)),
        );

        coordinator.connect(&coffee()).unwrap().outcome().await;
        let newer = coordinator.connect(&library()).unwrap();
        let newer_id = newer.id;
        fakes.requester.callback(0).on_available(handle(7));

        while ctx.binding().is_none() {
            tokio::task::yield_now().await;
        }

        let record = ctx.last_attempt().unwrap();
        assert_eq!(record.id, newer_id);
        assert_eq!(record.state, AttemptState::Requested);
    }

    #[tokio::test]
    async fn test_hidden_network_cannot_be_requested() {
        let fakes = FakePlatform::new(PlatformTier::Managed);
        let coordinator =
            ConnectionCoordinator::start(Arc::new(WifiContext::new()), &fakes.platform(), None);

        let result = coordinator.connect(&descriptor("", "AA:BB:CC:00:11:22"));
        assert!(matches!(result, Err(WifiError::InvalidRequest(_))));
        assert_eq!(fakes.requester.submitted(), 0);
    }

    #[tokio::test]
    async fn test_lost_network_clears_binding() {
        let fakes = FakePlatform::new(PlatformTier::Managed);
        let ctx = Arc::new(WifiContext::new());
        let coordinator = ConnectionCoordinator::start(ctx.clone(), &fakes.platform(), None);

        let attempt = coordinator.connect(&coffee()).unwrap();
        let callback = fakes.requester.callback(0);
        callback.on_available(handle(5));
        timeout(WAIT, attempt.outcome()).await.unwrap();
        assert_eq!(ctx.binding(), Some(handle(5)));

        // The flush attempt settles behind the loss notification in the queue.
        let flush = coordinator.connect(&library()).unwrap();
        callback.on_lost(handle(5));
        fakes.requester.callback(1).on_unavailable();
        timeout(WAIT, flush.outcome()).await.unwrap();

        assert_eq!(ctx.binding(), None);
    }

    #[tokio::test]
    async fn test_last_attempt_tracks_newest_request() {
        let fakes = FakePlatform::new(PlatformTier::Managed);
        let ctx = Arc::new(WifiContext::new());
        let coordinator = ConnectionCoordinator::start(ctx.clone(), &fakes.platform(), None);

        let first = coordinator.connect(&coffee()).unwrap();
        let second = coordinator.connect(&library()).unwrap();
        let second_id = second.id;

        fakes.requester.callback(0).on_unavailable();
        timeout(WAIT, first.outcome()).await.unwrap();

        let record = ctx.last_attempt().unwrap();
        assert_eq!(record.id, second_id);
        assert_eq!(record.ssid, "Library");
        assert_eq!(record.state, AttemptState::Requested);
    }
}
