use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use super::store::ResultStore;
use super::ScanEvent;

/// Subscription to "scan results available" notifications.
///
/// The subscription lives exactly as long as this value; dropping it stops
/// the listening task.
pub struct ScanResultListener {
    task: JoinHandle<()>,
}

impl ScanResultListener {
    pub fn register(store: Arc<ResultStore>, mut events: broadcast::Receiver<ScanEvent>) -> Self {
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => Self::handle(&store, event).await,
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!("Scan listener fell behind, {} notifications missed", missed);
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!("Scan notification source closed");
                        break;
                    }
                }
            }
        });

        tracing::debug!("Scan result listener registered");
        Self { task }
    }

    async fn handle(store: &ResultStore, event: ScanEvent) {
        if event.success {
            // Failures are logged inside refresh.
            let _ = store.refresh().await;
        } else {
            tracing::info!(
                "Scan at {} did not complete, keeping {} previous results",
                event.at,
                store.current_results().len()
            );
        }
    }
}

impl Drop for ScanResultListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wifi::auth::AuthorizationGate;
    use crate::wifi::context::WifiContext;
    use crate::wifi::platform::RadioScanner;
    use crate::wifi::testing::{descriptor, FakeAuthorizer, FakeRadio, SnapshotScript};
    use tokio::time::{timeout, Duration};

    async fn granted_store(radio: Arc<FakeRadio>) -> Arc<ResultStore> {
        let gate = AuthorizationGate::new(
            Arc::new(WifiContext::new()),
            Arc::new(FakeAuthorizer::already_granted()),
        );
        gate.ensure_authorized().await;
        Arc::new(ResultStore::new(gate, radio))
    }

    #[tokio::test]
    async fn test_successful_scan_refreshes_results() {
        let coffee = descriptor("CoffeeShop", "AA:BB:CC:00:11:22");
        let radio = Arc::new(FakeRadio::new(vec![coffee.clone()]));
        let store = granted_store(radio.clone()).await;
        let mut rx = store.subscribe();
        let _listener = ScanResultListener::register(store.clone(), radio.subscribe());

        radio.emit(true);

        timeout(Duration::from_millis(500), rx.changed())
            .await
            .expect("Timeout waiting for refresh")
            .expect("Result channel closed");
        assert_eq!(store.current_results(), vec![coffee]);
    }

    #[tokio::test]
    async fn test_failed_scan_keeps_existing_results() {
        let coffee = descriptor("CoffeeShop", "AA:BB:CC:00:11:22");
        let radio = Arc::new(FakeRadio::new(vec![coffee.clone()]));
        let store = granted_store(radio.clone()).await;
        store.refresh().await.unwrap();

        radio.set_snapshot(SnapshotScript::Networks(Vec::new()));
        ScanResultListener::handle(&store, ScanEvent::new(false)).await;

        assert_eq!(store.current_results(), vec![coffee]);
        assert_eq!(radio.reads(), 1);
    }

    #[tokio::test]
    async fn test_failed_notification_never_reads_snapshot() {
        let library = descriptor("Library", "AA:BB:CC:00:11:33");
        let radio = Arc::new(FakeRadio::new(vec![library.clone()]));
        let store = granted_store(radio.clone()).await;
        let mut rx = store.subscribe();
        let _listener = ScanResultListener::register(store.clone(), radio.subscribe());

        // Notifications are handled in order, so once the success has been
        // applied the failure before it has been handled too.
        radio.emit(false);
        radio.emit(true);

        timeout(Duration::from_millis(500), rx.changed())
            .await
            .expect("Timeout waiting for refresh")
            .expect("Result channel closed");
        assert_eq!(radio.reads(), 1);
        assert_eq!(store.current_results(), vec![library]);
    }

    #[tokio::test]
    async fn test_listener_keeps_going_after_falling_behind() {
        let coffee = descriptor("CoffeeShop", "AA:BB:CC:00:11:22");
        let radio = Arc::new(FakeRadio::new(vec![coffee.clone()]));
        let store = granted_store(radio.clone()).await;
        let mut rx = store.subscribe();
        let _listener = ScanResultListener::register(store.clone(), radio.subscribe());

        // More notifications than the channel holds, before the listener runs.
        for _ in 0..40 {
            radio.emit(true);
        }

        timeout(Duration::from_millis(500), rx.changed())
            .await
            .expect("Timeout waiting for refresh")
            .expect("Result channel closed");
        assert_eq!(store.current_results(), vec![coffee]);
    }

    #[tokio::test]
    async fn test_dropping_listener_ends_subscription() {
        let radio = Arc::new(FakeRadio::new(vec![descriptor("CoffeeShop", "AA:BB:CC:00:11:22")]));
        let store = granted_store(radio.clone()).await;
        let listener = ScanResultListener::register(store.clone(), radio.subscribe());

        drop(listener);
        tokio::task::yield_now().await;
        radio.emit(true);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(radio.reads(), 0);
        assert!(store.current_results().is_empty());
    }
}
