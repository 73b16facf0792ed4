//! Scriptable stand-ins for the platform traits.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use super::connect::NetworkCallback;
use super::platform::{AuthorizationService, NetworkBinder, NetworkRequester, Platform, RadioScanner};
use super::{
    ConnectionRequest, NetworkDescriptor, NetworkHandle, Permission, PlatformTier, ScanEvent,
};
use crate::error::PlatformError;

pub fn descriptor(ssid: &str, bssid: &str) -> NetworkDescriptor {
    NetworkDescriptor::new(ssid, bssid.parse().unwrap())
}

pub fn handle(net_id: u32) -> NetworkHandle {
    NetworkHandle {
        net_id,
        interface: "wlan0".to_string(),
        gateway: None,
    }
}

/// Grants stick once a prompt succeeds, the way platform grants do.
pub struct FakeAuthorizer {
    checked: AtomicBool,
    granted: Mutex<Vec<Permission>>,
    prompts: AtomicUsize,
}

impl FakeAuthorizer {
    fn with(checked: bool, granted: Vec<Permission>) -> Self {
        Self {
            checked: AtomicBool::new(checked),
            granted: Mutex::new(granted),
            prompts: AtomicUsize::new(0),
        }
    }

    pub fn already_granted() -> Self {
        Self::with(true, vec![Permission::ScanResults, Permission::NetworkControl])
    }

    pub fn answering(grant: bool) -> Self {
        let granted = if grant {
            vec![Permission::ScanResults, Permission::NetworkControl]
        } else {
            Vec::new()
        };
        Self::with(false, granted)
    }

    pub fn granting_only(permission: Permission) -> Self {
        Self::with(false, vec![permission])
    }

    /// Withdraws the grant; later prompts are declined.
    pub fn revoke(&self) {
        self.checked.store(false, Ordering::SeqCst);
        self.granted.lock().unwrap().clear();
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthorizationService for FakeAuthorizer {
    fn check(&self, _permissions: &[Permission]) -> bool {
        self.checked.load(Ordering::SeqCst)
    }

    async fn request(&self, permissions: &[Permission]) -> HashMap<Permission, bool> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let granted = self.granted.lock().unwrap();
        let answers: HashMap<Permission, bool> = permissions
            .iter()
            .map(|permission| (*permission, granted.contains(permission)))
            .collect();
        if answers.values().all(|ok| *ok) {
            self.checked.store(true, Ordering::SeqCst);
        }
        answers
    }
}

pub enum SnapshotScript {
    Networks(Vec<NetworkDescriptor>),
    Unauthorized,
}

pub struct FakeRadio {
    snapshot: Mutex<SnapshotScript>,
    trigger_answer: Mutex<Option<Result<bool, PlatformError>>>,
    triggers: AtomicUsize,
    reads: AtomicUsize,
    events: broadcast::Sender<ScanEvent>,
}

impl FakeRadio {
    pub fn new(networks: Vec<NetworkDescriptor>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            snapshot: Mutex::new(SnapshotScript::Networks(networks)),
            trigger_answer: Mutex::new(None),
            triggers: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            events,
        }
    }

    pub fn set_snapshot(&self, script: SnapshotScript) {
        *self.snapshot.lock().unwrap() = script;
    }

    /// Answer for the next trigger; defaults to `Ok(true)`.
    pub fn answer_next_trigger(&self, answer: Result<bool, PlatformError>) {
        *self.trigger_answer.lock().unwrap() = Some(answer);
    }

    pub fn emit(&self, success: bool) {
        let _ = self.events.send(ScanEvent::new(success));
    }

    pub fn triggers(&self) -> usize {
        self.triggers.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RadioScanner for FakeRadio {
    async fn trigger_scan(&self) -> Result<bool, PlatformError> {
        self.triggers.fetch_add(1, Ordering::SeqCst);
        self.trigger_answer.lock().unwrap().take().unwrap_or(Ok(true))
    }

    async fn current_snapshot(&self) -> Result<Vec<NetworkDescriptor>, PlatformError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match &*self.snapshot.lock().unwrap() {
            SnapshotScript::Networks(networks) => Ok(networks.clone()),
            SnapshotScript::Unauthorized => Err(PlatformError::Unauthorized),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }
}

/// Holds on to every callback so a test decides when and in which order
/// they fire.
#[derive(Default)]
pub struct FakeRequester {
    submitted: Mutex<Vec<(ConnectionRequest, NetworkCallback)>>,
    answer_immediately: Mutex<Option<NetworkHandle>>,
    refuse_submission: AtomicBool,
}

impl FakeRequester {
    pub fn answering_immediately(handle: NetworkHandle) -> Self {
        let requester = Self::default();
        *requester.answer_immediately.lock().unwrap() = Some(handle);
        requester
    }

    pub fn refusing_submission() -> Self {
        let requester = Self::default();
        requester.refuse_submission.store(true, Ordering::SeqCst);
        requester
    }

    pub fn submitted(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ConnectionRequest> {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .map(|(request, _)| request.clone())
            .collect()
    }

    pub fn callback(&self, index: usize) -> NetworkCallback {
        self.submitted.lock().unwrap()[index].1.clone()
    }
}

impl NetworkRequester for FakeRequester {
    fn request_network(
        &self,
        request: ConnectionRequest,
        callback: NetworkCallback,
    ) -> Result<(), PlatformError> {
        if self.refuse_submission.load(Ordering::SeqCst) {
            return Err(PlatformError::Unsupported);
        }
        if let Some(handle) = self.answer_immediately.lock().unwrap().clone() {
            callback.on_available(handle);
        }
        self.submitted.lock().unwrap().push((request, callback));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingBinder {
    history: Mutex<Vec<NetworkHandle>>,
    fail: AtomicBool,
}

impl RecordingBinder {
    pub fn failing() -> Self {
        let binder = Self::default();
        binder.fail.store(true, Ordering::SeqCst);
        binder
    }

    pub fn history(&self) -> Vec<NetworkHandle> {
        self.history.lock().unwrap().clone()
    }
}

#[async_trait]
impl NetworkBinder for RecordingBinder {
    async fn bind_all_traffic_to(&self, handle: &NetworkHandle) -> Result<(), PlatformError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PlatformError::Unauthorized);
        }
        self.history.lock().unwrap().push(handle.clone());
        Ok(())
    }
}

/// A fake platform plus typed access to each fake.
pub struct FakePlatform {
    pub authorizer: Arc<FakeAuthorizer>,
    pub radio: Arc<FakeRadio>,
    pub requester: Arc<FakeRequester>,
    pub binder: Arc<RecordingBinder>,
    pub tier: PlatformTier,
}

impl FakePlatform {
    pub fn new(tier: PlatformTier) -> Self {
        Self {
            authorizer: Arc::new(FakeAuthorizer::already_granted()),
            radio: Arc::new(FakeRadio::new(Vec::new())),
            requester: Arc::new(FakeRequester::default()),
            binder: Arc::new(RecordingBinder::default()),
            tier,
        }
    }

    pub fn platform(&self) -> Platform {
        let requester: Option<Arc<dyn NetworkRequester>> = if self.tier.supports_scoped_requests() {
            Some(self.requester.clone())
        } else {
            None
        };
        Platform {
            tier: self.tier,
            authorizer: self.authorizer.clone(),
            radio: self.radio.clone(),
            requester,
            binder: self.binder.clone(),
        }
    }
}
