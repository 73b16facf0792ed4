/*!
 * Platform Seams
 * Everything the core needs from the radio platform, as traits
 */

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::connect::NetworkCallback;
use super::{ConnectionRequest, NetworkDescriptor, NetworkHandle, Permission, PlatformTier, ScanEvent};
use crate::error::PlatformError;

/// Grants or refuses the permissions the core runs under.
#[async_trait]
pub trait AuthorizationService: Send + Sync {
    /// Current grant state, without prompting anyone.
    fn check(&self, permissions: &[Permission]) -> bool;

    /// Asks for the permissions. Resolves once, whenever the answer arrives.
    async fn request(&self, permissions: &[Permission]) -> HashMap<Permission, bool>;
}

/// The radio's scan facility.
#[async_trait]
pub trait RadioScanner: Send + Sync {
    /// Imperative scan. `Ok(false)` means the radio declined the request.
    async fn trigger_scan(&self) -> Result<bool, PlatformError>;

    /// Results of the last completed scan, in platform order.
    async fn current_snapshot(&self) -> Result<Vec<NetworkDescriptor>, PlatformError>;

    /// "Scan results available" notifications.
    fn subscribe(&self) -> broadcast::Receiver<ScanEvent>;
}

/// Scoped network requests. Answers arrive through the callback.
pub trait NetworkRequester: Send + Sync {
    /// Submits the request and returns immediately.
    fn request_network(
        &self,
        request: ConnectionRequest,
        callback: NetworkCallback,
    ) -> Result<(), PlatformError>;
}

/// Process-wide traffic binding.
#[async_trait]
pub trait NetworkBinder: Send + Sync {
    async fn bind_all_traffic_to(&self, handle: &NetworkHandle) -> Result<(), PlatformError>;
}

/// A complete platform backend.
#[derive(Clone)]
pub struct Platform {
    pub tier: PlatformTier,
    pub authorizer: Arc<dyn AuthorizationService>,
    pub radio: Arc<dyn RadioScanner>,
    /// Absent on tiers without scoped requests.
    pub requester: Option<Arc<dyn NetworkRequester>>,
    pub binder: Arc<dyn NetworkBinder>,
}
