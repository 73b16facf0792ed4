use std::sync::Arc;
use tokio::sync::watch;

use super::auth::AuthorizationGate;
use super::context::WifiContext;
use super::platform::RadioScanner;
use super::{NetworkDescriptor, ResultSet};
use crate::error::{PlatformError, WifiError};

/// Observable list of networks from the latest successful scan.
pub struct ResultStore {
    ctx: Arc<WifiContext>,
    gate: AuthorizationGate,
    radio: Arc<dyn RadioScanner>,
}

impl ResultStore {
    pub fn new(gate: AuthorizationGate, radio: Arc<dyn RadioScanner>) -> Self {
        Self {
            ctx: gate.context().clone(),
            gate,
            radio,
        }
    }

    /// Replaces the result set with the platform's current snapshot.
    ///
    /// On any failure the previous results stay in place, even if they are
    /// stale. Returns the number of networks now visible.
    pub async fn refresh(&self) -> Result<usize, WifiError> {
        if !self.gate.still_authorized() {
            tracing::warn!(
                "Result refresh skipped: authorization is {:?}, keeping previous results",
                self.ctx.authorization()
            );
            return Err(WifiError::AuthorizationDenied);
        }

        match self.radio.current_snapshot().await {
            Ok(networks) => {
                let count = networks.len();
                self.ctx.replace_results(networks);
                tracing::debug!("Result set replaced: {} networks", count);
                Ok(count)
            }
            Err(PlatformError::Unauthorized) => {
                tracing::warn!("Permission revoked while reading scan results, keeping previous results");
                self.gate.revoke();
                Err(WifiError::AuthorizationRevoked)
            }
            Err(e) => {
                tracing::warn!("Failed to read scan results: {}", e);
                Err(WifiError::ScanRequestFailed(e.to_string()))
            }
        }
    }

    pub fn current_results(&self) -> Vec<NetworkDescriptor> {
        self.ctx.current_results()
    }

    pub fn result_set(&self) -> ResultSet {
        self.ctx.result_set()
    }

    pub fn subscribe(&self) -> watch::Receiver<ResultSet> {
        self.ctx.subscribe_results()
    }
}
