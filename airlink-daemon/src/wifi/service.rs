/*!
 * Wireless Service
 * Wires the gate, trigger, store, listener and coordinator together
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::auth::AuthorizationGate;
use super::connect::{ConnectionAttempt, ConnectionCoordinator};
use super::context::WifiContext;
use super::listener::ScanResultListener;
use super::platform::Platform;
use super::scan::{ScanDisposition, ScanTrigger};
use super::store::ResultStore;
use super::{AttemptRecord, AuthorizationState, Bssid, NetworkHandle, PlatformTier, ResultSet};
use crate::error::WifiError;

#[derive(Debug, Clone)]
pub struct WifiSettings {
    pub scan_on_start: bool,
    pub connect_timeout: Option<Duration>,
}

/// Snapshot of the service for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub authorization: AuthorizationState,
    pub tier: PlatformTier,
    pub binding: Option<NetworkHandle>,
    /// Access point the current binding was made for.
    pub bound_bssid: Option<Bssid>,
    pub last_attempt: Option<AttemptRecord>,
    pub network_count: usize,
    pub updated_at: Option<DateTime<Utc>>,
}

pub struct WifiService {
    ctx: Arc<WifiContext>,
    tier: PlatformTier,
    settings: WifiSettings,
    gate: AuthorizationGate,
    trigger: ScanTrigger,
    store: Arc<ResultStore>,
    coordinator: ConnectionCoordinator,
    _listener: ScanResultListener,
}

impl WifiService {
    /// Builds every component around a fresh context. Must be called from
    /// within a Tokio runtime.
    pub fn start(platform: Platform, settings: WifiSettings) -> Self {
        let ctx = Arc::new(WifiContext::new());
        let gate = AuthorizationGate::new(ctx.clone(), platform.authorizer.clone());
        let trigger = ScanTrigger::new(gate.clone(), platform.radio.clone(), platform.tier);
        let store = Arc::new(ResultStore::new(gate.clone(), platform.radio.clone()));
        let listener = ScanResultListener::register(store.clone(), platform.radio.subscribe());
        let coordinator = ConnectionCoordinator::start(ctx.clone(), &platform, settings.connect_timeout);

        tracing::info!("Wireless service started on the {} tier", platform.tier);

        Self {
            ctx,
            tier: platform.tier,
            settings,
            gate,
            trigger,
            store,
            coordinator,
            _listener: listener,
        }
    }

    /// Authorizes and, if configured, runs the first scan.
    pub async fn bootstrap(&self) -> AuthorizationState {
        let state = self.gate.ensure_authorized().await;
        if state == AuthorizationState::Granted && self.settings.scan_on_start {
            // Failures are already logged by the scan path.
            let _ = self.scan_authorized().await;
        }
        state
    }

    /// Asks for a scan and, where the platform scans by itself, picks up
    /// its latest results right away.
    pub async fn scan(&self) -> Result<ScanDisposition, WifiError> {
        if self.gate.ensure_authorized().await != AuthorizationState::Granted {
            return Err(WifiError::AuthorizationDenied);
        }
        self.scan_authorized().await
    }

    async fn scan_authorized(&self) -> Result<ScanDisposition, WifiError> {
        let disposition = self.trigger.request_scan().await?;
        if disposition == ScanDisposition::Managed {
            self.store.refresh().await?;
        }
        Ok(disposition)
    }

    /// Scans and waits up to `within` for the results to be replaced.
    /// On a timeout the previous results are returned unchanged.
    pub async fn scan_and_wait(&self, within: Duration) -> Result<ResultSet, WifiError> {
        let mut results = self.store.subscribe();

        if self.scan().await? == ScanDisposition::Triggered
            && tokio::time::timeout(within, results.changed()).await.is_err()
        {
            tracing::debug!("No scan results within {:?}", within);
        }
        Ok(self.store.result_set())
    }

    pub fn networks(&self) -> ResultSet {
        self.store.result_set()
    }

    /// Connects to the network with this SSID and BSSID from the current
    /// scan results.
    pub fn connect(&self, ssid: &str, bssid: &str) -> Result<ConnectionAttempt, WifiError> {
        let unknown = || WifiError::UnknownNetwork {
            ssid: ssid.to_string(),
            bssid: bssid.to_string(),
        };
        let bssid: Bssid = bssid.parse().map_err(|_| unknown())?;

        let descriptor = self
            .store
            .current_results()
            .into_iter()
            .find(|network| network.ssid == ssid && network.bssid == bssid)
            .ok_or_else(unknown)?;

        self.coordinator.connect(&descriptor)
    }

    pub fn status(&self) -> ServiceStatus {
        let results = self.store.result_set();
        ServiceStatus {
            authorization: self.ctx.authorization(),
            tier: self.tier,
            binding: self.ctx.binding(),
            bound_bssid: self.ctx.bound_network().map(|bound| bound.bssid),
            last_attempt: self.ctx.last_attempt(),
            network_count: results.networks.len(),
            updated_at: results.updated_at,
        }
    }
}
