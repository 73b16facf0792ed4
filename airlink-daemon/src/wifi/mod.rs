/*!
 * Wireless Scan and Connect Core
 * Permission-gated scanning, result delivery and scoped connection requests
 */

pub mod auth;
pub mod connect;
pub mod context;
pub mod listener;
pub mod platform;
pub mod scan;
pub mod service;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::WifiError;

/// Hardware address of an access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Bssid([u8; 6]);

impl fmt::Display for Bssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for Bssid {
    type Err = WifiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || WifiError::InvalidRequest(format!("malformed BSSID: {s:?}"));

        let mut octets = [0u8; 6];
        let mut parts = s.trim().split(':');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self(octets))
    }
}

impl TryFrom<String> for Bssid {
    type Error = WifiError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Bssid> for String {
    fn from(value: Bssid) -> Self {
        value.to_string()
    }
}

/// One access point as seen by a single scan cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    /// Empty for hidden networks.
    pub ssid: String,
    pub bssid: Bssid,
    pub signal_dbm: Option<i32>,
    pub frequency_mhz: Option<u32>,
    pub security: String,
}

impl NetworkDescriptor {
    pub fn new(ssid: impl Into<String>, bssid: Bssid) -> Self {
        Self {
            ssid: ssid.into(),
            bssid,
            signal_dbm: None,
            frequency_mhz: None,
            security: String::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        if self.ssid.is_empty() {
            "<hidden>"
        } else {
            &self.ssid
        }
    }
}

/// Networks visible as of the most recent successful scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub networks: Vec<NetworkDescriptor>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthorizationState {
    #[default]
    Unknown,
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    /// Reading scan results (reveals location-correlated data).
    ScanResults,
    /// Triggering scans and joining networks.
    NetworkControl,
}

/// Capability tier of the radio platform.
///
/// `Legacy` platforms scan on command but cannot issue scoped connection
/// requests. `Managed` platforms schedule scans themselves and accept scoped
/// requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatformTier {
    Legacy,
    Managed,
}

impl PlatformTier {
    pub fn has_explicit_scan(self) -> bool {
        matches!(self, PlatformTier::Legacy)
    }

    pub fn supports_scoped_requests(self) -> bool {
        matches!(self, PlatformTier::Managed)
    }
}

impl fmt::Display for PlatformTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformTier::Legacy => f.write_str("legacy"),
            PlatformTier::Managed => f.write_str("managed"),
        }
    }
}

/// "Scan results available" notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanEvent {
    pub success: bool,
    pub at: DateTime<Utc>,
}

impl ScanEvent {
    pub fn new(success: bool) -> Self {
        Self {
            success,
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transport {
    Wifi,
}

/// A connection request scoped to exactly one SSID + BSSID pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub ssid: String,
    pub bssid: Bssid,
    pub transport: Transport,
}

impl ConnectionRequest {
    pub fn scoped(descriptor: &NetworkDescriptor) -> Result<Self, WifiError> {
        if descriptor.ssid.is_empty() {
            return Err(WifiError::InvalidRequest(format!(
                "hidden network {} has no SSID to pin the request to",
                descriptor.bssid
            )));
        }

        Ok(Self {
            ssid: descriptor.ssid.clone(),
            bssid: descriptor.bssid,
            transport: Transport::Wifi,
        })
    }
}

/// Platform token for a joined network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkHandle {
    pub net_id: u32,
    pub interface: String,
    pub gateway: Option<Ipv4Addr>,
}

/// The network all traffic currently goes through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub handle: NetworkHandle,
    pub ssid: String,
    pub bssid: Bssid,
}

pub type AttemptId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "network")]
pub enum AttemptState {
    Requested,
    Bound(NetworkHandle),
    Rejected,
    Abandoned,
}

/// Terminal result of one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOutcome {
    Bound(NetworkHandle),
    Rejected,
    Abandoned,
}

impl From<ConnectionOutcome> for AttemptState {
    fn from(outcome: ConnectionOutcome) -> Self {
        match outcome {
            ConnectionOutcome::Bound(handle) => AttemptState::Bound(handle),
            ConnectionOutcome::Rejected => AttemptState::Rejected,
            ConnectionOutcome::Abandoned => AttemptState::Abandoned,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub id: AttemptId,
    pub ssid: String,
    pub bssid: Bssid,
    pub state: AttemptState,
    pub started_at: DateTime<Utc>,
}
