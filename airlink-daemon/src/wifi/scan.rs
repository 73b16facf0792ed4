use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::AuthorizationGate;
use super::platform::RadioScanner;
use super::PlatformTier;
use crate::error::{PlatformError, WifiError};

/// What a scan request actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanDisposition {
    /// The radio accepted an explicit scan command.
    Triggered,
    /// The platform schedules scans itself; nothing was sent.
    Managed,
}

/// Best-effort scan requests. A success never promises a fresh scan.
pub struct ScanTrigger {
    gate: AuthorizationGate,
    radio: Arc<dyn RadioScanner>,
    tier: PlatformTier,
}

impl ScanTrigger {
    pub fn new(gate: AuthorizationGate, radio: Arc<dyn RadioScanner>, tier: PlatformTier) -> Self {
        Self { gate, radio, tier }
    }

    pub async fn request_scan(&self) -> Result<ScanDisposition, WifiError> {
        if !self.gate.still_authorized() {
            tracing::warn!(
                "Scan skipped: authorization is {:?}",
                self.gate.context().authorization()
            );
            return Err(WifiError::AuthorizationDenied);
        }

        if !self.tier.has_explicit_scan() {
            tracing::debug!("Platform manages scanning on the {} tier; no scan issued", self.tier);
            return Ok(ScanDisposition::Managed);
        }

        match self.radio.trigger_scan().await {
            Ok(true) => {
                tracing::debug!("Scan triggered");
                Ok(ScanDisposition::Triggered)
            }
            Ok(false) => {
                tracing::warn!("Radio declined the scan request");
                Err(WifiError::ScanRequestFailed("radio declined the request".to_string()))
            }
            Err(PlatformError::Unauthorized) => {
                tracing::warn!("Scan refused: permission revoked");
                self.gate.revoke();
                Err(WifiError::AuthorizationRevoked)
            }
            Err(e) => {
                tracing::warn!("Scan request failed: {}", e);
                Err(WifiError::ScanRequestFailed(e.to_string()))
            }
        }
    }
}
