use thiserror::Error;

use crate::wifi::PlatformTier;

/// Failures of the scan-and-connect core.
///
/// All of these are logged where they happen. Callers get them back so they
/// can report a terminal state, never so they can crash on one.
#[derive(Debug, Error)]
pub enum WifiError {
    #[error("network permissions are not granted")]
    AuthorizationDenied,

    #[error("network permissions were revoked mid-operation")]
    AuthorizationRevoked,

    #[error("{operation} is not supported on the {tier} platform tier")]
    CapabilityUnsupported {
        operation: &'static str,
        tier: PlatformTier,
    },

    #[error("scan request failed: {0}")]
    ScanRequestFailed(String),

    #[error("connection to {0} was rejected by the platform")]
    ConnectionRejected(String),

    #[error("connection to {0} never resolved")]
    ConnectionAbandoned(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("network {ssid} ({bssid}) is not in the current scan results")]
    UnknownNetwork { ssid: String, bssid: String },
}

/// Failures reported by the radio platform itself.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("operation not permitted")]
    Unauthorized,

    #[error("radio is busy, try again later")]
    RateLimited,

    #[error("operation not supported by this platform")]
    Unsupported,

    #[error("{program} exited with {status}: {stderr}")]
    Command {
        program: String,
        status: i32,
        stderr: String,
    },

    #[error("could not parse platform output: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
