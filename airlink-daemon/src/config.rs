use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::wifi::service::WifiSettings;

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub socket_path: String,
    pub wifi: WifiConfig,
    pub authorization: AuthorizationConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    NetworkManager,
    Iw,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct WifiConfig {
    pub interface: String,
    pub backend: BackendKind,
    pub scan_on_start: bool,
    pub scan_interval_secs: u64,
    /// 0 waits for the platform forever.
    pub connect_timeout_secs: u64,
    pub bind_default_route: bool,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    pub require_root: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: "/run/airlink/airlink.sock".to_string(),
            wifi: WifiConfig::default(),
            authorization: AuthorizationConfig::default(),
        }
    }
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            interface: "wlan0".to_string(),
            backend: BackendKind::NetworkManager,
            scan_on_start: true,
            scan_interval_secs: 15,
            connect_timeout_secs: 30,
            bind_default_route: true,
        }
    }
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self { require_root: true }
    }
}

impl WifiConfig {
    pub fn settings(&self) -> WifiSettings {
        WifiSettings {
            scan_on_start: self.scan_on_start,
            connect_timeout: (self.connect_timeout_secs > 0)
                .then(|| Duration::from_secs(self.connect_timeout_secs)),
        }
    }
}

impl DaemonConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .with_context(|| format!("Invalid configuration in {}", path.display())),
            Err(_) => {
                // Create default config if not found
                let config = Self::default();
                if let Err(e) = fs::write(path, toml::to_string_pretty(&config)?) {
                    tracing::debug!("Could not write default config to {}: {}", path.display(), e);
                }
                Ok(config)
            }
        }
    }
}
