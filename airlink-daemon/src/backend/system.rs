/*!
 * Host Integration
 * Privilege-based authorization and default-route traffic binding
 */

use async_trait::async_trait;
use std::collections::HashMap;

use super::run;
use crate::error::PlatformError;
use crate::wifi::platform::{AuthorizationService, NetworkBinder};
use crate::wifi::{NetworkHandle, Permission};

/// Grants permissions to a privileged daemon.
///
/// There is nobody to prompt, so a request gets the same answer as a check.
pub struct PrivilegeAuthorizer {
    require_root: bool,
}

impl PrivilegeAuthorizer {
    pub fn new(require_root: bool) -> Self {
        Self { require_root }
    }

    fn granted(&self) -> bool {
        !self.require_root || nix::unistd::geteuid().is_root()
    }
}

#[async_trait]
impl AuthorizationService for PrivilegeAuthorizer {
    fn check(&self, _permissions: &[Permission]) -> bool {
        self.granted()
    }

    async fn request(&self, permissions: &[Permission]) -> HashMap<Permission, bool> {
        let granted = self.granted();
        if !granted {
            tracing::warn!("airlinkd is not running as root; set authorization.require_root = false to override");
        }
        permissions.iter().map(|permission| (*permission, granted)).collect()
    }
}

/// Routes all outbound traffic through the joined network.
pub struct RouteBinder {
    replace_default_route: bool,
}

impl RouteBinder {
    pub fn new(replace_default_route: bool) -> Self {
        Self {
            replace_default_route,
        }
    }
}

#[async_trait]
impl NetworkBinder for RouteBinder {
    async fn bind_all_traffic_to(&self, handle: &NetworkHandle) -> Result<(), PlatformError> {
        if !self.replace_default_route {
            tracing::debug!("Default route left alone for {}", handle.interface);
            return Ok(());
        }

        let args = route_args(handle);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run("ip", &args).await?;
        tracing::info!("Default route now via {}", handle.interface);
        Ok(())
    }
}

fn route_args(handle: &NetworkHandle) -> Vec<String> {
    let mut args = vec!["route".to_string(), "replace".to_string(), "default".to_string()];
    if let Some(gateway) = handle.gateway {
        args.push("via".to_string());
        args.push(gateway.to_string());
    }
    args.push("dev".to_string());
    args.push(handle.interface.clone());
    args
}
