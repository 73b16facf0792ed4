/*!
 * Linux Radio Backends
 * iw (explicit scans) and NetworkManager (managed scans, scoped requests)
 */

pub mod iw;
pub mod nm;
pub mod system;

use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

use crate::config::{BackendKind, DaemonConfig};
use crate::error::PlatformError;
use crate::wifi::platform::Platform;
use crate::wifi::PlatformTier;

use iw::IwRadio;
use nm::{NmRadio, NmRequester};
use system::{PrivilegeAuthorizer, RouteBinder};

/// Builds the platform the configuration asks for. Must be called from
/// within a Tokio runtime; backends spawn their notification tasks here.
pub fn build_platform(config: &DaemonConfig) -> Platform {
    let interface = config.wifi.interface.clone();
    let authorizer = Arc::new(PrivilegeAuthorizer::new(config.authorization.require_root));
    let binder = Arc::new(RouteBinder::new(config.wifi.bind_default_route));

    match config.wifi.backend {
        BackendKind::Iw => {
            tracing::info!("Using iw backend on {}", interface);
            Platform {
                tier: PlatformTier::Legacy,
                authorizer,
                radio: Arc::new(IwRadio::new(interface)),
                requester: None,
                binder,
            }
        }
        BackendKind::NetworkManager => {
            tracing::info!("Using NetworkManager backend on {}", interface);
            let interval = Duration::from_secs(config.wifi.scan_interval_secs.max(1));
            let wait = join_wait(config.wifi.settings().connect_timeout);
            Platform {
                tier: PlatformTier::Managed,
                authorizer,
                radio: Arc::new(NmRadio::new(interface.clone(), interval)),
                requester: Some(Arc::new(NmRequester::new(interface, wait))),
                binder,
            }
        }
    }
}

/// NetworkManager has to give up on a join before the coordinator does,
/// or a slow success would arrive for an attempt already abandoned.
fn join_wait(connect_timeout: Option<Duration>) -> Option<Duration> {
    connect_timeout.map(|timeout| timeout.saturating_sub(JOIN_WAIT_MARGIN).max(Duration::from_secs(1)))
}

const JOIN_WAIT_MARGIN: Duration = Duration::from_secs(5);

/// Runs a tool to completion and returns its stdout.
pub(crate) async fn run(program: &str, args: &[&str]) -> Result<String, PlatformError> {
    tracing::debug!("Running {} {}", program, args.join(" "));
    let output = Command::new(program).args(args).output().await?;

    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(classify_failure(program, output.status.code().unwrap_or(-1), stderr))
}

fn classify_failure(program: &str, status: i32, stderr: String) -> PlatformError {
    let message = stderr.to_lowercase();
    if message.contains("operation not permitted")
        || message.contains("permission denied")
        || message.contains("not authorized")
        || message.contains("insufficient privileges")
    {
        PlatformError::Unauthorized
    } else if message.contains("device or resource busy") {
        PlatformError::RateLimited
    } else {
        PlatformError::Command {
            program: program.to_string(),
            status,
            stderr,
        }
    }
}
