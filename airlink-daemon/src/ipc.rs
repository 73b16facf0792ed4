/*!
 * IPC Server for AIRLINK Daemon
 * JSON protocol over Unix socket
 */

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;

use crate::wifi::scan::ScanDisposition;
use crate::wifi::service::{ServiceStatus, WifiService};
use crate::wifi::{AttemptId, AttemptState, NetworkDescriptor};

/// How long a waiting scan holds the client before answering with the
/// results it already has.
const SCAN_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    GetNetworks,
    /// With `wait`, answers with the network list once new results land.
    Scan {
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        wait: bool,
    },
    /// With `wait`, answers once the attempt has settled.
    Connect {
        ssid: String,
        bssid: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        wait: bool,
    },
    GetStatus,
    Shutdown,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    NetworkList {
        networks: Vec<NetworkDescriptor>,
        updated_at: Option<DateTime<Utc>>,
    },
    ScanRequested { disposition: ScanDisposition },
    Connecting { attempt: AttemptId },
    ConnectionResult { attempt: AttemptId, state: AttemptState },
    Status { status: ServiceStatus },
    Success { message: String },
    Error { message: String },
}

pub struct IpcServer {
    listener: UnixListener,
    service: Arc<WifiService>,
    shutdown: watch::Sender<bool>,
}

impl IpcServer {
    pub fn new(listener: UnixListener, service: Arc<WifiService>) -> Self {
        Self {
            listener,
            service,
            shutdown: watch::Sender::new(false),
        }
    }

    /// Serves clients until one asks for shutdown or the process is
    /// interrupted.
    pub async fn run(self) -> Result<()> {
        tracing::info!("IPC server listening for connections...");
        let mut shutdown = self.shutdown.subscribe();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        tracing::debug!("New client connected");
                        let service = self.service.clone();
                        let shutdown = self.shutdown.clone();

                        tokio::spawn(async move {
                            if let Err(e) = handle_client(stream, &service, &shutdown).await {
                                tracing::error!("Client error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept connection: {}", e);
                    }
                },
                _ = shutdown.changed() => {
                    tracing::info!("Shutdown requested over IPC");
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn handle_client(
    stream: UnixStream,
    service: &WifiService,
    shutdown: &watch::Sender<bool>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let request = line.trim();
        tracing::debug!("Received request: {}", request);

        let response = match serde_json::from_str::<Request>(request) {
            Ok(Request::Shutdown) => {
                shutdown.send_replace(true);
                Response::Success {
                    message: "Shutting down".to_string(),
                }
            }
            Ok(request) => handle_request(service, request).await,
            Err(e) => Response::Error {
                message: format!("Malformed request: {e}"),
            },
        };

        let response = serde_json::to_string(&response)?;
        writer.write_all(response.as_bytes()).await?;
        writer.write_all(b"\n").await?;

        line.clear();
    }

    Ok(())
}

async fn handle_request(service: &WifiService, request: Request) -> Response {
    match request {
        Request::GetNetworks => {
            let results = service.networks();
            Response::NetworkList {
                networks: results.networks,
                updated_at: results.updated_at,
            }
        }
        Request::Scan { wait: false } => match service.scan().await {
            Ok(disposition) => Response::ScanRequested { disposition },
            Err(e) => Response::Error {
                message: e.to_string(),
            },
        },
        Request::Scan { wait: true } => match service.scan_and_wait(SCAN_WAIT).await {
            Ok(results) => Response::NetworkList {
                networks: results.networks,
                updated_at: results.updated_at,
            },
            Err(e) => Response::Error {
                message: e.to_string(),
            },
        },
        Request::Connect { ssid, bssid, wait } => match service.connect(&ssid, &bssid) {
            Ok(attempt) if wait => {
                let id = attempt.id;
                Response::ConnectionResult {
                    attempt: id,
                    state: attempt.outcome().await.into(),
                }
            }
            Ok(attempt) => Response::Connecting { attempt: attempt.id },
            Err(e) => Response::Error {
                message: e.to_string(),
            },
        },
        Request::GetStatus => Response::Status {
            status: service.status(),
        },
        Request::Shutdown => Response::Success {
            message: "Shutting down".to_string(),
        },
    }
}

/// One-shot request used by the command-line subcommands.
pub async fn send_request(socket_path: &str, request: &Request) -> Result<Response> {
    let stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("Is airlinkd running? Cannot connect to {socket_path}"))?;
    let (reader, mut writer) = stream.into_split();

    let request_json = serde_json::to_string(request)?;
    writer.write_all(request_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;

    let mut line = String::new();
    BufReader::new(reader).read_line(&mut line).await?;
    Ok(serde_json::from_str(line.trim())?)
}
