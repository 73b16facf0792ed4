/*!
 * AIRLINK Daemon Client
 * JSON IPC communication with airlinkd
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    GetNetworks,
    Scan,
    Connect { ssid: String, bssid: String },
    GetStatus,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    NetworkList {
        networks: Vec<NetworkEntry>,
        updated_at: Option<DateTime<Utc>>,
    },
    ScanRequested { disposition: String },
    Connecting { attempt: Uuid },
    Status { status: DaemonStatus },
    Success { message: String },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEntry {
    pub ssid: String,
    pub bssid: String,
    pub signal_dbm: Option<i32>,
    pub frequency_mhz: Option<u32>,
    pub security: String,
}

impl NetworkEntry {
    pub fn display_name(&self) -> &str {
        if self.ssid.is_empty() {
            "<hidden>"
        } else {
            &self.ssid
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub authorization: String,
    pub tier: String,
    pub binding: Option<BoundNetwork>,
    #[serde(default)]
    pub bound_bssid: Option<String>,
    pub last_attempt: Option<AttemptInfo>,
    pub network_count: usize,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundNetwork {
    pub net_id: u32,
    pub interface: String,
    pub gateway: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptInfo {
    pub id: Uuid,
    pub ssid: String,
    pub bssid: String,
    pub state: AttemptStatus,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "network")]
pub enum AttemptStatus {
    Requested,
    Bound(BoundNetwork),
    Rejected,
    Abandoned,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon unreachable at {path}: {source}")]
    Unreachable {
        path: String,
        source: std::io::Error,
    },

    #[error("daemon closed the connection")]
    Closed,

    #[error("{0}")]
    Daemon(String),

    #[error("unexpected response: {0}")]
    Unexpected(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub struct AirlinkClient {
    socket_path: String,
}

impl AirlinkClient {
    pub fn new(socket_path: String) -> Self {
        Self { socket_path }
    }

    pub async fn networks(&self) -> Result<(Vec<NetworkEntry>, Option<DateTime<Utc>>), ClientError> {
        match self.send_request(&Request::GetNetworks).await? {
            Response::NetworkList { networks, updated_at } => Ok((networks, updated_at)),
            other => Err(unexpected(other)),
        }
    }

    pub async fn status(&self) -> Result<DaemonStatus, ClientError> {
        match self.send_request(&Request::GetStatus).await? {
            Response::Status { status } => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    pub async fn scan(&self) -> Result<String, ClientError> {
        match self.send_request(&Request::Scan).await? {
            Response::ScanRequested { disposition } => Ok(disposition),
            other => Err(unexpected(other)),
        }
    }

    pub async fn connect(&self, network: &NetworkEntry) -> Result<Uuid, ClientError> {
        let request = Request::Connect {
            ssid: network.ssid.clone(),
            bssid: network.bssid.clone(),
        };
        match self.send_request(&request).await? {
            Response::Connecting { attempt } => Ok(attempt),
            other => Err(unexpected(other)),
        }
    }

    async fn send_request(&self, request: &Request) -> Result<Response, ClientError> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|source| ClientError::Unreachable {
                path: self.socket_path.clone(),
                source,
            })?;
        let (reader, mut writer) = stream.into_split();

        let request_json = serde_json::to_string(request)?;
        writer.write_all(request_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;

        let mut line = String::new();
        if BufReader::new(reader).read_line(&mut line).await? == 0 {
            return Err(ClientError::Closed);
        }

        Ok(serde_json::from_str(line.trim())?)
    }
}

fn unexpected(response: Response) -> ClientError {
    match response {
        Response::Error { message } => ClientError::Daemon(message),
        other => ClientError::Unexpected(format!("{:?}", other)),
    }
}
