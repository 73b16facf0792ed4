use anyhow::Result;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

use crate::client::{AirlinkClient, DaemonStatus, NetworkEntry};

/// How often the daemon is polled for results and status.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct App {
    pub networks: Vec<NetworkEntry>,
    pub selected_network: usize,
    pub status: Option<DaemonStatus>,
    pub updated_at: Option<DateTime<Utc>>,
    pub daemon_online: bool,
    pub message: Option<String>,
    client: AirlinkClient,
    last_poll: Option<Instant>,
}

impl App {
    pub async fn new(socket_path: &str) -> Result<Self> {
        let mut app = Self {
            networks: Vec::new(),
            selected_network: 0,
            status: None,
            updated_at: None,
            daemon_online: false,
            message: None,
            client: AirlinkClient::new(socket_path.to_string()),
            last_poll: None,
        };

        app.refresh_data().await?;
        Ok(app)
    }

    pub fn previous_network(&mut self) {
        if !self.networks.is_empty() {
            self.selected_network = if self.selected_network == 0 {
                self.networks.len() - 1
            } else {
                self.selected_network - 1
            };
        }
    }

    pub fn next_network(&mut self) {
        if !self.networks.is_empty() {
            self.selected_network = (self.selected_network + 1) % self.networks.len();
        }
    }

    pub fn get_selected_network(&self) -> Option<&NetworkEntry> {
        self.networks.get(self.selected_network)
    }

    /// Polls the daemon unless it was polled recently.
    pub async fn tick(&mut self) -> Result<()> {
        let due = self
            .last_poll
            .map_or(true, |last| last.elapsed() >= POLL_INTERVAL);
        if due {
            self.refresh_data().await?;
        }
        Ok(())
    }

    pub async fn refresh_data(&mut self) -> Result<()> {
        self.last_poll = Some(Instant::now());

        match self.client.networks().await {
            Ok((networks, updated_at)) => {
                self.daemon_online = true;
                self.replace_networks(networks);
                self.updated_at = updated_at;
            }
            Err(e) => {
                self.daemon_online = false;
                self.message = Some(e.to_string());
                return Ok(());
            }
        }

        match self.client.status().await {
            Ok(status) => self.status = Some(status),
            Err(e) => self.message = Some(e.to_string()),
        }

        Ok(())
    }

    pub async fn request_scan(&mut self) -> Result<()> {
        self.message = Some(match self.client.scan().await {
            Ok(disposition) if disposition == "Managed" => {
                "Scanning is managed by the platform; showing its latest results".to_string()
            }
            Ok(_) => "Scan requested".to_string(),
            Err(e) => format!("Scan failed: {}", e),
        });
        self.refresh_data().await
    }

    pub async fn connect_selected(&mut self) -> Result<()> {
        let Some(network) = self.get_selected_network().cloned() else {
            return Ok(());
        };

        self.message = Some(match self.client.connect(&network).await {
            Ok(_) => format!("Connecting to {} ({})...", network.display_name(), network.bssid),
            Err(e) => format!("Cannot connect to {}: {}", network.display_name(), e),
        });
        self.refresh_data().await
    }

    /// Swaps in a new result list, keeping the cursor on the same access
    /// point when it is still visible.
    fn replace_networks(&mut self, networks: Vec<NetworkEntry>) {
        let selected_bssid = self.get_selected_network().map(|n| n.bssid.clone());
        self.networks = networks;

        self.selected_network = selected_bssid
            .and_then(|bssid| self.networks.iter().position(|n| n.bssid == bssid))
            .unwrap_or(0);
    }
}
