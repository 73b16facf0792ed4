/*!
 * AIRLINK Wireless Scan and Connect Daemon
 * Permission-gated scanning and scoped connections without the bloat
 * Onyx Digital Intelligence Development LLC
 */

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tokio::net::UnixListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod backend;
mod config;
mod error;
mod ipc;
mod wifi;

use config::DaemonConfig;
use ipc::{IpcServer, Request, Response};
use wifi::service::WifiService;

#[derive(Parser)]
#[command(name = "airlinkd")]
#[command(about = "AIRLINK Wireless Scan and Connect Daemon")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "/etc/airlink/airlinkd.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon
    Run,
    /// Check daemon status
    Status,
    /// Scan and list the networks in range
    Scan,
    /// Join one access point and wait for the outcome
    Connect {
        /// Network name
        ssid: String,
        /// Access point hardware address
        bssid: String,
    },
    /// Stop the daemon
    Stop,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("airlink_daemon={}", log_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = DaemonConfig::load(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config).await,
        Commands::Status => check_status(&config).await,
        Commands::Scan => scan_networks(&config).await,
        Commands::Connect { ssid, bssid } => connect_network(&config, ssid, bssid).await,
        Commands::Stop => stop_daemon(&config).await,
    }
}

async fn run_daemon(config: DaemonConfig) -> Result<()> {
    info!("AIRLINK daemon starting...");

    let platform = backend::build_platform(&config);
    let service = Arc::new(WifiService::start(platform, config.wifi.settings()));

    let socket_path = Path::new(&config.socket_path);
    if let Some(dir) = socket_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    if socket_path.exists() {
        warn!("Removing stale socket {}", config.socket_path);
        std::fs::remove_file(socket_path)?;
    }
    let listener = UnixListener::bind(socket_path)?;
    let ipc_server = IpcServer::new(listener, service.clone());

    info!("AIRLINK daemon ready on socket: {}", config.socket_path);

    // Authorization may wait on the platform; serve clients meanwhile.
    let bootstrap = service.clone();
    tokio::spawn(async move {
        let state = bootstrap.bootstrap().await;
        info!("Authorization state: {:?}", state);
    });

    let result = ipc_server.run().await;

    if let Err(e) = std::fs::remove_file(socket_path) {
        warn!("Failed to remove socket {}: {}", config.socket_path, e);
    }
    result
}

async fn check_status(config: &DaemonConfig) -> Result<()> {
    match ipc::send_request(&config.socket_path, &Request::GetStatus).await? {
        Response::Status { status } => {
            println!("Authorization: {:?}", status.authorization);
            println!("Platform tier: {}", status.tier);
            println!("Networks:      {}", status.network_count);
            if let Some(updated_at) = status.updated_at {
                println!("Last results:  {}", updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            match (status.binding, status.bound_bssid) {
                (Some(handle), Some(bssid)) => {
                    println!("Bound to:      network {} on {} via {}", handle.net_id, handle.interface, bssid)
                }
                (Some(handle), None) => println!("Bound to:      network {} on {}", handle.net_id, handle.interface),
                (None, _) => println!("Bound to:      nothing"),
            }
            if let Some(attempt) = status.last_attempt {
                println!("Last attempt:  {} ({}) {:?}", attempt.ssid, attempt.bssid, attempt.state);
            }
        }
        other => println!("Unexpected response: {:?}", other),
    }
    Ok(())
}

async fn scan_networks(config: &DaemonConfig) -> Result<()> {
    match ipc::send_request(&config.socket_path, &Request::Scan { wait: true }).await? {
        Response::NetworkList { networks, .. } if networks.is_empty() => println!("No networks found"),
        Response::NetworkList { networks, .. } => {
            for network in networks {
                let signal = network
                    .signal_dbm
                    .map_or_else(|| "?".to_string(), |dbm| format!("{dbm} dBm"));
                println!(
                    "{:<32} {}  {:>8}  {}",
                    network.display_name(),
                    network.bssid,
                    signal,
                    network.security
                );
            }
        }
        Response::Error { message } => println!("Scan failed: {}", message),
        other => println!("Unexpected response: {:?}", other),
    }
    Ok(())
}

async fn connect_network(config: &DaemonConfig, ssid: String, bssid: String) -> Result<()> {
    let request = Request::Connect { ssid, bssid, wait: true };
    match ipc::send_request(&config.socket_path, &request).await? {
        Response::ConnectionResult { attempt, state } => println!("Attempt {}: {:?}", attempt, state),
        Response::Error { message } => println!("Connect failed: {}", message),
        other => println!("Unexpected response: {:?}", other),
    }
    Ok(())
}

async fn stop_daemon(config: &DaemonConfig) -> Result<()> {
    match ipc::send_request(&config.socket_path, &Request::Shutdown).await? {
        Response::Success { message } => println!("{}", message),
        other => println!("Unexpected response: {:?}", other),
    }
    Ok(())
}
