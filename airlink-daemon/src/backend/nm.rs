/*!
 * NetworkManager Backend
 * NetworkManager owns scan scheduling; we read its cache and ask it to join
 */

use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::run;
use crate::error::PlatformError;
use crate::wifi::connect::NetworkCallback;
use crate::wifi::platform::{NetworkRequester, RadioScanner};
use crate::wifi::{ConnectionRequest, NetworkDescriptor, NetworkHandle, ScanEvent};

/// How often a joined link is checked for loss.
const LINK_POLL: Duration = Duration::from_secs(5);

pub struct NmRadio {
    interface: String,
    events: broadcast::Sender<ScanEvent>,
    ticker: JoinHandle<()>,
}

impl NmRadio {
    /// NetworkManager schedules scans itself. Every `refresh_every` we
    /// announce that its cache is worth reading and nudge it to rescan
    /// for the next round.
    pub fn new(interface: String, refresh_every: Duration) -> Self {
        let (events, _) = broadcast::channel(16);
        let sender = events.clone();
        let rescan_on = interface.clone();
        let ticker = tokio::spawn(async move {
            let mut ticker = interval(refresh_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let _ = sender.send(ScanEvent::new(true));
                if let Err(e) = rescan(&rescan_on).await {
                    // NetworkManager refuses rescans it considers too frequent.
                    tracing::debug!("Background rescan on {} not accepted: {}", rescan_on, e);
                }
            }
        });

        Self {
            interface,
            events,
            ticker,
        }
    }
}

impl Drop for NmRadio {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

async fn rescan(interface: &str) -> Result<(), PlatformError> {
    run("nmcli", &["device", "wifi", "rescan", "ifname", interface]).await?;
    Ok(())
}

#[async_trait]
impl RadioScanner for NmRadio {
    async fn trigger_scan(&self) -> Result<bool, PlatformError> {
        rescan(&self.interface).await?;
        Ok(true)
    }

    async fn current_snapshot(&self) -> Result<Vec<NetworkDescriptor>, PlatformError> {
        let output = run(
            "nmcli",
            &[
                "--terse",
                "--fields",
                "SSID,BSSID,SIGNAL,FREQ,SECURITY",
                "device",
                "wifi",
                "list",
                "ifname",
                &self.interface,
                "--rescan",
                "no",
            ],
        )
        .await?;

        output.lines().filter(|line| !line.is_empty()).map(parse_wifi_line).collect()
    }

    fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }
}

pub struct NmRequester {
    interface: String,
    wait: Option<Duration>,
}

impl NmRequester {
    /// `wait` caps how long NetworkManager may take to join; `None` keeps
    /// nmcli's own limit.
    pub fn new(interface: String, wait: Option<Duration>) -> Self {
        Self { interface, wait }
    }
}

impl NetworkRequester for NmRequester {
    fn request_network(
        &self,
        request: ConnectionRequest,
        callback: NetworkCallback,
    ) -> Result<(), PlatformError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| PlatformError::Unsupported)?;
        let interface = self.interface.clone();
        let args = connect_args(&request, &interface, self.wait);

        runtime.spawn(async move {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            if let Err(e) = run("nmcli", &args).await {
                tracing::warn!("NetworkManager could not join {}: {}", request.ssid, e);
                callback.on_unavailable();
                return;
            }

            let handle = match resolve_handle(&interface).await {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::warn!(
                        "Joined {} but could not resolve {} for attempt {}: {}",
                        request.ssid,
                        interface,
                        callback.attempt(),
                        e
                    );
                    callback.on_unavailable();
                    return;
                }
            };

            callback.on_available(handle.clone());
            watch_link(&interface, handle, callback).await;
        });

        Ok(())
    }
}

fn connect_args(request: &ConnectionRequest, interface: &str, wait: Option<Duration>) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(wait) = wait {
        args.push("--wait".to_string());
        args.push(wait.as_secs().max(1).to_string());
    }
    args.extend(
        ["device", "wifi", "connect", request.ssid.as_str(), "bssid"]
            .into_iter()
            .map(str::to_string),
    );
    args.push(request.bssid.to_string());
    args.push("ifname".to_string());
    args.push(interface.to_string());
    args
}

/// Reports the link as lost once the interface drops out of the
/// connection it joined. Ends quietly if it moves to another connection.
async fn watch_link(interface: &str, handle: NetworkHandle, callback: NetworkCallback) {
    let mut joined: Option<String> = None;
    let mut ticker = interval(LINK_POLL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let output = match run(
            "nmcli",
            &["--get-values", "GENERAL.STATE,GENERAL.CONNECTION", "device", "show", interface],
        )
        .await
        {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("Stopped watching {}: {}", interface, e);
                return;
            }
        };

        let Some((_, connection)) = parse_link_state(&output).filter(|(connected, _)| *connected) else {
            callback.on_lost(handle);
            return;
        };

        if joined.is_none() {
            joined = Some(connection);
        } else if joined.as_deref() != Some(connection.as_str()) {
            tracing::debug!("{} moved on to {}, no longer watching", interface, connection);
            return;
        }
    }
}

/// Parses `GENERAL.STATE` and `GENERAL.CONNECTION` values into
/// (connected, connection name).
fn parse_link_state(output: &str) -> Option<(bool, String)> {
    let mut lines = output.lines();
    let state = lines.next()?.split_whitespace().next()?.parse::<u32>().ok()?;
    let connection = lines.next().unwrap_or("").trim().to_string();
    // 100 is NM_DEVICE_STATE_ACTIVATED.
    Some((state == 100 && !connection.is_empty(), connection))
}

async fn resolve_handle(interface: &str) -> Result<NetworkHandle, PlatformError> {
    let net_id = nix::net::if_::if_nametoindex(interface)
        .map_err(|e| PlatformError::Io(std::io::Error::from(e)))?;
    let gateway = run("nmcli", &["--get-values", "IP4.GATEWAY", "device", "show", interface]).await?;

    Ok(NetworkHandle {
        net_id,
        interface: interface.to_string(),
        gateway: parse_gateway(&gateway),
    })
}

fn parse_gateway(output: &str) -> Option<Ipv4Addr> {
    output.lines().find_map(|line| line.trim().parse().ok())
}

/// Splits a terse nmcli line on unescaped colons.
fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => current.extend(chars.next()),
            ':' => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn parse_wifi_line(line: &str) -> Result<NetworkDescriptor, PlatformError> {
    let fields = split_terse(line);
    let [ssid, bssid, signal, freq, security] = fields.as_slice() else {
        return Err(PlatformError::Parse(format!("unexpected nmcli line: {line}")));
    };

    let bssid = bssid
        .parse()
        .map_err(|_| PlatformError::Parse(format!("bad BSSID in nmcli line: {line}")))?;

    // nmcli reports quality as a percentage; map it back onto dBm.
    let signal_dbm = signal.parse::<i32>().ok().map(|quality| quality / 2 - 100);
    let frequency_mhz = freq.split_whitespace().next().and_then(|mhz| mhz.parse().ok());
    let security = if security == "--" { String::new() } else { security.clone() };

    Ok(NetworkDescriptor {
        ssid: ssid.clone(),
        bssid,
        signal_dbm,
        frequency_mhz,
        security,
    })
}
