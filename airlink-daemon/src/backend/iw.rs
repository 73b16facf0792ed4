/*!
 * iw Backend
 * Explicit scans via nl80211, completion from the `iw event` stream
 */

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::run;
use crate::error::PlatformError;
use crate::wifi::platform::RadioScanner;
use crate::wifi::{NetworkDescriptor, ScanEvent};

pub struct IwRadio {
    interface: String,
    events: broadcast::Sender<ScanEvent>,
    monitor: JoinHandle<()>,
}

impl IwRadio {
    pub fn new(interface: String) -> Self {
        let (events, _) = broadcast::channel(16);
        let monitor = tokio::spawn(monitor_events(interface.clone(), events.clone()));
        Self {
            interface,
            events,
            monitor,
        }
    }
}

impl Drop for IwRadio {
    fn drop(&mut self) {
        self.monitor.abort();
    }
}

#[async_trait]
impl RadioScanner for IwRadio {
    async fn trigger_scan(&self) -> Result<bool, PlatformError> {
        run("iw", &["dev", &self.interface, "scan", "trigger"]).await?;
        Ok(true)
    }

    async fn current_snapshot(&self) -> Result<Vec<NetworkDescriptor>, PlatformError> {
        let dump = run("iw", &["dev", &self.interface, "scan", "dump"]).await?;
        parse_scan_dump(&dump)
    }

    fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }
}

/// Follows `iw event` and republishes scan completions for our interface.
async fn monitor_events(interface: String, events: broadcast::Sender<ScanEvent>) {
    let mut child = match Command::new("iw")
        .arg("event")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            tracing::error!("Failed to start iw event monitor: {}", e);
            return;
        }
    };

    let Some(stdout) = child.stdout.take() else {
        tracing::error!("iw event monitor has no stdout");
        return;
    };

    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(success) = parse_event_line(&line, &interface) {
                    tracing::debug!("Scan on {} finished, success={}", interface, success);
                    let _ = events.send(ScanEvent::new(success));
                }
            }
            Ok(None) => {
                tracing::warn!("iw event monitor exited");
                break;
            }
            Err(e) => {
                tracing::error!("Failed to read iw events: {}", e);
                break;
            }
        }
    }
}

/// `Some(true)` for a finished scan, `Some(false)` for an aborted one.
fn parse_event_line(line: &str, interface: &str) -> Option<bool> {
    let rest = line.strip_prefix(interface)?;
    if !rest.starts_with(' ') && !rest.starts_with(':') {
        return None;
    }
    if rest.contains("scan finished") {
        Some(true)
    } else if rest.contains("scan aborted") {
        Some(false)
    } else {
        None
    }
}

#[derive(Default)]
struct PendingBss {
    descriptor: Option<NetworkDescriptor>,
    privacy: bool,
    wpa: bool,
    rsn: bool,
    has_ssid: bool,
}

impl PendingBss {
    fn finish(self) -> Option<NetworkDescriptor> {
        let mut descriptor = self.descriptor?;
        descriptor.security = match (self.wpa, self.rsn) {
            (true, true) => "WPA1 WPA2".to_string(),
            (false, true) => "WPA2".to_string(),
            (true, false) => "WPA1".to_string(),
            (false, false) if self.privacy => "WEP".to_string(),
            (false, false) => String::new(),
        };
        Some(descriptor)
    }
}

fn parse_scan_dump(dump: &str) -> Result<Vec<NetworkDescriptor>, PlatformError> {
    let mut networks = Vec::new();
    let mut pending = PendingBss::default();

    for line in dump.lines() {
        if let Some(header) = line.strip_prefix("BSS ") {
            networks.extend(std::mem::take(&mut pending).finish());

            let address = header.split(|c: char| c == '(' || c.is_whitespace()).next().unwrap_or("");
            let bssid = address
                .parse()
                .map_err(|_| PlatformError::Parse(format!("bad BSS header: {line}")))?;
            pending.descriptor = Some(NetworkDescriptor::new("", bssid));
            continue;
        }

        let Some(descriptor) = pending.descriptor.as_mut() else {
            continue;
        };
        let field = line.trim();

        if let Some(ssid) = field.strip_prefix("SSID:") {
            if !pending.has_ssid {
                descriptor.ssid = unescape_ssid(ssid.trim());
                pending.has_ssid = true;
            }
        } else if let Some(freq) = field.strip_prefix("freq:") {
            descriptor.frequency_mhz = freq.trim().parse::<f64>().ok().map(|mhz| mhz as u32);
        } else if let Some(signal) = field.strip_prefix("signal:") {
            descriptor.signal_dbm = signal
                .split_whitespace()
                .next()
                .and_then(|dbm| dbm.parse::<f64>().ok())
                .map(|dbm| dbm.round() as i32);
        } else if let Some(capability) = field.strip_prefix("capability:") {
            pending.privacy = capability.split_whitespace().any(|flag| flag == "Privacy");
        } else if field.starts_with("RSN:") {
            pending.rsn = true;
        } else if field.starts_with("WPA:") {
            pending.wpa = true;
        }
    }
    networks.extend(pending.finish());

    Ok(networks)
}

/// iw prints every byte outside printable ASCII, plus backslashes and
/// edge spaces, as `\xNN`.
fn unescape_ssid(escaped: &str) -> String {
    let raw = escaped.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] == b'\\' && raw.get(i + 1) == Some(&b'x') {
            let decoded = raw
                .get(i + 2..i + 4)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                bytes.push(byte);
                i += 4;
                continue;
            }
        }
        bytes.push(raw[i]);
        i += 1;
    }

    String::from_utf8_lossy(&bytes).into_owned()
}
