/*!
 * AIRLINK TUI Interface
 * Conservative, professional design: network list and link status
 */

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

use crate::app::App;
use crate::client::{AttemptStatus, DaemonStatus, NetworkEntry};

// Conservative color palette
const BLUE: Color = Color::Rgb(100, 149, 237);
const GRAY: Color = Color::Rgb(128, 128, 128);
const WHITE: Color = Color::Rgb(255, 255, 255);
const GREEN: Color = Color::Rgb(34, 139, 34);
const RED: Color = Color::Rgb(220, 20, 60);

pub fn render_ui(f: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),     // Panels
            Constraint::Length(3),  // Footer
        ])
        .split(f.area());

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(60),  // Networks panel
            Constraint::Percentage(40),  // Link status
        ])
        .split(rows[0]);

    render_networks_panel(f, columns[0], app);
    render_status_panel(f, columns[1], app);
    render_footer(f, rows[1], app);
}

fn render_networks_panel(f: &mut Frame, area: Rect, app: &App) {
    let bound_bssid = app.status.as_ref().and_then(connected_bssid);

    let items: Vec<ListItem> = app
        .networks
        .iter()
        .enumerate()
        .map(|(i, network)| {
            let prefix = if i == app.selected_network { "▶ " } else { "  " };
            let connected = bound_bssid == Some(network.bssid.as_str());
            let indicator = if connected { "●" } else { "○" };
            let indicator_color = if connected { GREEN } else { GRAY };

            let content = Line::from(vec![
                Span::raw(prefix),
                Span::styled(indicator, Style::default().fg(indicator_color)),
                Span::raw(" "),
                Span::styled(signal_bars(network.signal_dbm), Style::default().fg(BLUE)),
                Span::raw(" "),
                Span::styled(format!("{:<24}", network.display_name()), Style::default().fg(WHITE)),
                Span::styled(format!("{} ", network.bssid), Style::default().fg(GRAY)),
                Span::styled(security_label(network), Style::default().fg(GRAY)),
            ]);

            if i == app.selected_network {
                ListItem::new(content).style(Style::default().bg(BLUE).fg(WHITE))
            } else {
                ListItem::new(content)
            }
        })
        .collect();

    let title = match app.updated_at {
        Some(at) => format!("Networks ({}) as of {}", app.networks.len(), at.format("%H:%M:%S")),
        None => format!("Networks ({})", app.networks.len()),
    };

    if items.is_empty() {
        let placeholder = if app.daemon_online {
            "No networks found. Press [r] to scan."
        } else {
            "Waiting for airlinkd..."
        };
        let paragraph = Paragraph::new(placeholder)
            .style(Style::default().fg(GRAY))
            .block(Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(Style::default().fg(BLUE)))
            .alignment(Alignment::Center);
        f.render_widget(paragraph, area);
        return;
    }

    let list = List::new(items)
        .block(Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(Style::default().fg(BLUE)));

    f.render_widget(list, area);
}

fn render_status_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Link Status")
        .border_style(Style::default().fg(GRAY));

    let Some(status) = app.status.as_ref() else {
        let paragraph = Paragraph::new("No status available")
            .style(Style::default().fg(GRAY))
            .block(block)
            .alignment(Alignment::Center);
        f.render_widget(paragraph, area);
        return;
    };

    let authorization_color = match status.authorization.as_str() {
        "Granted" => GREEN,
        "Denied" => RED,
        _ => GRAY,
    };

    let mut content = vec![
        Line::from(vec![
            Span::styled("Permissions: ", Style::default().fg(GRAY)),
            Span::styled(&status.authorization, Style::default().fg(authorization_color)),
        ]),
        Line::from(vec![
            Span::styled("Platform: ", Style::default().fg(GRAY)),
            Span::styled(&status.tier, Style::default().fg(WHITE)),
        ]),
        Line::from(""),
    ];

    match &status.binding {
        Some(bound) => content.push(Line::from(vec![
            Span::styled("Traffic via: ", Style::default().fg(GRAY)),
            Span::styled(
                format!(
                    "{} (net {}, gw {})",
                    bound.interface,
                    bound.net_id,
                    bound.gateway.as_deref().unwrap_or("none")
                ),
                Style::default().fg(GREEN),
            ),
        ])),
        None => content.push(Line::from(vec![
            Span::styled("Traffic via: ", Style::default().fg(GRAY)),
            Span::styled("system default", Style::default().fg(WHITE)),
        ])),
    }

    if let Some(attempt) = &status.last_attempt {
        let (label, color) = attempt_label(&attempt.state);
        content.push(Line::from(""));
        content.push(Line::from(vec![
            Span::styled("Last request: ", Style::default().fg(GRAY)),
            Span::styled(attempt.ssid.as_str(), Style::default().fg(WHITE).add_modifier(Modifier::BOLD)),
        ]));
        content.push(Line::from(vec![
            Span::styled("   ", Style::default()),
            Span::styled(attempt.bssid.as_str(), Style::default().fg(GRAY)),
        ]));
        content.push(Line::from(vec![
            Span::styled("State: ", Style::default().fg(GRAY)),
            Span::styled(label, Style::default().fg(color)),
        ]));
    }

    let paragraph = Paragraph::new(content)
        .block(block)
        .alignment(Alignment::Left);

    f.render_widget(paragraph, area);
}

fn render_footer(f: &mut Frame, area: Rect, app: &App) {
    let help = "[↑/↓] Select  [Enter] Connect  [r] Scan  [q] Quit";
    let line = match &app.message {
        Some(message) => Line::from(vec![
            Span::styled(help, Style::default().fg(GRAY)),
            Span::raw("  │  "),
            Span::styled(message.as_str(), Style::default().fg(WHITE)),
        ]),
        None => Line::from(Span::styled(help, Style::default().fg(GRAY))),
    };

    let footer = Paragraph::new(line)
        .block(Block::default().borders(Borders::TOP))
        .alignment(Alignment::Left);

    f.render_widget(footer, area);
}

/// The access point traffic is bound to right now, whatever the last
/// attempt did.
fn connected_bssid(status: &DaemonStatus) -> Option<&str> {
    status.binding.as_ref().and(status.bound_bssid.as_deref())
}

fn attempt_label(state: &AttemptStatus) -> (&'static str, Color) {
    match state {
        AttemptStatus::Requested => ("Connecting...", BLUE),
        AttemptStatus::Bound(_) => ("Connected", GREEN),
        AttemptStatus::Rejected => ("Rejected", RED),
        AttemptStatus::Abandoned => ("No answer", RED),
    }
}

fn security_label(network: &NetworkEntry) -> &str {
    if network.security.is_empty() {
        "open"
    } else {
        &network.security
    }
}

/// Four-step signal meter.
fn signal_bars(signal_dbm: Option<i32>) -> &'static str {
    match signal_dbm {
        Some(dbm) if dbm >= -55 => "▂▄▆█",
        Some(dbm) if dbm >= -67 => "▂▄▆_",
        Some(dbm) if dbm >= -75 => "▂▄__",
        Some(_) => "▂___",
        None => "____",
    }
}
