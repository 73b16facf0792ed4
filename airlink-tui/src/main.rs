/*!
 * AIRLINK Wireless Network Picker
 * Live scan results and one-key connect
 * Onyx Digital Intelligence Development LLC
 */

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    Terminal,
};
use std::io::{self, Stdout};
use tokio::time::{interval, Duration};

mod ui;
mod client;
mod app;

use app::App;
use ui::render_ui;

#[derive(Parser)]
#[command(name = "airlink")]
#[command(about = "AIRLINK Wireless Network Picker")]
struct Cli {
    /// Daemon socket path
    #[arg(short, long, default_value = "/run/airlink/airlink.sock")]
    socket: String,
}

type Tui = Terminal<CrosstermBackend<Stdout>>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut app = App::new(&cli.socket).await?;

    let mut terminal = enter_terminal()?;
    let result = run(&mut terminal, &mut app).await;
    leave_terminal(&mut terminal)?;

    result
}

async fn run(terminal: &mut Tui, app: &mut App) -> Result<()> {
    let mut ticker = interval(Duration::from_millis(100));

    loop {
        if event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') => return Ok(()),
                    KeyCode::Up => app.previous_network(),
                    KeyCode::Down => app.next_network(),
                    KeyCode::Enter => app.connect_selected().await?,
                    KeyCode::Char('r') => app.request_scan().await?,
                    _ => {}
                }
            }
        }

        ticker.tick().await;
        app.tick().await?;
        terminal.draw(|f| render_ui(f, app))?;
    }
}

fn enter_terminal() -> Result<Tui> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

fn leave_terminal(terminal: &mut Tui) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;
    Ok(())
}
