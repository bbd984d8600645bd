//! Interactive terminal chat.

mod app;
mod commands;
mod composer;
mod history;
mod ui;

pub use app::ChatApp;

use anyhow::{Context, Result};
use crossterm::{
    ExecutableCommand,
    event::{DisableBracketedPaste, EnableBracketedPaste, Event, EventStream},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io::{self, Stdout, stdout};

use crate::config::Config;
use crate::error::RelayError;
use crate::relay::{AgentRelay, RelayEvent};

type Tui = Terminal<CrosstermBackend<Stdout>>;

/// What woke the loop up
enum Step {
    Terminal(Option<io::Result<Event>>),
    Relay(Option<Result<RelayEvent, RelayError>>),
}

/// Run the chat until the user quits.
pub async fn run(config: &Config, relay: AgentRelay) -> Result<()> {
    let mut terminal = setup_terminal().context("Failed to initialize terminal")?;
    let mut app = ChatApp::new(config, relay);

    let result = event_loop(&mut terminal, &mut app).await;

    restore_terminal(&mut terminal).context("Failed to restore terminal")?;
    result
}

async fn event_loop(terminal: &mut Tui, app: &mut ChatApp) -> Result<()> {
    let mut events = EventStream::new();

    loop {
        terminal.draw(|frame| ui::draw(frame, app))?;
        if app.should_quit() {
            return Ok(());
        }

        let step = tokio::select! {
            event = events.next() => Step::Terminal(event),
            update = app.next_update() => Step::Relay(update),
        };

        match step {
            Step::Terminal(Some(Ok(event))) => app.handle_event(event),
            Step::Terminal(Some(Err(e))) => return Err(e).context("Failed to read terminal event"),
            Step::Terminal(None) => return Ok(()),
            Step::Relay(update) => app.on_relay(update),
        }
    }
}

fn setup_terminal() -> Result<Tui> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    stdout().execute(EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(stdout());
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(terminal: &mut Tui) -> Result<()> {
    disable_raw_mode()?;
    stdout().execute(DisableBracketedPaste)?;
    stdout().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
