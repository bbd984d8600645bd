use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::chat::{ChatSession, TurnOutcome};
use crate::config::{AgentConfig, Config};
use crate::error::RelayError;
use crate::relay::{AgentRelay, RelayEvent};
use crate::tui::commands::{SlashCommand, help_text};
use crate::tui::composer::{Composer, ComposerResult};

type RelayItem = Result<RelayEvent, RelayError>;

/// The relay call currently feeding the transcript.
struct Inflight {
    updates: mpsc::UnboundedReceiver<RelayItem>,
    task: JoinHandle<()>,
}

/// State of the interactive chat screen
pub struct ChatApp {
    pub(crate) chat: ChatSession,
    pub(crate) composer: Composer,
    pub(crate) agent: AgentConfig,
    /// Diagnostic of the last failed call
    pub(crate) error_banner: Option<String>,
    relay: AgentRelay,
    inflight: Option<Inflight>,
    should_quit: bool,
}

impl ChatApp {
    pub fn new(config: &Config, relay: AgentRelay) -> Self {
        Self {
            chat: ChatSession::new(config.ui.citation_limit),
            composer: Composer::new(config.ui.placeholder.clone()),
            agent: config.agent.clone(),
            error_banner: None,
            relay,
            inflight: None,
            should_quit: false,
        }
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Key(key) => self.handle_key(key),
            Event::Paste(text) => self.composer.insert_str(&text),
            _ => {}
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') => {
                    self.run_command(SlashCommand::Bye);
                    return;
                }
                KeyCode::Char('n') => {
                    self.run_command(SlashCommand::New);
                    return;
                }
                _ => {}
            }
        }

        if key.code == KeyCode::Esc && self.error_banner.is_some() {
            self.error_banner = None;
            return;
        }

        match self.composer.handle_key(key) {
            ComposerResult::Submitted(text) => self.ask(&text),
            ComposerResult::Command(command) => self.run_command(command),
            ComposerResult::None => {}
        }
    }

    fn run_command(&mut self, command: SlashCommand) {
        if self.chat.is_busy() && !command.available_while_busy() {
            return;
        }

        match command {
            SlashCommand::New => {
                self.cancel_inflight();
                self.chat.reset();
                self.error_banner = None;
                self.composer.set_busy(false);
            }
            SlashCommand::Help => self.chat.push_system(help_text()),
            SlashCommand::Bye => {
                self.cancel_inflight();
                self.should_quit = true;
            }
        }
    }

    fn ask(&mut self, text: &str) {
        if text.trim_start().starts_with('/') && !text.trim().contains(char::is_whitespace) {
            self.chat
                .push_system(format!("Unknown command {}. Type /help for the list.", text.trim()));
            return;
        }

        let Some(question) = self.chat.submit(text) else {
            return;
        };
        self.error_banner = None;
        self.composer.set_busy(true);

        let mut stream = self.relay.stream(question, self.chat.id());
        let (tx, updates) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                let failed = item.is_err();
                if tx.send(item).is_err() || failed {
                    break;
                }
            }
        });

        self.inflight = Some(Inflight { updates, task });
    }

    /// Next update from the running call. Never resolves while idle.
    pub async fn next_update(&mut self) -> Option<RelayItem> {
        match self.inflight.as_mut() {
            Some(inflight) => inflight.updates.recv().await,
            None => futures::future::pending().await,
        }
    }

    /// Feed one relay update into the chat. `None` means the call is over.
    pub fn on_relay(&mut self, update: Option<RelayItem>) {
        match update {
            Some(Ok(event)) => self.chat.apply(event),
            Some(Err(error)) => self.chat.fail(&error),
            None => self.finish_turn(),
        }
    }

    fn finish_turn(&mut self) {
        self.inflight = None;
        self.composer.set_busy(false);

        match self.chat.finish() {
            Some(TurnOutcome::Failed(diagnostic)) => self.error_banner = Some(diagnostic),
            Some(TurnOutcome::Empty { .. }) => {
                self.chat.push_system("The agent returned an empty answer.");
            }
            Some(TurnOutcome::Answered { .. }) | None => {}
        }
    }

    fn cancel_inflight(&mut self) {
        if let Some(inflight) = self.inflight.take() {
            inflight.task.abort();
        }
    }
}

impl Drop for ChatApp {
    fn drop(&mut self) {
        self.cancel_inflight();
    }
}
