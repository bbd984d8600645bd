use anyhow::{Context, Result, bail};
use futures::StreamExt;
use std::io::{self, Write};

use crate::chat::{ChatSession, TurnOutcome};
use crate::config::Config;
use crate::relay::{AgentRelay, RelayEvent};
use crate::session::SessionId;

/// Stream one answer to stdout, then its sources.
pub async fn ask(
    config: &Config,
    relay: &AgentRelay,
    question: &str,
    session: Option<String>,
) -> Result<()> {
    let id = session
        .filter(|id| !id.trim().is_empty())
        .map(SessionId::from)
        .unwrap_or_else(SessionId::generate);
    let mut chat = ChatSession::with_id(id, config.ui.citation_limit);

    let Some(question) = chat.submit(question) else {
        bail!("The question is empty");
    };

    let mut stdout = io::stdout();
    let mut stream = relay.stream(question, chat.id());
    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => {
                if let RelayEvent::Chunk(text) = &event {
                    stdout.write_all(text.as_bytes())?;
                    stdout.flush()?;
                }
                chat.apply(event);
            }
            Err(error) => {
                chat.fail(&error);
                break;
            }
        }
    }
    drop(stream);

    match chat.finish() {
        Some(TurnOutcome::Answered { .. }) => {
            writeln!(stdout)?;
            let answer = chat.messages().last();
            if let Some(caption) = answer.and_then(|message| message.sources_caption()) {
                writeln!(stdout, "\n{caption}")?;
            }
            Ok(())
        }
        Some(TurnOutcome::Empty { .. }) => {
            eprintln!("The agent returned an empty answer.");
            Ok(())
        }
        Some(TurnOutcome::Failed(diagnostic)) => {
            writeln!(stdout)?;
            eprintln!("❌ {diagnostic}");
            bail!("agent call failed")
        }
        None => bail!("no answer was requested"),
    }
}

/// Report which agent settings are configured.
pub fn check(config: &Config) -> Result<()> {
    println!("🔎 Agent settings:");
    for (name, value) in config.agent.settings() {
        match value {
            Some(value) => println!("  ✅ {name}: {value}"),
            None => println!("  ❌ {name}: not set"),
        }
    }
    if let Some(endpoint) = config.agent.endpoint.as_deref() {
        println!("  ℹ️  Endpoint override: {endpoint}");
    }
    println!("  ℹ️  Config directory: {}", config.home.display());

    if !config.agent.is_complete() {
        println!();
        println!(
            "Set {}, {} and {} in the environment, a .env file, or {}.",
            crate::config::ENV_REGION,
            crate::config::ENV_AGENT_ID,
            crate::config::ENV_AGENT_ALIAS_ID,
            config.home.join("config.toml").display()
        );
        bail!("agent configuration is incomplete");
    }

    io::stdout().flush().context("Failed to write report")?;
    Ok(())
}
