use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use auditdesk::commands;
use auditdesk::config::{Config, Overrides};
use auditdesk::relay::AgentRelay;
use auditdesk::tui;

#[derive(Parser)]
#[command(name = "auditdesk")]
#[command(version)]
#[command(about = "Chat with a Bedrock agent over your audit FAQ documents", long_about = None)]
struct Cli {
    /// Config file (default: ~/.auditdesk/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// AWS region of the agent
    #[arg(long, global = true)]
    region: Option<String>,

    /// Agent ID
    #[arg(long, global = true)]
    agent_id: Option<String>,

    /// Agent alias ID
    #[arg(long, global = true)]
    agent_alias_id: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question and stream the answer to stdout
    Ask {
        question: String,
        /// Continue an existing agent session
        #[arg(long)]
        session: Option<String>,
    },
    /// Show which agent settings are configured
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_overrides(Overrides {
        region: cli.region,
        agent_id: cli.agent_id,
        agent_alias_id: cli.agent_alias_id,
    });

    match cli.command {
        None => {
            init_file_logging(&config.log_dir())?;
            tracing::info!(complete = config.agent.is_complete(), "starting chat");
            let relay = AgentRelay::from_config(&config.agent)?;
            tui::run(&config, relay).await
        }
        Some(Commands::Ask { question, session }) => {
            init_stderr_logging();
            let relay = AgentRelay::from_config(&config.agent)?;
            commands::ask(&config, &relay, &question, session).await
        }
        Some(Commands::Check) => {
            init_stderr_logging();
            commands::check(&config)
        }
    }
}

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter("warn"))
        .with_writer(std::io::stderr)
        .init();
}

/// The chat owns the terminal, so its logs go to a file.
fn init_file_logging(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let path = dir.join("auditdesk.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter("info"))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
