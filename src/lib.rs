pub mod agent;
pub mod chat;
pub mod citations;
pub mod commands;
pub mod config;
pub mod error;
pub mod relay;
pub mod session;
pub mod tui;

pub use citations::collect;
pub use error::RelayError;
pub use relay::{AgentRelay, RelayEvent, RelayStream, TurnSummary};
pub use session::SessionId;
