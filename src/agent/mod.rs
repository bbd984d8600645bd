//! Outbound protocol for the agent runtime: request signing, the binary
//! event-stream framing of the response, and the typed events inside it.

pub mod client;
pub mod credentials;
pub mod events;
pub mod eventstream;
pub mod sigv4;

pub use client::AgentClient;
pub use credentials::{CredentialSource, Credentials};
pub use events::AgentEvent;
pub use eventstream::{EventStreamCodec, Message};
