//! Chat state shared by the terminal UI and the one-shot `ask` command.
//!
//! `ChatSession` owns the session identifier and the transcript. A turn starts
//! with [`ChatSession::submit`], receives relay events through
//! [`ChatSession::apply`] or [`ChatSession::fail`], and is committed with
//! [`ChatSession::finish`]. Only successful, non-empty answers reach the
//! transcript.

mod turn;

pub use turn::{PendingTurn, failure_diagnostic};

use chrono::{DateTime, Utc};

use crate::citations::citation_label;
use crate::error::RelayError;
use crate::relay::RelayEvent;
use crate::session::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Citation URIs shown under the message, already capped
    pub citations: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: Role, content: String, citations: Vec<String>) -> Self {
        Self {
            role,
            content,
            citations,
            timestamp: Utc::now(),
        }
    }

    /// `Sources: a.pdf | b.pdf`, or nothing when there are no citations.
    pub fn sources_caption(&self) -> Option<String> {
        sources_caption(&self.citations)
    }
}

/// How a finished turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// An assistant message was appended
    Answered { citations: usize, trace_events: usize },
    /// The call succeeded but the agent said nothing
    Empty { trace_events: usize },
    /// The call failed; the diagnostic is for the error surface
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    id: SessionId,
    messages: Vec<ChatMessage>,
    pending: Option<PendingTurn>,
    citation_limit: usize,
    last_trace_events: Option<usize>,
}

impl ChatSession {
    pub fn new(citation_limit: usize) -> Self {
        Self::with_id(SessionId::generate(), citation_limit)
    }

    pub fn with_id(id: SessionId, citation_limit: usize) -> Self {
        Self {
            id,
            messages: Vec::new(),
            pending: None,
            citation_limit,
            last_trace_events: None,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn pending(&self) -> Option<&PendingTurn> {
        self.pending.as_ref()
    }

    /// A turn is in flight; no new question may be sent.
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Trace events seen by the last successful answer
    pub fn last_trace_events(&self) -> Option<usize> {
        self.last_trace_events
    }

    /// Start a turn. Returns the question to send, or `None` if the input is
    /// blank or a turn is already running.
    pub fn submit(&mut self, input: &str) -> Option<String> {
        let question = input.trim();
        if question.is_empty() {
            return None;
        }
        if self.is_busy() {
            tracing::debug!(session = %self.id, "question ignored while a turn is running");
            return None;
        }

        self.messages
            .push(ChatMessage::new(Role::User, question.to_string(), Vec::new()));
        self.pending = Some(PendingTurn::new());
        Some(question.to_string())
    }

    pub fn apply(&mut self, event: RelayEvent) {
        match self.pending.as_mut() {
            Some(turn) => turn.apply(event),
            None => tracing::warn!("relay event without a running turn"),
        }
    }

    pub fn fail(&mut self, error: &RelayError) {
        if error.is_setup_problem() {
            tracing::warn!(session = %self.id, error = %error, "agent call rejected");
        } else {
            tracing::error!(session = %self.id, error = %error, "agent call failed");
        }
        if let Some(turn) = self.pending.as_mut() {
            turn.fail(error);
        }
    }

    /// Commit the running turn. Returns `None` when no turn was running.
    ///
    /// A stream that ended without `Done` or an error counts as a failure.
    pub fn finish(&mut self) -> Option<TurnOutcome> {
        let (text, summary, failure) = self.pending.take()?.into_parts();

        let summary = match (summary, failure) {
            (_, Some(diagnostic)) => return Some(TurnOutcome::Failed(diagnostic)),
            (Some(summary), None) => summary,
            (None, None) => {
                let diagnostic = failure_diagnostic(&RelayError::Decode {
                    event: "response",
                    reason: "stream ended before the answer completed".to_string(),
                });
                return Some(TurnOutcome::Failed(diagnostic));
            }
        };

        self.last_trace_events = Some(summary.trace_events);
        if text.trim().is_empty() {
            return Some(TurnOutcome::Empty {
                trace_events: summary.trace_events,
            });
        }

        let mut citations = summary.citations;
        citations.truncate(self.citation_limit);
        let shown = citations.len();
        self.messages
            .push(ChatMessage::new(Role::Assistant, text, citations));

        Some(TurnOutcome::Answered {
            citations: shown,
            trace_events: summary.trace_events,
        })
    }

    /// Local notice in the transcript; never sent to the agent.
    pub fn push_system(&mut self, content: impl Into<String>) {
        self.messages
            .push(ChatMessage::new(Role::System, content.into(), Vec::new()));
    }

    /// Start a new conversation: fresh id, empty transcript, no running turn.
    pub fn reset(&mut self) {
        let previous = std::mem::replace(&mut self.id, SessionId::generate());
        tracing::info!(previous = %previous, session = %self.id, "new chat session");
        self.messages.clear();
        self.pending = None;
        self.last_trace_events = None;
    }
}

/// `Sources: a.pdf | b.pdf` from citation URIs.
pub fn sources_caption(citations: &[String]) -> Option<String> {
    if citations.is_empty() {
        return None;
    }
    let labels: Vec<&str> = citations.iter().map(|uri| citation_label(uri)).collect();
    Some(format!("Sources: {}", labels.join(" | ")))
}
