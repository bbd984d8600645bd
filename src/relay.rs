//! Streaming relay: one question in, answer fragments and a summary out.

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::io;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;

use crate::agent::{AgentClient, AgentEvent, EventStreamCodec};
use crate::citations::CitationSet;
use crate::config::AgentConfig;
use crate::error::RelayError;
use crate::session::SessionId;

/// Events produced for one question, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// Answer-text fragment, forwarded as soon as it arrives
    Chunk(String),
    /// Always the last event of a successful call
    Done(TurnSummary),
}

/// What the trace told us about an answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnSummary {
    /// Every distinct citation URI, first-seen order, uncapped
    pub citations: Vec<String>,
    pub trace_events: usize,
}

/// Lazy event stream for one call. Ends after `Done` or after the first error.
pub type RelayStream = BoxStream<'static, Result<RelayEvent, RelayError>>;

type FrameStream =
    FramedRead<StreamReader<BoxStream<'static, io::Result<Bytes>>, Bytes>, EventStreamCodec>;

#[derive(Clone)]
pub struct AgentRelay {
    client: AgentClient,
}

impl AgentRelay {
    pub fn new(client: AgentClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self, RelayError> {
        Ok(Self::new(AgentClient::new(config.clone())?))
    }

    /// Ask `question` within `session`.
    ///
    /// Nothing is sent until the stream is first polled. Dropping the stream
    /// abandons the request.
    pub fn stream(&self, question: impl Into<String>, session: &SessionId) -> RelayStream {
        let state = RelayState::Pending {
            client: self.client.clone(),
            question: question.into(),
            session: session.clone(),
        };
        stream::try_unfold(state, RelayState::advance).boxed()
    }
}

enum RelayState {
    Pending {
        client: AgentClient,
        question: String,
        session: SessionId,
    },
    Streaming {
        frames: FrameStream,
        citations: CitationSet,
        trace_events: usize,
    },
    Finished,
}

impl RelayState {
    async fn advance(self) -> Result<Option<(RelayEvent, RelayState)>, RelayError> {
        let (mut frames, mut citations, mut trace_events) = match self {
            RelayState::Pending {
                client,
                question,
                session,
            } => {
                let response = client.invoke(&question, &session).await?;
                let body = response
                    .bytes_stream()
                    .map(|chunk| chunk.map_err(io::Error::other))
                    .boxed();
                (
                    FramedRead::new(StreamReader::new(body), EventStreamCodec),
                    CitationSet::new(),
                    0,
                )
            }
            RelayState::Streaming {
                frames,
                citations,
                trace_events,
            } => (frames, citations, trace_events),
            RelayState::Finished => return Ok(None),
        };

        while let Some(message) = frames.next().await {
            match AgentEvent::from_message(&message?)? {
                AgentEvent::Chunk(Some(text)) => {
                    let next = RelayState::Streaming {
                        frames,
                        citations,
                        trace_events,
                    };
                    return Ok(Some((RelayEvent::Chunk(text), next)));
                }
                AgentEvent::Chunk(None) => {}
                AgentEvent::Trace(trace) => {
                    trace_events += 1;
                    citations.extend_from_trace(&trace);
                }
                AgentEvent::Other(kind) => {
                    tracing::debug!(kind = %kind, "skipping agent event");
                }
            }
        }

        tracing::info!(
            trace_events,
            citations = citations.len(),
            "agent response complete"
        );
        let summary = TurnSummary {
            citations: citations.into_vec(),
            trace_events,
        };
        Ok(Some((RelayEvent::Done(summary), RelayState::Finished)))
    }
}
