//! Typed view over the messages an agent invocation streams back.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::Value;

use crate::agent::eventstream::Message;
use crate::error::RelayError;

/// One item of an agent's response stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Answer-text fragment. `None` when the chunk carried no text.
    Chunk(Option<String>),
    /// Execution-trace payload, kept as an untyped tree.
    Trace(Value),
    /// Any other event type the relay has no use for.
    Other(String),
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    bytes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExceptionPayload {
    #[serde(default, alias = "Message")]
    message: Option<String>,
}

impl AgentEvent {
    /// Interpret a decoded frame. Exception and error frames become errors.
    pub fn from_message(message: &Message) -> Result<Self, RelayError> {
        match message.header_str(":message-type").unwrap_or("event") {
            "event" => Self::from_event(message),
            "exception" => {
                let kind = message
                    .header_str(":exception-type")
                    .unwrap_or("UnknownException")
                    .to_string();
                let text = serde_json::from_slice::<ExceptionPayload>(&message.payload)
                    .ok()
                    .and_then(|payload| payload.message)
                    .unwrap_or_else(|| String::from_utf8_lossy(&message.payload).into_owned());
                Err(RelayError::Exception {
                    kind,
                    message: text,
                })
            }
            "error" => Err(RelayError::Exception {
                kind: message
                    .header_str(":error-code")
                    .unwrap_or("UnknownError")
                    .to_string(),
                message: message
                    .header_str(":error-message")
                    .unwrap_or_default()
                    .to_string(),
            }),
            other => Ok(AgentEvent::Other(format!("message-type:{other}"))),
        }
    }

    fn from_event(message: &Message) -> Result<Self, RelayError> {
        match message.header_str(":event-type").unwrap_or_default() {
            "chunk" => {
                let payload: ChunkPayload =
                    serde_json::from_slice(&message.payload).map_err(|e| RelayError::Decode {
                        event: "chunk",
                        reason: e.to_string(),
                    })?;
                payload.bytes.map(decode_chunk_text).transpose().map(AgentEvent::Chunk)
            }
            "trace" => {
                let trace =
                    serde_json::from_slice(&message.payload).map_err(|e| RelayError::Decode {
                        event: "trace",
                        reason: e.to_string(),
                    })?;
                Ok(AgentEvent::Trace(trace))
            }
            other => Ok(AgentEvent::Other(other.to_string())),
        }
    }
}

fn decode_chunk_text(encoded: String) -> Result<String, RelayError> {
    let raw = STANDARD.decode(encoded.as_bytes()).map_err(|e| RelayError::Decode {
        event: "chunk",
        reason: format!("invalid base64: {e}"),
    })?;
    String::from_utf8(raw).map_err(|e| RelayError::Decode {
        event: "chunk",
        reason: format!("invalid UTF-8: {e}"),
    })
}

/// Build the frame the service sends for a text fragment.
pub fn chunk_message(text: &str) -> Message {
    let payload = serde_json::json!({ "bytes": STANDARD.encode(text) });
    Message::new(payload.to_string())
        .with_str_header(":message-type", "event")
        .with_str_header(":event-type", "chunk")
        .with_str_header(":content-type", "application/json")
}

/// Build the frame the service sends for a trace part.
pub fn trace_message(trace: &Value) -> Message {
    Message::new(trace.to_string())
        .with_str_header(":message-type", "event")
        .with_str_header(":event-type", "trace")
        .with_str_header(":content-type", "application/json")
}

/// Build the frame the service sends when it aborts mid-stream.
pub fn exception_message(kind: &str, text: &str) -> Message {
    let payload = serde_json::json!({ "message": text });
    Message::new(payload.to_string())
        .with_str_header(":message-type", "exception")
        .with_str_header(":exception-type", kind)
        .with_str_header(":content-type", "application/json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chunk_text_is_base64_decoded() {
        let event = AgentEvent::from_message(&chunk_message("Refunds take 30 days.")).unwrap();
        assert_eq!(event, AgentEvent::Chunk(Some("Refunds take 30 days.".into())));
    }

    #[test]
    fn chunk_without_bytes_carries_no_text() {
        let message = Message::new(r#"{"attribution":{"citations":[]}}"#)
            .with_str_header(":message-type", "event")
            .with_str_header(":event-type", "chunk");
        assert_eq!(AgentEvent::from_message(&message).unwrap(), AgentEvent::Chunk(None));
    }

    #[test]
    fn chunk_with_bad_base64_is_a_decode_error() {
        let message = Message::new(r#"{"bytes":"***"}"#)
            .with_str_header(":message-type", "event")
            .with_str_header(":event-type", "chunk");
        let err = AgentEvent::from_message(&message).unwrap_err();
        assert!(matches!(err, RelayError::Decode { event: "chunk", .. }));
    }

    #[test]
    fn trace_payload_is_kept_as_json() {
        let trace = json!({"agentId": "A1", "trace": {"orchestrationTrace": {}}});
        let event = AgentEvent::from_message(&trace_message(&trace)).unwrap();
        assert_eq!(event, AgentEvent::Trace(trace));
    }

    #[test]
    fn unknown_event_types_are_passed_through() {
        let message = Message::new("{}")
            .with_str_header(":message-type", "event")
            .with_str_header(":event-type", "returnControl");
        assert_eq!(
            AgentEvent::from_message(&message).unwrap(),
            AgentEvent::Other("returnControl".into())
        );
    }

    #[test]
    fn exception_frames_become_errors() {
        let message = exception_message("throttlingException", "Rate exceeded");
        match AgentEvent::from_message(&message).unwrap_err() {
            RelayError::Exception { kind, message } => {
                assert_eq!(kind, "throttlingException");
                assert_eq!(message, "Rate exceeded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
