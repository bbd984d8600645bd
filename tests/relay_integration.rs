//! End-to-end relay tests against a local mock of the agent runtime.
//!
//! The mock replays event-stream encoded bodies, so these cover the whole path:
//! signing, HTTP, frame decoding, chunk decoding and trace citation collection.

use auditdesk::agent::events::{chunk_message, exception_message, trace_message};
use auditdesk::agent::{AgentClient, CredentialSource, Credentials, EventStreamCodec, Message};
use auditdesk::chat::{ChatSession, Role, TurnOutcome};
use auditdesk::config::AgentConfig;
use auditdesk::{AgentRelay, RelayError, RelayEvent, SessionId, TurnSummary};
use bytes::BytesMut;
use futures::StreamExt;
use serde_json::json;
use tokio_util::codec::Encoder;
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const INVOKE_PATH: &str = "/agents/AGENT1/agentAliases/ALIAS1/sessions/chat-test/text";

fn relay_for(server: &MockServer) -> AgentRelay {
    let config = AgentConfig {
        region: Some("us-east-1".into()),
        agent_id: Some("AGENT1".into()),
        agent_alias_id: Some("ALIAS1".into()),
        endpoint: Some(server.uri()),
        request_timeout_secs: Some(10),
    };
    let client = AgentClient::new(config)
        .expect("client")
        .with_credentials(CredentialSource::Static(Credentials {
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".into(),
            session_token: None,
        }));
    AgentRelay::new(client)
}

fn event_stream_body(messages: Vec<Message>) -> Vec<u8> {
    let mut buf = BytesMut::new();
    for message in messages {
        EventStreamCodec.encode(message, &mut buf).expect("encode");
    }
    buf.to_vec()
}

fn event_stream_response(messages: Vec<Message>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        event_stream_body(messages),
        "application/vnd.amazon.eventstream",
    )
}

async fn drain(relay: &AgentRelay, question: &str) -> Vec<Result<RelayEvent, RelayError>> {
    relay
        .stream(question, &SessionId::new("chat-test"))
        .collect()
        .await
}

#[tokio::test]
async fn streams_chunks_then_done_with_citations() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(INVOKE_PATH))
        .and(header_exists("authorization"))
        .and(header_exists("x-amz-date"))
        .and(header("accept", "application/vnd.amazon.eventstream"))
        .and(body_json(json!({
            "inputText": "What is the refund policy?",
            "enableTrace": true
        })))
        .respond_with(event_stream_response(vec![
            trace_message(&json!({
                "trace": {"orchestrationTrace": {"observation": {
                    "knowledgeBaseLookupOutput": {"retrievedReferences": [
                        {"location": {"s3Location": {"uri": "s3://faq/policy.pdf"}}},
                        {"location": {"s3Location": {"uri": "s3://faq/sop.pdf"}}}
                    ]}
                }}}
            })),
            chunk_message("Refunds are issued "),
            trace_message(&json!({"trace": {"s3Uri": "s3://faq/policy.pdf"}})),
            chunk_message("within 30 days."),
            trace_message(&json!({"trace": {"uri": "s3://faq/donor-rules.pdf"}})),
        ]))
        .expect(1)
        .mount(&server)
        .await;

    let events = drain(&relay_for(&server), "What is the refund policy?").await;
    let events: Vec<RelayEvent> = events.into_iter().map(|e| e.expect("event")).collect();

    assert_eq!(
        events,
        vec![
            RelayEvent::Chunk("Refunds are issued ".into()),
            RelayEvent::Chunk("within 30 days.".into()),
            RelayEvent::Done(TurnSummary {
                citations: vec![
                    "s3://faq/policy.pdf".into(),
                    "s3://faq/sop.pdf".into(),
                    "s3://faq/donor-rules.pdf".into(),
                ],
                trace_events: 3,
            }),
        ]
    );
}

#[tokio::test]
async fn chat_caps_displayed_citations_at_two() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(INVOKE_PATH))
        .respond_with(event_stream_response(vec![
            chunk_message("See the policy."),
            trace_message(&json!([
                {"uri": "s3://faq/a.pdf"},
                {"uri": "s3://faq/b.pdf"},
                {"uri": "s3://faq/c.pdf"}
            ])),
        ]))
        .mount(&server)
        .await;

    let relay = relay_for(&server);
    let mut chat = ChatSession::with_id(SessionId::new("chat-test"), 2);
    let question = chat.submit("policy?").expect("question");
    let mut stream = relay.stream(question, chat.id());
    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => chat.apply(event),
            Err(error) => chat.fail(&error),
        }
    }

    assert_eq!(
        chat.finish(),
        Some(TurnOutcome::Answered { citations: 2, trace_events: 1 })
    );
    let answer = chat.messages().last().expect("answer");
    assert_eq!(answer.role, Role::Assistant);
    assert_eq!(answer.citations, ["s3://faq/a.pdf", "s3://faq/b.pdf"]);
}

#[tokio::test]
async fn rejected_call_fails_before_any_chunk_and_leaves_history_alone() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(404)
                .insert_header(
                    "x-amzn-errortype",
                    "ResourceNotFoundException:http://internal.amazon.com/coral/",
                )
                .set_body_json(json!({"message": "Failed to retrieve resource because it doesn't exist."})),
        )
        .mount(&server)
        .await;

    let events = drain(&relay_for(&server), "hello").await;
    assert_eq!(events.len(), 1);
    match &events[0] {
        Err(RelayError::Service { status, code, message }) => {
            assert_eq!(*status, 404);
            assert_eq!(code, "ResourceNotFoundException");
            assert!(message.contains("doesn't exist"));
        }
        other => panic!("expected a service error, got {other:?}"),
    }
    assert!(events[0].as_ref().unwrap_err().is_setup_problem());

    let mut chat = ChatSession::with_id(SessionId::new("chat-test"), 2);
    chat.submit("hello");
    for item in events {
        match item {
            Ok(event) => chat.apply(event),
            Err(error) => chat.fail(&error),
        }
    }
    assert!(matches!(chat.finish(), Some(TurnOutcome::Failed(_))));
    assert_eq!(chat.messages().len(), 1);
    assert_eq!(chat.messages()[0].role, Role::User);
}

#[tokio::test]
async fn mid_stream_exception_ends_without_done() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(event_stream_response(vec![
            chunk_message("Partial "),
            exception_message("throttlingException", "Rate exceeded"),
            chunk_message("never delivered"),
        ]))
        .mount(&server)
        .await;

    let events = drain(&relay_for(&server), "hello").await;
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[0].as_ref().expect("chunk"),
        &RelayEvent::Chunk("Partial ".into())
    );
    assert!(matches!(
        &events[1],
        Err(RelayError::Exception { kind, .. }) if kind == "throttlingException"
    ));
}

#[tokio::test]
async fn truncated_body_is_a_stream_error() {
    let server = MockServer::start().await;
    let mut body = event_stream_body(vec![chunk_message("whole"), chunk_message("cut")]);
    body.truncate(body.len() - 5);
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body, "application/vnd.amazon.eventstream"),
        )
        .mount(&server)
        .await;

    let events = drain(&relay_for(&server), "hello").await;
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], Ok(RelayEvent::Chunk(text)) if text == "whole"));
    assert!(matches!(&events[1], Err(RelayError::Stream(_))));
}

#[tokio::test]
async fn missing_settings_fail_without_a_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = AgentConfig {
        region: Some("us-east-1".into()),
        agent_id: None,
        agent_alias_id: Some("ALIAS1".into()),
        endpoint: Some(server.uri()),
        request_timeout_secs: None,
    };
    let relay = AgentRelay::new(AgentClient::new(config).expect("client"));

    let events = drain(&relay, "hello").await;
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], Err(RelayError::Configuration(_))));
}

#[tokio::test]
async fn stream_is_lazy_until_polled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(event_stream_response(vec![chunk_message("hi")]))
        .expect(0)
        .mount(&server)
        .await;

    let relay = relay_for(&server);
    let stream = relay.stream("hello", &SessionId::new("chat-test"));
    drop(stream);
}
