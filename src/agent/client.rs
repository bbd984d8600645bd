use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::Url;
use serde::Deserialize;
use tokio::time::Duration;

use crate::agent::credentials::CredentialSource;
use crate::agent::sigv4::{self, SignableRequest, SigningParams};
use crate::config::AgentConfig;
use crate::error::RelayError;
use crate::session::SessionId;

/// Signing name of the agent runtime service.
pub const SIGNING_SERVICE: &str = "bedrock";

const EVENT_STREAM_CONTENT_TYPE: &str = "application/vnd.amazon.eventstream";

/// Client for the agent runtime `InvokeAgent` operation
#[derive(Clone)]
pub struct AgentClient {
    config: AgentConfig,
    credentials: CredentialSource,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    #[serde(alias = "Message")]
    message: Option<String>,
}

impl AgentClient {
    pub fn new(config: AgentConfig) -> Result<Self, RelayError> {
        let mut builder = reqwest::Client::builder().connect_timeout(Duration::from_secs(10));
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            config,
            credentials: CredentialSource::default_chain(),
            client: builder.build()?,
        })
    }

    pub fn with_credentials(mut self, credentials: CredentialSource) -> Self {
        self.credentials = credentials;
        self
    }

    /// Send one question and return the still-streaming response.
    ///
    /// Settings are checked here rather than at construction so a half
    /// configured client can exist and report the problem per call.
    pub async fn invoke(
        &self,
        question: &str,
        session: &SessionId,
    ) -> Result<reqwest::Response, RelayError> {
        let region = required(&self.config.region, "AWS region (AWS_REGION)")?;
        let agent_id = required(&self.config.agent_id, "agent ID (BEDROCK_AGENT_ID)")?;
        let alias_id = required(
            &self.config.agent_alias_id,
            "agent alias ID (BEDROCK_AGENT_ALIAS_ID)",
        )?;

        let url = self.invoke_url(region, agent_id, alias_id, session)?;
        let host = match url.port() {
            Some(port) => format!("{}:{port}", url.host_str().unwrap_or_default()),
            None => url.host_str().unwrap_or_default().to_string(),
        };

        let body = serde_json::json!({
            "inputText": question,
            "enableTrace": true,
        })
        .to_string()
        .into_bytes();

        let credentials = self.credentials.resolve(region).await?;
        let signed = sigv4::sign(
            &SignableRequest {
                method: "POST",
                path: url.path(),
                query: url.query().unwrap_or_default(),
                headers: vec![
                    ("host".to_string(), host),
                    ("content-type".to_string(), "application/json".to_string()),
                ],
                body: &body,
            },
            &credentials,
            &SigningParams {
                region,
                service: SIGNING_SERVICE,
                time: chrono::Utc::now(),
            },
        )?;

        tracing::info!(session = %session, agent_id, alias_id, "invoking agent");
        tracing::debug!(%url, "agent request");

        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header("accept", EVENT_STREAM_CONTENT_TYPE);
        for (name, value) in signed.into_pairs() {
            request = request.header(name, value);
        }

        let response = request.body(body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let code = error_code(response.headers());
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ServiceErrorBody>(&text)
                .ok()
                .and_then(|body| body.message)
                .unwrap_or(text);
            tracing::warn!(status, code = %code, "agent endpoint rejected the request");
            return Err(RelayError::Service {
                status,
                code,
                message,
            });
        }

        Ok(response)
    }

    fn invoke_url(
        &self,
        region: &str,
        agent_id: &str,
        alias_id: &str,
        session: &SessionId,
    ) -> Result<Url, RelayError> {
        let base = match self.config.endpoint.as_deref() {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://bedrock-agent-runtime.{region}.amazonaws.com"),
        };
        let raw = format!(
            "{base}/agents/{}/agentAliases/{}/sessions/{}/text",
            urlencoding::encode(agent_id),
            urlencoding::encode(alias_id),
            urlencoding::encode(session.as_str()),
        );
        Url::parse(&raw).map_err(|e| RelayError::InvalidEndpoint(format!("{raw}: {e}")))
    }
}

fn required<'a>(value: &'a Option<String>, what: &'static str) -> Result<&'a str, RelayError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or(RelayError::Configuration(what))
}

/// `x-amzn-errortype` is `Code` or `Code:namespace-url`.
fn error_code(headers: &HeaderMap) -> String {
    headers
        .get("x-amzn-errortype")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(':').next())
        .filter(|code| !code.is_empty())
        .unwrap_or("UnknownError")
        .to_string()
}
