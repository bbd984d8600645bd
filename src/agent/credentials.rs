use std::fmt;
use std::sync::Arc;

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use tokio::sync::OnceCell;

use crate::error::RelayError;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &self.session_token.as_ref().map(|_| "** redacted **"))
            .finish()
    }
}

/// Where request-signing credentials come from.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    Static(Credentials),
    /// The standard AWS chain: environment, shared profile files, SSO,
    /// container and instance roles. The chain is built on first use and
    /// shared by every clone, so its credential cache survives across turns.
    DefaultChain(Arc<OnceCell<SharedCredentialsProvider>>),
}

impl CredentialSource {
    pub fn default_chain() -> Self {
        CredentialSource::DefaultChain(Arc::new(OnceCell::new()))
    }

    pub async fn resolve(&self, region: &str) -> Result<Credentials, RelayError> {
        match self {
            CredentialSource::Static(credentials) => Ok(credentials.clone()),
            CredentialSource::DefaultChain(provider) => {
                let provider = provider
                    .get_or_try_init(|| load_default_chain(region))
                    .await?;
                let resolved = provider
                    .provide_credentials()
                    .await
                    .map_err(|e| RelayError::Credentials(e.to_string()))?;

                tracing::debug!(access_key_id = resolved.access_key_id(), "resolved AWS credentials");
                Ok(Credentials {
                    access_key_id: resolved.access_key_id().to_string(),
                    secret_access_key: resolved.secret_access_key().to_string(),
                    session_token: resolved.session_token().map(str::to_string),
                })
            }
        }
    }
}

async fn load_default_chain(region: &str) -> Result<SharedCredentialsProvider, RelayError> {
    tracing::debug!(region, "loading the AWS credential provider chain");
    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await;
    sdk_config
        .credentials_provider()
        .ok_or_else(|| RelayError::Credentials("no credentials provider is configured".into()))
}
