use thiserror::Error;

use crate::agent::eventstream::EventStreamError;
use crate::agent::sigv4::SigningError;

/// Failure of one relay call. A call reports at most one of these.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("{0} is not configured")]
    Configuration(&'static str),

    #[error("invalid agent endpoint {0}")]
    InvalidEndpoint(String),

    #[error("could not resolve AWS credentials: {0}")]
    Credentials(String),

    #[error("could not sign request: {0}")]
    Signing(#[from] SigningError),

    #[error("request to agent endpoint failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("agent endpoint returned HTTP {status} {code}: {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },

    #[error("agent aborted the response with {kind}: {message}")]
    Exception { kind: String, message: String },

    #[error("malformed response stream: {0}")]
    Stream(#[from] EventStreamError),

    #[error("malformed {event} event: {reason}")]
    Decode { event: &'static str, reason: String },
}

impl RelayError {
    /// Configuration, credential and permission problems as opposed to
    /// network or protocol breakage.
    pub fn is_setup_problem(&self) -> bool {
        match self {
            RelayError::Configuration(_)
            | RelayError::InvalidEndpoint(_)
            | RelayError::Credentials(_) => true,
            RelayError::Service { status, .. } => matches!(status, 400 | 401 | 403 | 404),
            _ => false,
        }
    }
}
