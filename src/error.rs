use std::time::Duration;
use thiserror::Error;

use crate::reference::ReferenceError;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid daemon host: {0}")]
    InvalidHost(String),

    #[error("invalid service spec: {0}")]
    InvalidSpec(String),

    #[error("failed to build request: {0}")]
    InvalidRequest(#[from] hyper::http::Error),

    #[error("cannot connect to the daemon: {0}")]
    Connect(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("error response from daemon ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("invalid registry credentials: {0}")]
    Auth(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl ClientError {
    /// True if the request went through but the response body was unreadable
    pub fn is_decode(&self) -> bool {
        matches!(self, ClientError::Decode(_))
    }

    /// HTTP status of an error response from the daemon
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
