//! Shared plumbing for the remote authenticator and notifier calls.
//!
//! Failures are split into four classes so logs can tell a backend that
//! answered with an error apart from one that could not be reached.

use std::time::Duration;

use http::StatusCode;
use reqwest::{Client, Url};
use thiserror::Error;

/// Errors from a remote call.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The endpoint URL could not be parsed.
    #[error("invalid URI {url}: {reason}")]
    InvalidUri {
        /// The offending URL.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// No response within the configured timeout.
    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    /// Connection or protocol failure.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The backend answered with an error status.
    #[error("{status}: {body}")]
    Backend {
        /// Response status code.
        status: u16,
        /// Response body.
        body: String,
    },
}

impl RemoteError {
    /// Classifies a client error.
    #[must_use]
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error)
        } else {
            Self::Transport(error)
        }
    }

    /// Short class name used as a log field and metric label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUri { .. } => "invalid_uri",
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::Backend { .. } => "backend",
        }
    }

    /// Logs the failure with its classification.
    pub fn log(&self, stage: &'static str) {
        match self {
            Self::Backend { .. } => {
                let message = self.to_string();
                tracing::error!(
                    stage,
                    backend_error_code = backend_error_code(&message).unwrap_or("-"),
                    error = %message,
                    "Remote backend returned an error"
                );
            }
            Self::InvalidUri { url, reason } => {
                tracing::error!(stage, url = %url, reason = %reason, "Invalid remote URI");
            }
            Self::Timeout(_) | Self::Transport(_) => {
                tracing::error!(stage, kind = self.kind(), error = %self, "Remote call failed");
            }
        }
    }
}

/// Extracts the backend error code from a `"<code>: <message>"` string.
#[must_use]
pub fn backend_error_code(message: &str) -> Option<&str> {
    message
        .split_once(':')
        .map(|(code, _)| code.trim())
        .filter(|code| !code.is_empty())
}

/// A configured endpoint, parsed once.
///
/// An unparseable URL is kept so the failure can be reported on every call
/// that tries to use it.
#[derive(Debug, Clone)]
pub struct Endpoint {
    raw: String,
    parsed: Result<Url, String>,
}

impl Endpoint {
    /// Parses `raw`.
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let parsed = Url::parse(&raw).map_err(|e| e.to_string());
        Self { raw, parsed }
    }

    /// The configured string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The parsed URL.
    pub fn url(&self) -> Result<&Url, RemoteError> {
        self.parsed.as_ref().map_err(|reason| RemoteError::InvalidUri {
            url: self.raw.clone(),
            reason: reason.clone(),
        })
    }

    /// The URL of a child resource, `{endpoint}/{id}`.
    pub fn child(&self, id: &str) -> Result<Url, RemoteError> {
        let joined = format!("{}/{id}", self.raw);
        Url::parse(&joined).map_err(|e| RemoteError::InvalidUri {
            url: joined,
            reason: e.to_string(),
        })
    }
}

/// A remote response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteReply {
    /// Status code.
    pub status: StatusCode,
    /// Body as text.
    pub body: String,
}

impl RemoteReply {
    /// Reads status and body from a client response.
    pub async fn read(response: reqwest::Response) -> Result<Self, RemoteError> {
        let status = response.status();
        let body = response.text().await.map_err(RemoteError::from_reqwest)?;
        Ok(Self { status, body })
    }

    /// Converts an error status into [`RemoteError::Backend`].
    pub fn error_for_status(self) -> Result<Self, RemoteError> {
        if self.status.as_u16() >= 400 {
            Err(RemoteError::Backend {
                status: self.status.as_u16(),
                body: self.body,
            })
        } else {
            Ok(self)
        }
    }
}

/// Builds an HTTP client with an explicit timeout.
pub fn build_client(timeout: Duration) -> Result<Client, RemoteError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(RemoteError::Transport)
}
