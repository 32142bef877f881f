//! Client for the remote authenticator.
//!
//! The authenticator decides whether a bearer credential is valid. For
//! Patient writes it can additionally check contact details taken from the
//! payload.

use std::time::Duration;

use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;

use fhirgate_config::RemoteSettings;

use crate::remote::{build_client, Endpoint, RemoteError, RemoteReply};

/// Body of a payload-aware validation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationPayload {
    /// First non-empty email contact.
    pub email: String,
    /// First non-empty phone contact.
    pub phone: String,
    /// Method of the intercepted request.
    #[serde(rename = "requestHttpMethod")]
    pub request_http_method: String,
}

/// HTTP client for the authenticate-user endpoint.
///
/// The endpoint is resolved once and shared by the token-only and the
/// payload-aware call.
#[derive(Debug, Clone)]
pub struct AuthenticatorClient {
    client: Client,
    endpoint: Endpoint,
}

impl AuthenticatorClient {
    /// Creates a client from the remote settings.
    pub fn new(settings: &RemoteSettings) -> Result<Self, RemoteError> {
        Self::with_url(settings.authenticate_user_url(), settings.request_timeout)
    }

    /// Creates a client for an explicit endpoint URL.
    pub fn with_url(url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: Endpoint::parse(url),
        })
    }

    /// The configured endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    /// Validates the credential alone (GET, no body).
    pub async fn verify_token(&self, token: &str) -> Result<RemoteReply, RemoteError> {
        let url = self.endpoint.url()?.clone();
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(RemoteError::from_reqwest)?;

        RemoteReply::read(response).await
    }

    /// Validates the credential together with payload contact details (POST).
    pub async fn verify_payload(
        &self,
        token: &str,
        payload: &ValidationPayload,
    ) -> Result<RemoteReply, RemoteError> {
        let url = self.endpoint.url()?.clone();
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(ACCEPT, "application/json")
            .json(payload)
            .send()
            .await
            .map_err(RemoteError::from_reqwest)?;

        RemoteReply::read(response).await
    }
}
