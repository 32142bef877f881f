//! Client for the downstream notification endpoint.

use std::time::Duration;

use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{Method, StatusCode};
use reqwest::{Client, Url};

use fhirgate_config::RemoteSettings;
use fhirgate_telemetry::metrics;

use crate::remote::{build_client, Endpoint, RemoteError, RemoteReply};

/// A mutation to forward downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A resource was created; POST to the endpoint.
    Created {
        /// Encoded resource with the identity token merged in.
        payload: String,
    },
    /// A resource was updated; PATCH to `{endpoint}/{id}`.
    Updated {
        /// Logical id of the resource.
        id: String,
        /// Encoded resource with the identity token merged in.
        payload: String,
    },
    /// A resource was deleted; DELETE to `{endpoint}/{id}` with no body.
    Deleted {
        /// Logical id of the resource.
        id: String,
    },
}

impl Notification {
    /// The HTTP method used for the outbound call.
    #[must_use]
    pub fn method(&self) -> Method {
        match self {
            Self::Created { .. } => Method::POST,
            Self::Updated { .. } => Method::PATCH,
            Self::Deleted { .. } => Method::DELETE,
        }
    }
}

/// HTTP client for the notifications endpoint.
///
/// Every call carries the service credential, never the end user's token.
#[derive(Debug, Clone)]
pub struct NotifierClient {
    client: Client,
    endpoint: Endpoint,
    service_token: String,
}

impl NotifierClient {
    /// Creates a client from the remote settings.
    pub fn new(settings: &RemoteSettings) -> Result<Self, RemoteError> {
        Self::with_url(
            settings.notifications_url(),
            settings.client_grant_access_token.clone(),
            settings.request_timeout,
        )
    }

    /// Creates a client for an explicit endpoint URL.
    pub fn with_url(
        url: impl Into<String>,
        service_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: Endpoint::parse(url),
            service_token: service_token.into(),
        })
    }

    /// Sends one notification. Error statuses are returned as
    /// [`RemoteError::Backend`].
    pub async fn send(&self, notification: &Notification) -> Result<StatusCode, RemoteError> {
        let (url, payload): (Url, Option<&str>) = match notification {
            Notification::Created { payload } => (self.endpoint.url()?.clone(), Some(payload.as_str())),
            Notification::Updated { id, payload } => (self.endpoint.child(id)?, Some(payload.as_str())),
            Notification::Deleted { id } => (self.endpoint.child(id)?, None),
        };

        let mut builder = self
            .client
            .request(notification.method(), url)
            .header(AUTHORIZATION, format!("Bearer {}", self.service_token))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        if let Some(payload) = payload {
            builder = builder.body(payload.to_string());
        }

        let response = builder.send().await.map_err(RemoteError::from_reqwest)?;
        let reply = RemoteReply::read(response).await?;
        tracing::info!(
            stage = "outbound_notifier",
            status = reply.status.as_u16(),
            body = %reply.body,
            "Notification endpoint responded"
        );

        reply.error_for_status().map(|reply| reply.status)
    }

    /// Sends a notification and contains every failure.
    ///
    /// Failures are logged and counted, never returned.
    pub async fn deliver(&self, notification: Notification) {
        match self.send(&notification).await {
            Ok(status) => {
                tracing::debug!(
                    stage = "outbound_notifier",
                    method = %notification.method(),
                    status = status.as_u16(),
                    "Notification delivered"
                );
                metrics::record_notification("sent");
            }
            Err(error) => {
                error.log("outbound_notifier");
                metrics::record_notification(error.kind());
            }
        }
    }
}
