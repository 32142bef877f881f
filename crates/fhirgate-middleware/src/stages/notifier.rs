//! Outbound notifier middleware.
//!
//! After a successful Patient mutation the resulting representation is
//! forwarded to the notifications endpoint, tagged with the identity token
//! the auth gate recorded. Forwarding never changes the response the caller
//! receives.

use std::sync::Arc;

use bytes::Bytes;
use http::{header::CONTENT_TYPE, HeaderMap, Method};
use http_body_util::Full;
use tracing::Instrument;

use fhirgate_config::DispatchMode;
use fhirgate_core::target::targets_allowed_resource;
use fhirgate_core::{GateError, RequestTarget, ResourceCodec, SchemaVersion};
use fhirgate_telemetry::metrics;

use crate::context::RequestContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::notifier_client::{Notification, NotifierClient};
use crate::pipeline::Stage;
use crate::types::{collect_body, Request, Response};

/// Post-handler stage that forwards successful mutations.
#[derive(Debug, Clone)]
pub struct NotifierMiddleware {
    api_root: String,
    default_version: String,
    dispatch: DispatchMode,
    client: Arc<NotifierClient>,
}

impl NotifierMiddleware {
    /// Creates the notifier.
    ///
    /// `default_version` is used when the response does not name its FHIR
    /// version in `Content-Type`.
    pub fn new(
        api_root: impl Into<String>,
        default_version: &str,
        dispatch: DispatchMode,
        client: Arc<NotifierClient>,
    ) -> Self {
        Self {
            api_root: api_root.into(),
            default_version: default_version.to_string(),
            dispatch,
            client,
        }
    }

    /// Classifies the schema version of a response.
    pub fn schema_version(&self, headers: &HeaderMap) -> Result<SchemaVersion, GateError> {
        let declared = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(SchemaVersion::from_content_type);
        SchemaVersion::classify(declared.unwrap_or(&self.default_version))
    }

    /// Builds the notification for a successful response.
    ///
    /// Returns `Ok(None)` for methods that do not mutate.
    pub fn prepare(
        &self,
        ctx: &RequestContext,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Option<Notification>, GateError> {
        let method = ctx.method();
        if ![Method::POST, Method::PUT, Method::PATCH, Method::DELETE].contains(method) {
            return Ok(None);
        }

        let version = self.schema_version(headers)?;
        let codec = ResourceCodec::for_version(version);
        let path_id = RequestTarget::parse(&self.api_root, ctx.path())
            .resource_id()
            .map(ToString::to_string);

        tracing::debug!(
            request_id = %ctx.request_id(),
            stage = self.name(),
            version = %version,
            context = codec.context().name(),
            "Encoding context selected"
        );

        if method == Method::DELETE {
            let id = path_id.ok_or_else(|| GateError::internal("Deleted resource has no id."))?;
            return Ok(Some(Notification::Deleted { id }));
        }

        let encoded = codec.encode(body, ctx.authenticated_user_login_id())?;
        if method == Method::POST {
            return Ok(Some(Notification::Created {
                payload: encoded.payload,
            }));
        }

        let id = encoded
            .id
            .or(path_id)
            .ok_or_else(|| GateError::internal("Updated resource has no id."))?;
        Ok(Some(Notification::Updated {
            id,
            payload: encoded.payload,
        }))
    }

    async fn dispatch(&self, notification: Notification) {
        match self.dispatch {
            DispatchMode::Inline => self.client.deliver(notification).await,
            DispatchMode::Detached => {
                let client = Arc::clone(&self.client);
                tokio::spawn(
                    async move { client.deliver(notification).await }
                        .instrument(tracing::Span::current()),
                );
            }
        }
    }
}

impl Middleware for NotifierMiddleware {
    fn name(&self) -> &'static str {
        Stage::OutboundNotifier.name()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let response = next.run(ctx, request).await;

            if !response.status().is_success() || !targets_allowed_resource(&self.api_root, ctx.path())
            {
                return response;
            }

            let (parts, body) = response.into_parts();
            let bytes: Bytes = collect_body(body).await;

            match self.prepare(ctx, &parts.headers, &bytes) {
                Ok(Some(notification)) => {
                    tracing::info!(
                        request_id = %ctx.request_id(),
                        stage = self.name(),
                        method = %notification.method(),
                        "Forwarding notification"
                    );
                    self.dispatch(notification).await;
                }
                Ok(None) => {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        stage = self.name(),
                        method = %ctx.method(),
                        "Request method does not match any notification"
                    );
                    metrics::record_notification("skipped");
                }
                Err(error) => {
                    let outcome = match &error {
                        GateError::UnsupportedSchemaVersion { .. } => "unsupported_version",
                        _ => "encode_failed",
                    };
                    tracing::error!(
                        request_id = %ctx.request_id(),
                        stage = self.name(),
                        error = %error,
                        "Notification not sent"
                    );
                    metrics::record_notification(outcome);
                }
            }

            Response::from_parts(parts, Full::new(bytes))
        })
    }
}
