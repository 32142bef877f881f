//! Auth gate middleware.
//!
//! Every request must carry `Authorization: Bearer <token>`. The token is
//! validated by the remote authenticator. When payload validation is enabled
//! and the request creates or patches a Patient, the authenticator also
//! receives the first phone and email contact found in the payload.
//!
//! The header check also runs through [`Middleware::screen`], so a request
//! without a credential is refused before its body is read.
//!
//! ## Rejections
//!
//! | Cause | Status | Message |
//! |---|---|---|
//! | Missing or malformed header | 401 | `Invalid or missing Authorization header.` |
//! | Body is not JSON, or has no `telecom` array | 500 | `Internal Server error.` |
//! | First email entry missing or empty | 422 | `The Email is required.` |
//! | First phone entry missing or empty | 422 | `The phone number is required.` |
//! | Authenticator 401 | 401 | `Unauthenticated.` |
//! | Authenticator 403 | 403 | `Unauthorized.` |
//! | Authenticator 422 | 422 | authenticator body, verbatim |
//! | Anything else | 500 | `Internal Server error.` |

use std::sync::Arc;

use http::header::{HeaderMap, AUTHORIZATION};
use http::request::Parts;
use http::{Method, StatusCode};
use http_body_util::Full;
use serde_json::Value;

use fhirgate_core::{CachedBody, GateError, RequestTarget, ALLOWED_RESOURCE_TYPE};
use fhirgate_telemetry::metrics;

use crate::authenticator::{AuthenticatorClient, ValidationPayload};
use crate::context::RequestContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::pipeline::Stage;
use crate::remote::{RemoteError, RemoteReply};
use crate::types::{collect_body, Request, Response, ResponseExt};

const BEARER_PREFIX: &str = "Bearer ";

/// Message for a missing or malformed credential header.
pub const MISSING_CREDENTIAL: &str = "Invalid or missing Authorization header.";

/// Default message when no more specific one was recorded.
pub const DEFAULT_ERROR_MESSAGE: &str = "Internal Server error.";

/// A pending rejection: the reported code and the last recorded message.
///
/// Produced by the validation step and consumed by the rejection path, once
/// per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// Reported status code.
    pub code: u16,
    /// Last recorded message.
    pub message: String,
}

impl Default for ApiError {
    fn default() -> Self {
        Self {
            code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            message: DEFAULT_ERROR_MESSAGE.to_string(),
        }
    }
}

impl ApiError {
    /// Creates a pending error.
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Records an authenticator error reply.
    ///
    /// The remote body replaces the message only for 422.
    #[must_use]
    pub fn from_reply(reply: RemoteReply) -> Self {
        let code = reply.status.as_u16();
        if code == StatusCode::UNPROCESSABLE_ENTITY.as_u16() {
            Self::new(code, reply.body)
        } else {
            Self {
                code,
                ..Self::default()
            }
        }
    }

    /// Maps the pending error to the caller-visible rejection.
    #[must_use]
    pub fn into_gate_error(self) -> GateError {
        match self.code {
            401 => GateError::authentication("Unauthenticated."),
            403 => GateError::forbidden("Unauthorized."),
            422 => GateError::unprocessable(self.message),
            _ => GateError::internal(self.message),
        }
    }
}

/// Contact details scanned from a resource's `telecom` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactPoints {
    /// Value of the first `phone` entry, empty when it has none.
    pub phone: Option<String>,
    /// Value of the first `email` entry, empty when it has none.
    pub email: Option<String>,
}

impl ContactPoints {
    /// Takes the first entry of each system from `telecom`.
    ///
    /// Later entries of the same system are ignored even when the first one
    /// is empty. A resource without a `telecom` array cannot be validated and
    /// fails with the default internal error.
    pub fn scan(resource: &Value) -> Result<Self, ApiError> {
        let entries = resource
            .get("telecom")
            .and_then(Value::as_array)
            .ok_or_else(ApiError::default)?;

        let mut contacts = Self::default();
        for entry in entries {
            let slot = match entry.get("system").and_then(Value::as_str) {
                Some("phone") => &mut contacts.phone,
                Some("email") => &mut contacts.email,
                _ => continue,
            };
            if slot.is_none() {
                let value = entry.get("value").and_then(Value::as_str).unwrap_or_default();
                *slot = Some(value.to_string());
            }
        }

        Ok(contacts)
    }

    /// Builds the validation payload. Email is checked before phone.
    pub fn into_payload(self, method: &Method) -> Result<ValidationPayload, ApiError> {
        let required = |value: Option<String>, message: &str| {
            value
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY.as_u16(), message))
        };
        let email = required(self.email, "The Email is required.")?;
        let phone = required(self.phone, "The phone number is required.")?;

        Ok(ValidationPayload {
            email,
            phone,
            request_http_method: method.as_str().to_string(),
        })
    }
}

/// Extracts the bearer token. The prefix is case-sensitive.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix(BEARER_PREFIX)
        .map(|token| token.trim().to_string())
}

/// Middleware that validates the caller with the remote authenticator.
#[derive(Debug, Clone)]
pub struct AuthGateMiddleware {
    api_root: String,
    validate_patient: bool,
    authenticator: Arc<AuthenticatorClient>,
}

impl AuthGateMiddleware {
    /// Creates the gate.
    pub fn new(
        api_root: impl Into<String>,
        validate_patient: bool,
        authenticator: Arc<AuthenticatorClient>,
    ) -> Self {
        Self {
            api_root: api_root.into(),
            validate_patient,
            authenticator,
        }
    }

    /// Returns true if this request takes the payload-aware branch.
    #[must_use]
    pub fn is_payload_aware(&self, method: &Method, path: &str) -> bool {
        self.validate_patient
            && RequestTarget::parse(&self.api_root, path).resource_type()
                == Some(ALLOWED_RESOURCE_TYPE)
            && (method == Method::POST || method == Method::PATCH)
    }

    /// Calls the authenticator and returns the identity token.
    async fn authenticate(
        &self,
        token: &str,
        payload: Option<&ValidationPayload>,
    ) -> Result<String, ApiError> {
        let reply = match payload {
            Some(payload) => self.authenticator.verify_payload(token, payload).await,
            None => self.authenticator.verify_token(token).await,
        };

        let reply = reply.map_err(|error: RemoteError| {
            error.log(Stage::AuthGate.name());
            ApiError::default()
        })?;

        tracing::info!(
            stage = Stage::AuthGate.name(),
            status = reply.status.as_u16(),
            "Authenticator responded"
        );

        if reply.status.as_u16() >= 400 {
            return Err(ApiError::from_reply(reply));
        }

        login_id(&reply.body).ok_or_else(|| {
            tracing::error!(
                stage = Stage::AuthGate.name(),
                body = %reply.body,
                "Authenticator response has no string id"
            );
            ApiError::default()
        })
    }

    fn missing_credential(&self, ctx: &RequestContext) -> Response {
        self.reject(ctx, &GateError::authentication(MISSING_CREDENTIAL))
    }

    fn reject(&self, ctx: &RequestContext, error: &GateError) -> Response {
        tracing::info!(
            request_id = %ctx.request_id(),
            stage = self.name(),
            status = error.status_code().as_u16(),
            error = %error,
            "Request rejected"
        );
        metrics::record_auth_rejection(error.status_code().as_u16());
        Response::operation_outcome(error)
    }
}

fn login_id(body: &str) -> Option<String> {
    let document: Value = serde_json::from_str(body).ok()?;
    document.get("id")?.as_str().map(ToString::to_string)
}

impl Middleware for AuthGateMiddleware {
    fn name(&self) -> &'static str {
        Stage::AuthGate.name()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let Some(token) = bearer_token(request.headers()) else {
                return self.missing_credential(ctx);
            };

            let (request, payload) = if self.is_payload_aware(ctx.method(), ctx.path()) {
                let (parts, body) = request.into_parts();
                let cached = CachedBody::capture(collect_body(body).await);
                ctx.set_cached_body(cached.clone());

                let Ok(document) = cached.json::<Value>() else {
                    tracing::warn!(
                        request_id = %ctx.request_id(),
                        stage = self.name(),
                        "Payload is not JSON"
                    );
                    return self.reject(ctx, &ApiError::default().into_gate_error());
                };
                let scanned = ContactPoints::scan(&document);
                let payload = match scanned.and_then(|contacts| contacts.into_payload(ctx.method())) {
                    Ok(payload) => payload,
                    Err(pending) => return self.reject(ctx, &pending.into_gate_error()),
                };

                (Request::from_parts(parts, Full::new(cached.bytes())), Some(payload))
            } else {
                (request, None)
            };

            match self.authenticate(&token, payload.as_ref()).await {
                Ok(login_id) => {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        stage = self.name(),
                        "Request authenticated"
                    );
                    ctx.set_authenticated_user_login_id(login_id);
                    next.run(ctx, request).await
                }
                Err(pending) => self.reject(ctx, &pending.into_gate_error()),
            }
        })
    }

    fn screen(&self, ctx: &RequestContext, head: &Parts) -> Option<Response> {
        match bearer_token(&head.headers) {
            Some(_) => None,
            None => Some(self.missing_credential(ctx)),
        }
    }
}
