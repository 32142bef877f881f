//! Per-request context threaded through every stage.
//!
//! [`RequestContext`] replaces an ambient key-value store with explicit
//! context passing: each stage receives `&mut RequestContext`, and the
//! post-handler stages read what the pre-handler stages wrote.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use http::Method;
use uuid::Uuid;

use fhirgate_core::{CachedBody, AUTHENTICATED_USER_LOGIN_ID};

use crate::types::Request;

/// Context that flows through the pipeline for one request.
///
/// # Example
///
/// ```
/// use fhirgate_middleware::context::RequestContext;
/// use http::Method;
///
/// let mut ctx = RequestContext::new(Method::POST, "/fhir/Patient");
/// ctx.set_authenticated_user_login_id("abc123");
///
/// assert_eq!(ctx.authenticated_user_login_id(), Some("abc123"));
/// assert_eq!(ctx.attribute("authenticatedUserLoginId"), Some("abc123"));
/// ```
#[derive(Debug)]
pub struct RequestContext {
    request_id: Uuid,
    method: Method,
    path: String,
    started_at: Instant,
    attributes: HashMap<String, String>,
    cached_body: Option<CachedBody>,
}

impl RequestContext {
    /// Creates a context with a fresh UUID v7 request id.
    ///
    /// `path` must not include the query string.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            method,
            path: path.into(),
            started_at: Instant::now(),
            attributes: HashMap::new(),
            cached_body: None,
        }
    }

    /// Creates a context from an inbound request.
    #[must_use]
    pub fn for_request(request: &Request) -> Self {
        Self::new(request.method().clone(), request.uri().path())
    }

    /// Replaces the request id, e.g. with one propagated by the caller.
    #[must_use]
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    /// Returns the request id.
    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// The original request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The original request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stores a string attribute.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Reads a string attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Removes and returns a string attribute.
    pub fn remove_attribute(&mut self, key: &str) -> Option<String> {
        self.attributes.remove(key)
    }

    /// The identity token minted by the remote authenticator.
    #[must_use]
    pub fn authenticated_user_login_id(&self) -> Option<&str> {
        self.attribute(AUTHENTICATED_USER_LOGIN_ID)
    }

    /// Records the identity token minted by the remote authenticator.
    pub fn set_authenticated_user_login_id(&mut self, login_id: impl Into<String>) {
        self.set_attribute(AUTHENTICATED_USER_LOGIN_ID, login_id);
    }

    /// The request body, if a stage captured it.
    #[must_use]
    pub fn cached_body(&self) -> Option<&CachedBody> {
        self.cached_body.as_ref()
    }

    /// Stores the captured request body.
    pub fn set_cached_body(&mut self, body: CachedBody) {
        self.cached_body = Some(body);
    }
}
