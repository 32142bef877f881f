//! Common types used throughout the middleware pipeline.

use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};
use http_body_util::{BodyExt, Full};

use fhirgate_core::GateError;

/// The HTTP request type used in the middleware pipeline.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type used in the middleware pipeline.
pub type Response = http::Response<Full<Bytes>>;

/// Content type of FHIR JSON responses.
pub const FHIR_JSON: &str = "application/fhir+json; charset=utf-8";

/// Extension trait for building gate responses.
pub trait ResponseExt {
    /// Renders a [`GateError`] as an `OperationOutcome` with its status code.
    fn operation_outcome(error: &GateError) -> Response;

    /// Creates a JSON response.
    fn json(status: StatusCode, body: &serde_json::Value) -> Response;
}

impl ResponseExt for Response {
    fn operation_outcome(error: &GateError) -> Response {
        let outcome = error.to_operation_outcome();
        match serde_json::to_vec(&outcome) {
            Ok(body) => build(error.status_code(), FHIR_JSON, Bytes::from(body)),
            Err(_) => fallback_internal_error(),
        }
    }

    fn json(status: StatusCode, body: &serde_json::Value) -> Response {
        build(status, "application/json", Bytes::from(body.to_string()))
    }
}

fn build(status: StatusCode, content_type: &'static str, body: Bytes) -> Response {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// A plain-text 500 that cannot fail to build.
#[must_use]
pub fn fallback_internal_error() -> Response {
    build(
        StatusCode::INTERNAL_SERVER_ERROR,
        "text/plain; charset=utf-8",
        Bytes::from_static(b"Internal Server error."),
    )
}

/// Collects a buffered body into its bytes.
pub async fn collect_body(body: Full<Bytes>) -> Bytes {
    match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(never) => match never {},
    }
}

/// Replaces a response body, dropping the stale `Content-Length`.
#[must_use]
pub fn with_body(response: Response, body: Bytes) -> Response {
    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Full::new(body))
}
