//! Header handling between the caller, the sidecar and the upstream.

use http::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT_ENCODING, CONTENT_LENGTH, HOST};
use uuid::Uuid;

/// Correlation header added to every response and forwarded upstream.
pub const HEADER_REQUEST_ID: &str = "x-request-id";

/// Returns true for headers that describe a single connection.
pub fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Copies caller headers for the upstream request.
///
/// `Host` and `Content-Length` are recomputed by the client. `Accept-Encoding`
/// is dropped so the upstream answers in identity encoding: the post-handler
/// stages parse the response body as JSON.
pub fn filter_headers_for_upstream(headers: &HeaderMap) -> HeaderMap {
    filter(headers, |name| {
        *name == HOST || *name == CONTENT_LENGTH || *name == ACCEPT_ENCODING
    })
}

/// Copies upstream headers for the caller response.
///
/// `Content-Length` is dropped because a stage may have replaced the body.
pub fn filter_headers_for_client(headers: &HeaderMap) -> HeaderMap {
    filter(headers, |name| *name == CONTENT_LENGTH)
}

fn filter(headers: &HeaderMap, also_drop: impl Fn(&HeaderName) -> bool) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_hop_by_hop_header(name.as_str()) && !also_drop(name) {
            filtered.append(name.clone(), value.clone());
        }
    }
    filtered
}

/// Sets the correlation header.
pub fn set_request_id(headers: &mut HeaderMap, request_id: Uuid) {
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        headers.insert(HEADER_REQUEST_ID, value);
    }
}
