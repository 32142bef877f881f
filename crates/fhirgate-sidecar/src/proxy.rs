//! HTTP proxy client forwarding requests to the upstream FHIR server.

use std::time::Duration;

use http_body_util::Full;
use reqwest::Client;

use fhirgate_config::ServerSettings;
use fhirgate_middleware::types::collect_body;
use fhirgate_middleware::{Request, Response};

use crate::error::{SidecarError, SidecarResult};
use crate::headers::{filter_headers_for_client, filter_headers_for_upstream};

/// HTTP proxy client for the upstream.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    client: Client,
    upstream_url: String,
    timeout: Duration,
}

impl ProxyClient {
    /// Create a new proxy client.
    pub fn new(settings: &ServerSettings) -> SidecarResult<Self> {
        let client = Client::builder()
            .timeout(settings.upstream_timeout)
            .pool_max_idle_per_host(100)
            .build()
            .map_err(|e| SidecarError::server(format!("failed to create client: {e}")))?;

        Ok(Self {
            client,
            upstream_url: settings.upstream_url.trim_end_matches('/').to_string(),
            timeout: settings.upstream_timeout,
        })
    }

    /// Forwards a buffered request and buffers the upstream response.
    pub async fn forward(&self, request: Request) -> SidecarResult<Response> {
        let (parts, body) = request.into_parts();
        let path = parts
            .uri
            .path_and_query()
            .map_or("/", |p| p.as_str());
        let url = format!("{}{path}", self.upstream_url);

        let mut builder = self
            .client
            .request(parts.method.clone(), &url)
            .headers(filter_headers_for_upstream(&parts.headers));

        let body = collect_body(body).await;
        if !body.is_empty() {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SidecarError::upstream(format!("request failed: {e}")))?;

        let status = response.status();
        let headers = filter_headers_for_client(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| SidecarError::upstream(format!("failed to read body: {e}")))?;

        let mut forwarded = Response::new(Full::new(body));
        *forwarded.status_mut() = status;
        *forwarded.headers_mut() = headers;
        Ok(forwarded)
    }

    /// Get the upstream URL.
    pub fn upstream_url(&self) -> &str {
        &self.upstream_url
    }

    /// Get the timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
