//! Sidecar HTTP server.
//!
//! Each request is first screened on its head alone: the path allow-list
//! and the credential header are checked before a byte of the body is read.
//! Requests that pass are buffered once, run through the pipeline with the
//! upstream proxy as the handler, and answered. Paths under `/_fhirgate/`
//! are served by the sidecar itself and bypass the pipeline.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use fhirgate_config::GateConfig;
use fhirgate_core::GateError;
use fhirgate_middleware::{BoxFuture, Pipeline, Request, RequestContext, Response, ResponseExt};
use fhirgate_telemetry::metrics;

use crate::error::{SidecarError, SidecarResult};
use crate::headers::set_request_id;
use crate::health::HealthChecker;
use crate::proxy::ProxyClient;

/// Prefix of the sidecar's own endpoints.
pub const INTERNAL_PREFIX: &str = "/_fhirgate/";

/// Shared per-server state.
pub struct GateServer {
    config: Arc<GateConfig>,
    pipeline: Arc<Pipeline>,
    proxy: Arc<ProxyClient>,
    health: Arc<HealthChecker>,
}

impl GateServer {
    /// Creates the server around a built pipeline.
    pub fn new(config: GateConfig, pipeline: Pipeline) -> SidecarResult<Self> {
        let proxy = ProxyClient::new(&config.server)?;
        Ok(Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            proxy: Arc::new(proxy),
            health: Arc::new(HealthChecker::new()),
        })
    }

    /// Binds the listener and serves until the process exits.
    pub async fn run(self) -> SidecarResult<()> {
        let addr: SocketAddr = self.config.listen_socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SidecarError::server(format!("failed to bind {addr}: {e}")))?;

        info!(%addr, upstream = %self.proxy.upstream_url(), "fhirgate sidecar listening");
        self.health.set_ready(true);

        let server = Arc::new(self);
        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    continue;
                }
            };

            let server = Arc::clone(&server);
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let server = Arc::clone(&server);
                    async move { Ok::<_, Infallible>(server.handle(req, peer_addr).await) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(error = %e, "Connection error");
                }
            });
        }
    }

    /// Handles one inbound request.
    pub async fn handle<B>(&self, req: http::Request<B>, peer_addr: SocketAddr) -> Response
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let ctx = RequestContext::new(req.method().clone(), req.uri().path());
        let request_id = ctx.request_id();
        let started = Instant::now();
        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            method = %ctx.method(),
            path = %ctx.path(),
            peer = %peer_addr,
        );

        async move {
            let response = if ctx.path().starts_with(INTERNAL_PREFIX) {
                self.internal_endpoint(ctx.path())
            } else {
                let (parts, body) = req.into_parts();
                if let Some(rejection) = self.pipeline.screen(&ctx, &parts) {
                    return finish(request_id, started, rejection);
                }

                let limit = self.config.server.max_request_body_size;
                match Limited::new(body, limit).collect().await {
                    Ok(collected) => {
                        let request = Request::from_parts(parts, Full::new(collected.to_bytes()));
                        self.dispatch(ctx, request).await
                    }
                    Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                        warn!(limit, "Request body too large");
                        payload_too_large()
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read request body");
                        let error = GateError::invalid_request("Failed to read request body.");
                        Response::operation_outcome(&error)
                    }
                }
            };
            finish(request_id, started, response)
        }
        .instrument(span)
        .await
    }

    /// Runs a buffered request through the pipeline with the proxy as handler.
    pub async fn dispatch(&self, ctx: RequestContext, mut request: Request) -> Response {
        set_request_id(request.headers_mut(), ctx.request_id());

        let proxy = Arc::clone(&self.proxy);
        self.pipeline
            .process(
                ctx,
                request,
                move |_ctx: &mut RequestContext, request: Request| -> BoxFuture<'static, Response> {
                    Box::pin(async move {
                        match proxy.forward(request).await {
                            Ok(response) => response,
                            Err(e) => {
                                error!(error = %e, "Upstream request failed");
                                Response::operation_outcome(&e.into_gate_error())
                            }
                        }
                    })
                },
            )
            .await
    }

    /// Serves `/_fhirgate/*`.
    pub fn internal_endpoint(&self, path: &str) -> Response {
        match path.strip_prefix(INTERNAL_PREFIX).unwrap_or_default() {
            "health" => json_response(StatusCode::OK, &self.health.liveness()),
            "ready" => {
                let report = self.health.readiness();
                let status = if self.health.is_ready() {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                json_response(status, &report)
            }
            "version" => json_response(
                StatusCode::OK,
                &serde_json::json!({ "name": "fhirgate-sidecar", "version": crate::VERSION }),
            ),
            "metrics" => match metrics::render_metrics() {
                Some(body) => text_response(StatusCode::OK, body),
                None => text_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "metrics recorder not installed".to_string(),
                ),
            },
            other => text_response(
                StatusCode::NOT_FOUND,
                format!("unknown internal endpoint: {other}"),
            ),
        }
    }
}

/// Adds the correlation header, records metrics and logs completion.
fn finish(request_id: Uuid, started: Instant, mut response: Response) -> Response {
    set_request_id(response.headers_mut(), request_id);

    let status = response.status().as_u16();
    let elapsed = started.elapsed();
    metrics::record_request(status, elapsed);
    info!(status, duration_ms = elapsed.as_millis(), "Request completed");
    response
}

fn payload_too_large() -> Response {
    let mut response = Response::operation_outcome(&GateError::invalid_request(
        "Request body exceeds the configured limit.",
    ));
    *response.status_mut() = StatusCode::PAYLOAD_TOO_LARGE;
    response
}

fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_value(body) {
        Ok(value) => Response::json(status, &value),
        Err(_) => fhirgate_middleware::types::fallback_internal_error(),
    }
}

fn text_response(status: StatusCode, body: String) -> Response {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}
