//! Resource gate middleware.
//!
//! Allows a request only when its path is under `{api_root}/Patient` or hits
//! one of the meta-routes. Everything else is rejected with the host
//! server's own unknown-resource error, so a policy rejection looks the same
//! as a genuinely unknown type. The check uses only the path, so the server
//! runs it through [`Middleware::screen`] before any body is read.

use http::request::Parts;

use fhirgate_core::target::{targets_allowed_resource, MetaRoute, RequestTarget};
use fhirgate_core::GateError;
use fhirgate_telemetry::metrics;

use crate::context::RequestContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::pipeline::Stage;
use crate::types::{Request, Response, ResponseExt};

/// Middleware that enforces the path allow-list.
#[derive(Debug, Clone)]
pub struct ResourceGateMiddleware {
    api_root: String,
}

impl ResourceGateMiddleware {
    /// Creates the gate for the given api root.
    pub fn new(api_root: impl Into<String>) -> Self {
        Self {
            api_root: api_root.into(),
        }
    }

    /// Checks a path, returning the rejection if it is not allowed.
    pub fn check(&self, path: &str) -> Result<(), GateError> {
        if targets_allowed_resource(&self.api_root, path)
            || MetaRoute::resolve(&self.api_root, path).is_some()
        {
            return Ok(());
        }

        let target = RequestTarget::parse(&self.api_root, path);
        Err(GateError::unknown_resource_type(target.rejected_segment()))
    }

    fn verdict(&self, ctx: &RequestContext) -> Option<Response> {
        let error = self.check(ctx.path()).err()?;
        tracing::info!(
            request_id = %ctx.request_id(),
            stage = self.name(),
            path = ctx.path(),
            error = %error,
            "Request rejected"
        );
        metrics::record_resource_gate_rejection();
        Some(Response::operation_outcome(&error))
    }
}

impl Middleware for ResourceGateMiddleware {
    fn name(&self) -> &'static str {
        Stage::ResourceGate.name()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            match self.verdict(ctx) {
                Some(rejection) => rejection,
                None => next.run(ctx, request).await,
            }
        })
    }

    fn screen(&self, ctx: &RequestContext, _head: &Parts) -> Option<Response> {
        self.verdict(ctx)
    }
}
