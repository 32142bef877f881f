//! Core middleware trait and chain types.
//!
//! Every pipeline stage implements [`Middleware`]. A stage receives the
//! per-request context, the request, and a [`Next`] that continues the chain.
//! Pre-handler stages reject by returning a response without calling `next`;
//! post-handler stages call `next` first and then inspect the response.
//!
//! A pre-handler stage whose decision needs only the request head also
//! implements [`Middleware::screen`], which the server runs before reading
//! the body.

use std::future::Future;
use std::pin::Pin;

use http::request::Parts;

use crate::context::RequestContext;
use crate::types::{Request, Response};

/// A boxed future that returns a response.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The terminal handler invoked after the last stage.
pub type Handler<'a> =
    Box<dyn FnOnce(&mut RequestContext, Request) -> BoxFuture<'static, Response> + Send + 'a>;

/// The core middleware trait.
///
/// Stage instances are shared by every in-flight request, so they hold only
/// immutable configuration and shared clients. Per-request state belongs in
/// the [`RequestContext`].
pub trait Middleware: Send + Sync + 'static {
    /// Returns the stage name used in logs.
    fn name(&self) -> &'static str;

    /// Processes the request through this stage.
    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response>;

    /// Header-only check run before the body is read.
    ///
    /// Returns the rejection, or `None` to let the request through. `process`
    /// must reach the same verdict for the same head.
    fn screen(&self, _ctx: &RequestContext, _head: &Parts) -> Option<Response> {
        None
    }
}

/// Continuation to the rest of the chain.
///
/// `run` consumes `self`, so the downstream chain runs at most once.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    Handler(Handler<'a>),
}

impl<'a> Next<'a> {
    /// Creates a `Next` that invokes `middleware`, then `next`.
    pub(crate) fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal `Next` that invokes the handler.
    pub fn handler<F>(f: F) -> Self
    where
        F: FnOnce(&mut RequestContext, Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        Self {
            inner: NextInner::Handler(Box::new(f)),
        }
    }

    /// Invokes the next stage or the handler.
    pub async fn run(self, ctx: &mut RequestContext, request: Request) -> Response {
        match self.inner {
            NextInner::Chain { middleware, next } => middleware.process(ctx, request, *next).await,
            NextInner::Handler(handler) => handler(ctx, request).await,
        }
    }
}
