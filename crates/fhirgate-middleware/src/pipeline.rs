//! Fixed-order interception pipeline.
//!
//! Each middleware is registered under a [`Stage`], and the stage decides
//! both its position and which side of the handler it runs on. Registration
//! order does not matter.
//!
//! ```text
//! request  → ResourceGate → AuthGate ─────────────────────┐
//!                                                        handler
//! response ← AuthGate ← ResourceGate ← OutboundNotifier ← CapabilityFilter
//! ```
//!
//! Post-handler stages see the response in stage order, so the capability
//! filter has already rewritten a document before the notifier looks at it.

use std::collections::BTreeMap;
use std::sync::Arc;

use fhirgate_config::GateConfig;
use http::request::Parts;

use crate::authenticator::AuthenticatorClient;
use crate::context::RequestContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::notifier_client::NotifierClient;
use crate::stages::{
    AuthGateMiddleware, CapabilityFilterMiddleware, NotifierMiddleware, ResourceGateMiddleware,
};
use crate::types::{Request, Response};

/// The interception pipeline.
///
/// Immutable once built and shared by every in-flight request.
///
/// ```ignore
/// let pipeline = Pipeline::gate(&config, authenticator, notifier);
/// let response = pipeline.process(RequestContext::for_request(&request), request, handler).await;
/// ```
pub struct Pipeline {
    stages: BTreeMap<Stage, Arc<dyn Middleware>>,
}

impl Pipeline {
    /// Starts an empty pipeline.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// The four-stage gate wired from configuration.
    #[must_use]
    pub fn gate(
        config: &GateConfig,
        authenticator: AuthenticatorClient,
        notifier: NotifierClient,
    ) -> Self {
        let root = config.gate.api_root.as_str();

        Self::builder()
            .stage(Stage::ResourceGate, ResourceGateMiddleware::new(root))
            .stage(
                Stage::AuthGate,
                AuthGateMiddleware::new(root, config.gate.validate_patient, Arc::new(authenticator)),
            )
            .stage(Stage::CapabilityFilter, CapabilityFilterMiddleware::new(root))
            .stage(
                Stage::OutboundNotifier,
                NotifierMiddleware::new(
                    root,
                    &config.gate.fhir_version,
                    config.notifier.dispatch,
                    Arc::new(notifier),
                ),
            )
            .build()
    }

    /// Runs `request` through every registered stage and `handler`.
    pub async fn process<H>(&self, mut ctx: RequestContext, request: Request, handler: H) -> Response
    where
        H: FnOnce(&mut RequestContext, Request) -> BoxFuture<'static, Response> + Send + 'static,
    {
        self.chain(handler).run(&mut ctx, request).await
    }

    // Wraps from the handler outwards: post-handler stages in stage order,
    // then pre-handler stages from last to first.
    fn chain<'a, H>(&'a self, handler: H) -> Next<'a>
    where
        H: FnOnce(&mut RequestContext, Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        let (pre, post): (Vec<_>, Vec<_>) = self
            .stages
            .iter()
            .partition(|(stage, _)| stage.is_pre_handler());

        let wrapping = post.into_iter().chain(pre.into_iter().rev());
        wrapping.fold(Next::handler(handler), |next, (_, middleware)| {
            Next::new(middleware.as_ref(), next)
        })
    }

    /// Runs the header-only checks of the pre-handler stages, in order.
    ///
    /// The first rejection is returned. Nothing is read from the body, so a
    /// disallowed path or a missing credential is answered the same way
    /// whatever the payload size.
    pub fn screen(&self, ctx: &RequestContext, head: &Parts) -> Option<Response> {
        self.stages
            .iter()
            .filter(|(stage, _)| stage.is_pre_handler())
            .find_map(|(_, middleware)| middleware.screen(ctx, head))
    }

    /// Registered stages, in hook order.
    pub fn stages(&self) -> impl Iterator<Item = Stage> + '_ {
        self.stages.keys().copied()
    }

    /// Middleware names, in hook order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.values().map(|middleware| middleware.name()).collect()
    }

    /// Whether a middleware is registered for `stage`.
    #[must_use]
    pub fn has(&self, stage: Stage) -> bool {
        self.stages.contains_key(&stage)
    }
}

/// Collects middleware per [`Stage`].
#[derive(Default)]
pub struct PipelineBuilder {
    stages: BTreeMap<Stage, Arc<dyn Middleware>>,
}

impl PipelineBuilder {
    /// Registers `middleware` for `stage`, replacing any earlier one.
    #[must_use]
    pub fn stage<M: Middleware>(mut self, stage: Stage, middleware: M) -> Self {
        self.stages.insert(stage, Arc::new(middleware));
        self
    }

    /// Freezes the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
        }
    }
}

/// The gate's stages, ordered by when they hook into a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Path allow-list.
    ResourceGate = 1,
    /// Remote credential validation.
    AuthGate = 2,
    /// Discovery document pruning, first to see the response.
    CapabilityFilter = 3,
    /// Downstream notification.
    OutboundNotifier = 4,
}

impl Stage {
    /// Runs before the handler and may answer without calling it.
    #[must_use]
    pub const fn is_pre_handler(self) -> bool {
        matches!(self, Self::ResourceGate | Self::AuthGate)
    }

    /// Runs after the handler on its response.
    #[must_use]
    pub const fn is_post_handler(self) -> bool {
        !self.is_pre_handler()
    }

    /// Value of the `stage` log field.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ResourceGate => "resource_gate",
            Self::AuthGate => "auth_gate",
            Self::CapabilityFilter => "capability_filter",
            Self::OutboundNotifier => "outbound_notifier",
        }
    }

    /// Every stage, in hook order.
    #[must_use]
    pub const fn all() -> [Stage; 4] {
        [
            Self::ResourceGate,
            Self::AuthGate,
            Self::CapabilityFilter,
            Self::OutboundNotifier,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Method, StatusCode};
    use http_body_util::Full;
    use std::sync::Mutex;

    struct Trace {
        stage: Stage,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Trace {
        fn name(&self) -> &'static str {
            self.stage.name()
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut RequestContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                self.log.lock().unwrap().push(format!(">{}", self.name()));
                let response = next.run(ctx, request).await;
                self.log.lock().unwrap().push(format!("<{}", self.name()));
                response
            })
        }
    }

    fn request() -> Request {
        http::Request::builder()
            .uri("/fhir/Patient")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    async fn run(pipeline: &Pipeline) -> Response {
        let ctx = RequestContext::new(Method::GET, "/fhir/Patient");
        pipeline
            .process(ctx, request(), |_ctx, _req| {
                Box::pin(async { Response::new(Full::new(Bytes::from("handler"))) })
            })
            .await
    }

    #[tokio::test]
    async fn test_hook_order_ignores_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let trace = |stage| Trace {
            stage,
            log: log.clone(),
        };

        let pipeline = Pipeline::builder()
            .stage(Stage::OutboundNotifier, trace(Stage::OutboundNotifier))
            .stage(Stage::AuthGate, trace(Stage::AuthGate))
            .stage(Stage::CapabilityFilter, trace(Stage::CapabilityFilter))
            .stage(Stage::ResourceGate, trace(Stage::ResourceGate))
            .build();

        assert_eq!(pipeline.stages().collect::<Vec<_>>(), Stage::all());
        assert_eq!(run(&pipeline).await.status(), StatusCode::OK);

        let log = log.lock().unwrap().clone();
        let responses: Vec<&str> = log
            .iter()
            .filter(|entry| entry.starts_with('<'))
            .map(String::as_str)
            .collect();
        assert_eq!(
            responses,
            vec![
                "<capability_filter",
                "<outbound_notifier",
                "<auth_gate",
                "<resource_gate"
            ]
        );
        assert_eq!(log[0], ">resource_gate");
        assert_eq!(log[1], ">auth_gate");
    }

    #[tokio::test]
    async fn test_empty_pipeline_reaches_handler() {
        let pipeline = Pipeline::builder().build();
        assert!(pipeline.stage_names().is_empty());
        assert_eq!(run(&pipeline).await.status(), StatusCode::OK);
    }

    #[test]
    fn test_registering_twice_replaces() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder()
            .stage(
                Stage::AuthGate,
                Trace {
                    stage: Stage::ResourceGate,
                    log: log.clone(),
                },
            )
            .stage(
                Stage::AuthGate,
                Trace {
                    stage: Stage::AuthGate,
                    log,
                },
            )
            .build();

        assert_eq!(pipeline.stage_names(), vec!["auth_gate"]);
        assert!(pipeline.has(Stage::AuthGate));
        assert!(!pipeline.has(Stage::ResourceGate));
    }

    #[test]
    fn test_stage_sides() {
        assert!(Stage::all().windows(2).all(|pair| pair[0] < pair[1]));
        assert!(Stage::ResourceGate.is_pre_handler());
        assert!(Stage::AuthGate.is_pre_handler());
        assert!(Stage::CapabilityFilter.is_post_handler());
        assert!(Stage::OutboundNotifier.is_post_handler());
    }
}
