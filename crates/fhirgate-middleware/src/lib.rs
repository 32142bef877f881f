//! # fhirgate Middleware
//!
//! The fixed-order interception pipeline placed in front of a FHIR server.
//!
//! ## Pipeline Stages
//!
//! ```text
//! Request → ResourceGate → AuthGate → Handler
//!                                        ↓
//! Response ← OutboundNotifier ← CapabilityFilter
//! ```
//!
//! | Stage | Middleware        | Purpose                                       |
//! |-------|-------------------|-----------------------------------------------|
//! | 1     | Resource Gate     | Reject paths outside `{root}/Patient`         |
//! | 2     | Auth Gate         | Validate the bearer credential remotely       |
//! | 3     | Capability Filter | Prune discovery documents to Patient          |
//! | 4     | Outbound Notifier | Forward successful mutations downstream       |
//!
//! Stages share state only through the per-request [`RequestContext`]. The
//! auth gate stores the identity token there and the notifier reads it back.
//!
//! ## Example
//!
//! ```
//! use fhirgate_middleware::pipeline::Stage;
//!
//! let stages = Stage::all();
//! assert_eq!(stages.len(), 4);
//! assert_eq!(stages[0].name(), "resource_gate");
//! assert!(stages[3].is_post_handler());
//! ```

#![doc(html_root_url = "https://docs.rs/fhirgate-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod authenticator;
pub mod context;
pub mod middleware;
pub mod notifier_client;
pub mod pipeline;
pub mod remote;
pub mod stages;
pub mod types;

// Re-export main types at crate root
pub use authenticator::{AuthenticatorClient, ValidationPayload};
pub use context::RequestContext;
pub use middleware::{BoxFuture, Middleware, Next};
pub use notifier_client::{Notification, NotifierClient};
pub use pipeline::{Pipeline, PipelineBuilder, Stage};
pub use remote::RemoteError;
pub use stages::{
    ApiError, AuthGateMiddleware, CapabilityFilterMiddleware, NotifierMiddleware,
    ResourceGateMiddleware,
};
pub use types::{Request, Response, ResponseExt};
