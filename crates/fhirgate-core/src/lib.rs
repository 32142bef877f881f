//! # fhirgate Core
//!
//! Core types shared by every fhirgate crate.
//!
//! This crate has no I/O. It defines:
//!
//! - [`GateError`] - the caller-visible error taxonomy and its FHIR
//!   `OperationOutcome` rendering
//! - [`RequestTarget`] - parsing of a request path into api root, resource
//!   type and resource id, plus the fixed allow-lists
//! - [`CachedBody`] - a request payload captured once and re-readable
//! - [`SchemaVersion`] / [`ResourceCodec`] - classification of a resource
//!   representation into a supported FHIR version and its encoding
//!
//! ## Example
//!
//! ```
//! use fhirgate_core::{RequestTarget, ALLOWED_RESOURCE_TYPE};
//!
//! let target = RequestTarget::parse("/fhir", "/fhir/Patient/123");
//! assert_eq!(target.resource_type(), Some(ALLOWED_RESOURCE_TYPE));
//! assert_eq!(target.resource_id(), Some("123"));
//! ```

#![doc(html_root_url = "https://docs.rs/fhirgate-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod body;
pub mod error;
pub mod target;
pub mod version;

pub use body::{BodyReader, CachedBody};
pub use error::{ErrorCategory, GateError, GateResult, OperationOutcome, OperationOutcomeIssue};
pub use target::{MetaRoute, RequestTarget, ALLOWED_RESOURCE_TYPE, DEFAULT_API_ROOT};
pub use version::{EncodedResource, EncodingContext, ResourceCodec, SchemaVersion};

/// Request-context key under which the authenticated identity token is stored.
pub const AUTHENTICATED_USER_LOGIN_ID: &str = "authenticatedUserLoginId";
