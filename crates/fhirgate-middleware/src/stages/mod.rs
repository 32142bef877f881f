//! The four interception stages.
//!
//! ## Pre-Handler Stages
//!
//! 1. [`resource_gate`] - path allow-list
//! 2. [`auth_gate`] - remote credential validation
//!
//! ## Post-Handler Stages
//!
//! 3. [`capability_filter`] - discovery document pruning
//! 4. [`notifier`] - downstream notification

pub mod auth_gate;
pub mod capability_filter;
pub mod notifier;
pub mod resource_gate;

pub use auth_gate::{ApiError, AuthGateMiddleware};
pub use capability_filter::CapabilityFilterMiddleware;
pub use notifier::NotifierMiddleware;
pub use resource_gate::ResourceGateMiddleware;
