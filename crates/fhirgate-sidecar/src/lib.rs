//! fhirgate Sidecar - HTTP front for a FHIR server
//!
//! The sidecar listens for FHIR REST traffic, runs every request through the
//! fhirgate pipeline and proxies what passes to the upstream FHIR server.
//!
//! # Architecture
//!
//! ```text
//!            ┌──────────────────────────────┐
//!   caller → │ fhirgate sidecar             │ → upstream FHIR server
//!            │  ResourceGate → AuthGate     │
//!            │  CapabilityFilter ← Notifier │
//!            └───────┬──────────────┬───────┘
//!                    ▼              ▼
//!             authenticator   notifications
//! ```
//!
//! # Example Usage
//!
//! ```bash
//! $ fhirgate-sidecar --config /etc/fhirgate/gate.toml
//!
//! $ HCH_BASE_URL=https://hub.example.org \
//!   HCH_CLIENT_GRANT_ACCESS_TOKEN=secret \
//!   FHIRGATE__SERVER__UPSTREAM_URL=http://localhost:8090 \
//!   fhirgate-sidecar
//! ```

#![doc(html_root_url = "https://docs.rs/fhirgate-sidecar/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod headers;
pub mod health;
pub mod proxy;
pub mod server;

pub use error::{SidecarError, SidecarResult};
pub use health::{HealthChecker, HealthReport};
pub use proxy::ProxyClient;
pub use server::GateServer;

/// Sidecar version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
