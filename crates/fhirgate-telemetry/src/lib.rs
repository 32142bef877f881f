//! Observability for fhirgate.
//!
//! - **Logging**: structured JSON or pretty output via `tracing-subscriber`
//! - **Metrics**: Prometheus-format counters via the `metrics` facade

#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig, LogOutput};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
