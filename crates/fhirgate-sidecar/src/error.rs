//! Error types for the fhirgate sidecar.

use thiserror::Error;

use fhirgate_config::ConfigError;
use fhirgate_core::GateError;
use fhirgate_middleware::RemoteError;
use fhirgate_telemetry::TelemetryError;

/// Result type alias using [`SidecarError`].
pub type SidecarResult<T> = Result<T, SidecarError>;

/// Sidecar-specific errors.
#[derive(Debug, Error)]
pub enum SidecarError {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Logging or metrics could not be initialised.
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    /// A remote client could not be built.
    #[error("Remote client error: {0}")]
    Remote(#[from] RemoteError),

    /// The upstream FHIR server could not be reached.
    #[error("Upstream error: {message}")]
    Upstream {
        /// Error message.
        message: String,
    },

    /// Server startup error.
    #[error("Server error: {message}")]
    Server {
        /// Error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SidecarError {
    /// Create an upstream error.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Create a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Process exit code for errors that end the binary.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Telemetry(_) | Self::Remote(_) => 3,
            Self::Upstream { .. } | Self::Server { .. } | Self::Io(_) => 1,
        }
    }

    /// Converts a per-request failure into the error rendered to callers.
    pub fn into_gate_error(self) -> GateError {
        match self {
            Self::Upstream { message } => GateError::upstream(message),
            other => GateError::internal_with_source("Internal Server error.", other),
        }
    }
}
