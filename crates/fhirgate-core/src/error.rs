//! Error types for fhirgate.
//!
//! This module provides the [`GateError`] type, the single error type that
//! pipeline stages surface to callers. Every variant maps to exactly one HTTP
//! status and renders as a FHIR [`OperationOutcome`], so a caller always sees
//! one coherent rejection.
//!
//! | Variant | Status | Issue code |
//! |---|---|---|
//! | `UnknownResourceType` | 400 | `not-supported` |
//! | `InvalidRequest` | 400 | `invalid` |
//! | `Authentication` | 401 | `login` |
//! | `Forbidden` | 403 | `forbidden` |
//! | `UnprocessableEntity` | 422 | `processing` |
//! | `UnsupportedSchemaVersion` | 500 | `not-supported` |
//! | `Internal` | 500 | `exception` |
//! | `Upstream` | 502 | `transient` |

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::target::ALLOWED_RESOURCE_TYPE;

/// Result type alias using [`GateError`].
pub type GateResult<T> = Result<T, GateError>;

/// Categories of errors for classification, logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed or disallowed request (path, body).
    Validation,
    /// Invalid or missing credentials.
    Authentication,
    /// Credentials valid but access denied.
    Authorization,
    /// Payload rejected by the remote authority.
    Unprocessable,
    /// Integration or transport failure inside the gate.
    Internal,
    /// The upstream FHIR server could not be reached.
    External,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::Authorization => StatusCode::FORBIDDEN,
            Self::Unprocessable => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::External => StatusCode::BAD_GATEWAY,
        }
    }

    /// Returns the category name used as a log field and metric label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::Unprocessable => "unprocessable",
            Self::Internal => "internal",
            Self::External => "external",
        }
    }
}

/// Standard error type for the interception pipeline.
///
/// # Example
///
/// ```
/// use fhirgate_core::GateError;
/// use http::StatusCode;
///
/// let err = GateError::unprocessable("The Email is required.");
/// assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
/// assert_eq!(err.message(), "The Email is required.");
/// ```
#[derive(Error, Debug)]
pub enum GateError {
    /// The request path targets a resource type the gate does not expose.
    ///
    /// The message mirrors the host server's own not-found error so callers
    /// cannot tell a policy rejection from a genuinely unknown type.
    #[error("HAPI-0302: Unknown resource type '{segment}' - Server knows how to handle: [{}]", ALLOWED_RESOURCE_TYPE)]
    UnknownResourceType {
        /// The path segment found after the api root.
        segment: String,
    },

    /// The request itself is malformed.
    #[error("{message}")]
    InvalidRequest {
        /// Human-readable error message.
        message: String,
    },

    /// Authentication failed.
    #[error("{message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
    },

    /// Authorization denied.
    #[error("{message}")]
    Forbidden {
        /// Human-readable error message.
        message: String,
    },

    /// The remote authority rejected the payload.
    #[error("{message}")]
    UnprocessableEntity {
        /// Error message, possibly the remote body verbatim.
        message: String,
    },

    /// The resource representation is not one of the supported FHIR versions.
    #[error("Unsupported schema version: {version}")]
    UnsupportedSchemaVersion {
        /// The version string that could not be classified.
        version: String,
    },

    /// Internal server error.
    #[error("{message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The upstream FHIR server failed.
    #[error("{message}")]
    Upstream {
        /// Human-readable error message.
        message: String,
    },
}

impl GateError {
    /// Creates an unknown resource type error for the given path segment.
    #[must_use]
    pub fn unknown_resource_type(segment: impl Into<String>) -> Self {
        Self::UnknownResourceType {
            segment: segment.into(),
        }
    }

    /// Creates an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates a forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates an unprocessable entity error.
    #[must_use]
    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::UnprocessableEntity {
            message: message.into(),
        }
    }

    /// Creates an unsupported schema version error.
    #[must_use]
    pub fn unsupported_schema_version(version: impl Into<String>) -> Self {
        Self::UnsupportedSchemaVersion {
            version: version.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates an upstream error.
    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownResourceType { .. } | Self::InvalidRequest { .. } => {
                ErrorCategory::Validation
            }
            Self::Authentication { .. } => ErrorCategory::Authentication,
            Self::Forbidden { .. } => ErrorCategory::Authorization,
            Self::UnprocessableEntity { .. } => ErrorCategory::Unprocessable,
            Self::UnsupportedSchemaVersion { .. } | Self::Internal { .. } => {
                ErrorCategory::Internal
            }
            Self::Upstream { .. } => ErrorCategory::External,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category().default_status_code()
    }

    /// Returns the caller-visible message.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Returns the FHIR issue type code for this error.
    #[must_use]
    pub const fn issue_code(&self) -> &'static str {
        match self {
            Self::UnknownResourceType { .. } | Self::UnsupportedSchemaVersion { .. } => {
                "not-supported"
            }
            Self::InvalidRequest { .. } => "invalid",
            Self::Authentication { .. } => "login",
            Self::Forbidden { .. } => "forbidden",
            Self::UnprocessableEntity { .. } => "processing",
            Self::Internal { .. } => "exception",
            Self::Upstream { .. } => "transient",
        }
    }

    /// Converts this error to a FHIR `OperationOutcome`.
    #[must_use]
    pub fn to_operation_outcome(&self) -> OperationOutcome {
        OperationOutcome::single("error", self.issue_code(), self.message())
    }
}

/// Minimal FHIR `OperationOutcome` used for error responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOutcome {
    /// Always `"OperationOutcome"`.
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    /// The issues reported.
    pub issue: Vec<OperationOutcomeIssue>,
}

/// A single issue inside an [`OperationOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOutcomeIssue {
    /// fatal | error | warning | information
    pub severity: String,
    /// FHIR issue type code.
    pub code: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

impl OperationOutcome {
    /// Creates an outcome with one issue.
    pub fn single(
        severity: impl Into<String>,
        code: impl Into<String>,
        diagnostics: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: "OperationOutcome".to_string(),
            issue: vec![OperationOutcomeIssue {
                severity: severity.into(),
                code: code.into(),
                diagnostics: Some(diagnostics.into()),
            }],
        }
    }

    /// Returns the diagnostics of the first issue, if any.
    #[must_use]
    pub fn diagnostics(&self) -> Option<&str> {
        self.issue.first().and_then(|i| i.diagnostics.as_deref())
    }
}
