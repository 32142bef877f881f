//! Errors raised while assembling a [`GateConfig`](crate::GateConfig).
//!
//! Every variant names where the bad input came from: a file path, a dotted
//! field such as `remote.base_url`, or an environment variable.

use std::path::PathBuf;
use thiserror::Error;

/// Why the gate configuration could not be produced.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("gate config {path} does not exist")]
    FileNotFound {
        /// Requested path.
        path: PathBuf,
    },

    /// The file (or `.env`) exists but could not be read.
    #[error("cannot read {path}")]
    ReadError {
        /// Path that failed.
        path: PathBuf,
        /// I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Config source format other than `toml` or `json`.
    #[error("{source_name}: expected a .toml or .json source")]
    UnsupportedFormat {
        /// File path or format label that was given.
        source_name: String,
    },

    /// TOML syntax or schema error.
    #[error("malformed TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    /// JSON syntax or schema error.
    #[error("malformed JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The `.env` file has a line dotenvy cannot parse.
    #[error("malformed .env file: {0}")]
    DotEnv(String),

    /// A field is present but unusable.
    #[error("{field}: {reason}")]
    InvalidValue {
        /// Dotted path, e.g. `gate.api_root`.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A field the gate cannot run without is empty.
    #[error("{field} must be set")]
    MissingField {
        /// Dotted path, e.g. `remote.client_grant_access_token`.
        field: String,
    },

    /// An override variable could not be applied.
    #[error("environment override {var} rejected: {reason}")]
    EnvParseError {
        /// Variable name.
        var: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Cross-field check failed after every layer was applied.
    #[error("gate config rejected: {0}")]
    ValidationError(String),
}

impl ConfigError {
    /// [`Self::FileNotFound`] for `path`.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// [`Self::ReadError`] for `path`.
    pub fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    /// [`Self::UnsupportedFormat`].
    pub fn unsupported_format(source_name: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            source_name: source_name.into(),
        }
    }

    /// [`Self::InvalidValue`].
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// [`Self::MissingField`].
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// [`Self::EnvParseError`].
    pub fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }

    /// [`Self::ValidationError`].
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// The dotted field or variable this error is about, when there is one.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::InvalidValue { field, .. } | Self::MissingField { field } => Some(field),
            Self::EnvParseError { var, .. } => Some(var),
            _ => None,
        }
    }
}
