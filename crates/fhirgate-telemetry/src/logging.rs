//! Structured logging for the gate.
//!
//! Every stage logs through `tracing` with a `stage` field, and the sidecar
//! opens one span per request carrying `request_id`, `method` and `path`.
//! This module installs the subscriber that turns those events into JSON
//! lines (the default) or pretty output for local runs.
//!
//! `RUST_LOG`, when set and valid, replaces the configured directive.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    /// One JSON object per line, with the current span's fields.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `fhirgate_middleware=debug,hyper=warn`.
    pub directive: String,
    /// Rendering.
    pub output: LogOutput,
    /// Include source file and line in each event.
    pub with_source_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new("info", LogOutput::Json)
    }
}

impl LogConfig {
    /// Settings for a directive and output, without source locations.
    pub fn new(directive: impl Into<String>, output: LogOutput) -> Self {
        Self {
            directive: directive.into(),
            output,
            with_source_location: false,
        }
    }

    /// Resolves the filter: `RUST_LOG` first, then [`Self::directive`].
    ///
    /// An invalid `RUST_LOG` is ignored; an invalid configured directive is
    /// an error.
    pub fn filter(&self) -> TelemetryResult<EnvFilter> {
        if let Ok(from_env) = EnvFilter::try_from_default_env() {
            return Ok(from_env);
        }
        EnvFilter::try_new(&self.directive).map_err(|e| {
            TelemetryError::LoggingInit(format!("bad log directive {:?}: {e}", self.directive))
        })
    }
}

/// Installs the global subscriber. Call once, before the first request.
///
/// # Errors
///
/// `TelemetryError::LoggingInit` when the directive does not parse or a
/// subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.filter()?;
    let source = config.with_source_location;

    let output = match config.output {
        LogOutput::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_file(source)
            .with_line_number(source)
            .boxed(),
        LogOutput::Pretty => fmt::layer()
            .pretty()
            .with_file(source)
            .with_line_number(source)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}
