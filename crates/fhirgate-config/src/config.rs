//! Main configuration type.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use fhirgate_core::SchemaVersion;

use crate::{
    ConfigError, GateSettings, LoggingSettings, NotifierSettings, RemoteSettings, ServerSettings,
};

/// Complete fhirgate configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to layer files and environment
/// variables on top of the defaults.
///
/// # Example
///
/// ```
/// use fhirgate_config::GateConfig;
///
/// let config = GateConfig::default();
/// assert_eq!(config.gate.api_root, "/fhir");
/// assert!(!config.gate.validate_patient);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct GateConfig {
    /// Listener and upstream settings.
    pub server: ServerSettings,
    /// Interception policy.
    pub gate: GateSettings,
    /// Remote authenticator and notification backend.
    pub remote: RemoteSettings,
    /// Notifier behaviour.
    pub notifier: NotifierSettings,
    /// Logging.
    pub logging: LoggingSettings,
}

impl GateConfig {
    /// Socket address the sidecar binds to.
    pub fn listen_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.server.listen_addr, self.server.listen_port)
            .parse()
            .map_err(|_| {
                ConfigError::invalid_value(
                    "server.listen_addr",
                    format!("invalid address: {}", self.server.listen_addr),
                )
            })
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - The listen address does not parse
    /// - Any URL is empty or not http(s)
    /// - The api root does not start with `/`
    /// - The default FHIR version is not supported
    /// - The service credential is missing
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_socket_addr()?;

        require_http_url("server.upstream_url", &self.server.upstream_url)?;
        require_http_url("remote.base_url", &self.remote.base_url)?;

        if !self.gate.api_root.starts_with('/') {
            return Err(ConfigError::invalid_value(
                "gate.api_root",
                "must start with '/'",
            ));
        }

        if SchemaVersion::classify(&self.gate.fhir_version).is_err() {
            return Err(ConfigError::invalid_value(
                "gate.fhir_version",
                format!("unsupported FHIR version: {}", self.gate.fhir_version),
            ));
        }

        if self.remote.client_grant_access_token.trim().is_empty() {
            return Err(ConfigError::missing_field(
                "remote.client_grant_access_token",
            ));
        }

        if self.remote.request_timeout.is_zero() {
            return Err(ConfigError::invalid_value(
                "remote.request_timeout",
                "must be greater than zero",
            ));
        }

        Ok(())
    }
}

fn require_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::missing_field(field));
    }
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(ConfigError::invalid_value(
            field,
            format!("expected an http(s) URL, got {value}"),
        ));
    }
    Ok(())
}
