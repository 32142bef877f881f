//! Configuration schema types.
//!
//! This module defines the structure of every configuration section.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use fhirgate_core::DEFAULT_API_ROOT;

/// Listener and upstream settings for the sidecar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    /// Address to bind.
    pub listen_addr: String,
    /// Port to bind.
    pub listen_port: u16,
    /// Base URL of the upstream FHIR server.
    pub upstream_url: String,
    /// Timeout for upstream requests.
    #[serde(with = "duration_serde")]
    pub upstream_timeout: Duration,
    /// Maximum inbound request body size in bytes.
    pub max_request_body_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 8080,
            upstream_url: "http://localhost:8090".to_string(),
            upstream_timeout: Duration::from_secs(30),
            max_request_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Interception policy settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct GateSettings {
    /// Path prefix under which the upstream serves FHIR resources.
    pub api_root: String,
    /// Run the payload-aware authenticator branch for Patient writes.
    pub validate_patient: bool,
    /// FHIR version served by the upstream, used when a response does not
    /// declare one.
    pub fhir_version: String,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            api_root: DEFAULT_API_ROOT.to_string(),
            validate_patient: false,
            fhir_version: "4.0".to_string(),
        }
    }
}

/// Remote authenticator and notification backend settings.
///
/// Endpoint URLs are formed by plain concatenation of `base_url` and the
/// respective path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteSettings {
    /// Base URL shared by both remote endpoints.
    pub base_url: String,
    /// Path of the authenticate-user endpoint.
    pub authenticate_user_path: String,
    /// Path of the notifications endpoint.
    pub notifications_path: String,
    /// Service credential presented to the notifications endpoint.
    pub client_grant_access_token: String,
    /// Timeout applied to every remote call.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            authenticate_user_path: String::new(),
            notifications_path: String::new(),
            client_grant_access_token: String::new(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl RemoteSettings {
    /// Full URL of the authenticate-user endpoint.
    #[must_use]
    pub fn authenticate_user_url(&self) -> String {
        format!("{}{}", self.base_url, self.authenticate_user_path)
    }

    /// Full URL of the notifications endpoint.
    #[must_use]
    pub fn notifications_url(&self) -> String {
        format!("{}{}", self.base_url, self.notifications_path)
    }
}

/// How the notifier runs its remote call relative to the response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Await the call before the response is returned. The request is held
    /// for the full round trip.
    #[default]
    Inline,
    /// Spawn the call; the response is returned without waiting. Opt-in.
    Detached,
}

/// Notifier settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct NotifierSettings {
    /// Dispatch mode.
    pub dispatch: DispatchMode,
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Log level or `EnvFilter` directive.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Serde adapter for durations written as `500ms`, `10s`, `2m`, `1h` or a
/// bare number of seconds.
pub(crate) mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let (number, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
            Some(index) => s.split_at(index),
            None => (s, "s"),
        };
        let n: u64 = number
            .parse()
            .map_err(|_| format!("invalid duration: {s}"))?;

        match unit.trim() {
            "ms" => Ok(Duration::from_millis(n)),
            "s" => Ok(Duration::from_secs(n)),
            "m" => Ok(Duration::from_secs(n * 60)),
            "h" => Ok(Duration::from_secs(n * 3600)),
            other => Err(format!("invalid duration unit: {other}")),
        }
    }
}
