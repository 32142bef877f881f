//! Configuration loader with layered sources.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use crate::schema::{duration_serde, DispatchMode, LogFormat};
use crate::{ConfigError, GateConfig};

/// Unprefixed deployment variables and the keys they set.
const ENV_ALIASES: [(&str, &str); 5] = [
    ("HCH_BASE_URL", "REMOTE__BASE_URL"),
    ("HCH_AUTHENTICATE_USER_URL", "REMOTE__AUTHENTICATE_USER_PATH"),
    ("HCH_NOTIFICATIONS_URL", "REMOTE__NOTIFICATIONS_PATH"),
    ("HCH_CLIENT_GRANT_ACCESS_TOKEN", "REMOTE__CLIENT_GRANT_ACCESS_TOKEN"),
    ("VALIDATE_PATIENT", "GATE__VALIDATE_PATIENT"),
];

/// Configuration loader with layered sources.
///
/// Sources are applied in order: defaults, then file, then environment.
///
/// # Example
///
/// ```
/// use fhirgate_config::ConfigLoader;
///
/// let toml = r#"
///     [remote]
///     base_url = "http://hub.local"
///     client_grant_access_token = "svc"
/// "#;
///
/// let config = ConfigLoader::new()
///     .with_string(toml, "toml")
///     .unwrap()
///     .load()
///     .unwrap();
///
/// assert_eq!(config.remote.base_url, "http://hub.local");
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: GateConfig,
    env_prefix: Option<String>,
    file_loaded: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader starting from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: GateConfig::default(),
            env_prefix: None,
            file_loaded: false,
        }
    }

    /// Reset to the default configuration values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = GateConfig::default();
        self
    }

    /// Load configuration from a TOML (`.toml`) or JSON (`.json`) file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, malformed or
    /// contains unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        self.file_loaded = true;

        Ok(self)
    }

    /// Load configuration from a file if it exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in `toml` or `json` format.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::unsupported_format(format))
            }
        };
        Ok(self)
    }

    /// Enable environment overrides.
    ///
    /// Variables use the format `PREFIX__SECTION__KEY`, for example
    /// `FHIRGATE__SERVER__LISTEN_PORT=9000`. The unprefixed deployment
    /// variables (`HCH_*`, `VALIDATE_PATIENT`) are applied first so that
    /// prefixed ones take precedence.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file into the process environment if one exists.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(dotenvy::Error::Io(e)) => Err(ConfigError::read_error(".env", e)),
            Err(e) => Err(ConfigError::DotEnv(e.to_string())),
        }
    }

    /// Returns true if a configuration file was loaded.
    #[must_use]
    pub fn file_loaded(&self) -> bool {
        self.file_loaded
    }

    /// Apply environment overrides and validate.
    pub fn load(mut self) -> Result<GateConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Finalize without validation.
    #[must_use]
    pub fn load_unvalidated(self) -> GateConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<GateConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::unsupported_format(path.display().to_string())),
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let vars: HashMap<String, String> = env::vars().collect();

        for (alias, _) in ENV_ALIASES {
            if let Some(value) = vars.get(alias) {
                self.apply_alias(alias, value)?;
            }
        }

        let marker = format!("{prefix}__");
        for (key, value) in vars.iter().filter(|(k, _)| k.starts_with(&marker)) {
            self.apply_env_var(key, value, prefix)?;
        }

        Ok(())
    }

    fn apply_alias(&mut self, alias: &str, value: &str) -> Result<(), ConfigError> {
        let Some((_, path)) = ENV_ALIASES.iter().find(|(name, _)| *name == alias) else {
            return Ok(());
        };
        let parts: Vec<&str> = path.split("__").collect();
        self.apply_key(&parts, alias, value)
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();
        self.apply_key(&parts, key, value)
    }

    fn apply_key(&mut self, parts: &[&str], key: &str, value: &str) -> Result<(), ConfigError> {
        let config = &mut self.config;

        match parts {
            ["SERVER", "LISTEN_ADDR"] => config.server.listen_addr = value.to_string(),
            ["SERVER", "LISTEN_PORT"] => {
                config.server.listen_port = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected port number"))?;
            }
            ["SERVER", "UPSTREAM_URL"] => config.server.upstream_url = value.to_string(),
            ["SERVER", "UPSTREAM_TIMEOUT"] => {
                config.server.upstream_timeout = duration_serde::parse_duration(value)
                    .map_err(|reason| ConfigError::env_parse_error(key, reason))?;
            }
            ["SERVER", "MAX_REQUEST_BODY_SIZE"] => {
                config.server.max_request_body_size = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))?;
            }

            ["GATE", "API_ROOT"] => config.gate.api_root = value.to_string(),
            ["GATE", "VALIDATE_PATIENT"] => {
                config.gate.validate_patient = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["GATE", "FHIR_VERSION"] => config.gate.fhir_version = value.to_string(),

            ["REMOTE", "BASE_URL"] => config.remote.base_url = value.to_string(),
            ["REMOTE", "AUTHENTICATE_USER_PATH"] => {
                config.remote.authenticate_user_path = value.to_string();
            }
            ["REMOTE", "NOTIFICATIONS_PATH"] => {
                config.remote.notifications_path = value.to_string();
            }
            ["REMOTE", "CLIENT_GRANT_ACCESS_TOKEN"] => {
                config.remote.client_grant_access_token = value.to_string();
            }
            ["REMOTE", "REQUEST_TIMEOUT"] => {
                config.remote.request_timeout = duration_serde::parse_duration(value)
                    .map_err(|reason| ConfigError::env_parse_error(key, reason))?;
            }

            ["NOTIFIER", "DISPATCH"] => {
                config.notifier.dispatch = match value.to_lowercase().as_str() {
                    "detached" => DispatchMode::Detached,
                    "inline" => DispatchMode::Inline,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'detached' or 'inline'",
                        ))
                    }
                };
            }

            ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }

            // Unknown key
            _ => {}
        }

        Ok(())
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use super::*;

    const MINIMAL: &str = r#"
        [remote]
        base_url = "http://hub.local"
        client_grant_access_token = "svc"
    "#;

    #[test]
    fn test_loader_defaults_fail_validation() {
        let result = ConfigLoader::new().with_defaults().load();
        assert!(matches!(result, Err(ConfigError::MissingField { .. })));
    }

    #[test]
    fn test_loader_with_string_toml() {
        let config = ConfigLoader::new()
            .with_string(MINIMAL, "toml")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.remote.base_url, "http://hub.local");
        // Untouched sections keep their defaults
        assert_eq!(config.server.listen_port, 8080);
        assert_eq!(config.gate.api_root, "/fhir");
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{
            "gate": {"validate_patient": true},
            "remote": {"base_url": "https://hub.local", "client_grant_access_token": "svc",
                       "request_timeout": "2s"}
        }"#;

        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();

        assert!(config.gate.validate_patient);
        assert_eq!(config.remote.request_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_loader_rejects_unknown_fields() {
        let toml = r#"
            [gate]
            allowed_types = ["Observation"]
        "#;
        assert!(ConfigLoader::new().with_string(toml, "toml").is_err());
    }

    #[test]
    fn test_loader_unsupported_format() {
        assert!(ConfigLoader::new().with_string("", "yaml").is_err());
    }

    #[test]
    fn test_loader_with_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        writeln!(file, "[notifier]\ndispatch = \"inline\"").unwrap();

        let loader = ConfigLoader::new().with_file(file.path()).unwrap();
        assert!(loader.file_loaded());

        let config = loader.load().unwrap();
        assert_eq!(config.notifier.dispatch, DispatchMode::Inline);
    }

    #[test]
    fn test_loader_with_file_wrong_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(ConfigLoader::new().with_file(file.path()).is_err());
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/fhirgate.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let loader = ConfigLoader::new()
            .with_optional_file("/nonexistent/fhirgate.toml")
            .unwrap();
        assert!(!loader.file_loaded());
        assert_eq!(loader.load_unvalidated(), GateConfig::default());
    }

    #[test]
    fn test_apply_env_var_sections() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__SERVER__LISTEN_PORT", "9000", "TEST")
            .unwrap();
        loader
            .apply_env_var("TEST__SERVER__UPSTREAM_TIMEOUT", "1500ms", "TEST")
            .unwrap();
        loader
            .apply_env_var("TEST__GATE__VALIDATE_PATIENT", "yes", "TEST")
            .unwrap();
        loader
            .apply_env_var("TEST__NOTIFIER__DISPATCH", "inline", "TEST")
            .unwrap();
        loader
            .apply_env_var("TEST__LOGGING__FORMAT", "pretty", "TEST")
            .unwrap();

        assert_eq!(loader.config.server.listen_port, 9000);
        assert_eq!(
            loader.config.server.upstream_timeout,
            Duration::from_millis(1500)
        );
        assert!(loader.config.gate.validate_patient);
        assert_eq!(loader.config.notifier.dispatch, DispatchMode::Inline);
        assert_eq!(loader.config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_apply_env_var_invalid_values() {
        let mut loader = ConfigLoader::new();
        assert!(loader
            .apply_env_var("TEST__SERVER__LISTEN_PORT", "eighty", "TEST")
            .is_err());
        assert!(loader
            .apply_env_var("TEST__GATE__VALIDATE_PATIENT", "maybe", "TEST")
            .is_err());
        assert!(loader
            .apply_env_var("TEST__NOTIFIER__DISPATCH", "later", "TEST")
            .is_err());
    }

    #[test]
    fn test_apply_env_var_unknown_key_ignored() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__GATE__SOMETHING_ELSE", "x", "TEST")
            .unwrap();
        assert_eq!(loader.config, GateConfig::default());
    }

    #[test]
    fn test_apply_aliases() {
        let mut loader = ConfigLoader::new();
        loader.apply_alias("HCH_BASE_URL", "https://hub.local").unwrap();
        loader
            .apply_alias("HCH_AUTHENTICATE_USER_URL", "/api/authenticate-user")
            .unwrap();
        loader
            .apply_alias("HCH_NOTIFICATIONS_URL", "/api/notifications")
            .unwrap();
        loader
            .apply_alias("HCH_CLIENT_GRANT_ACCESS_TOKEN", "svc")
            .unwrap();
        loader.apply_alias("VALIDATE_PATIENT", "true").unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(
            config.remote.authenticate_user_url(),
            "https://hub.local/api/authenticate-user"
        );
        assert_eq!(
            config.remote.notifications_url(),
            "https://hub.local/api/notifications"
        );
        assert_eq!(config.remote.client_grant_access_token, "svc");
        assert!(config.gate.validate_patient);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }
}
