//! Typed configuration for fhirgate.
//!
//! Configuration is layered: built-in defaults, then an optional TOML or JSON
//! file, then environment variables.
//!
//! # Example
//!
//! ```no_run
//! use fhirgate_config::ConfigLoader;
//!
//! # fn main() -> Result<(), fhirgate_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_optional_file("fhirgate.toml")?
//!     .with_dotenv()?
//!     .with_env_prefix("FHIRGATE")
//!     .load()?;
//!
//! println!("listening on {}", config.listen_socket_addr()?);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! listen_addr = "0.0.0.0"
//! listen_port = 8080
//! upstream_url = "http://localhost:8090"
//! upstream_timeout = "30s"
//!
//! [gate]
//! api_root = "/fhir"
//! validate_patient = true
//! fhir_version = "4.0"
//!
//! [remote]
//! base_url = "https://hub.example.org"
//! authenticate_user_path = "/api/authenticate-user"
//! notifications_path = "/api/notifications"
//! client_grant_access_token = "..."
//! request_timeout = "10s"
//!
//! [notifier]
//! dispatch = "inline"
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! With a prefix set, `PREFIX__SECTION__KEY` overrides any key, e.g.
//! `FHIRGATE__GATE__VALIDATE_PATIENT=true`. The deployment variables
//! `HCH_BASE_URL`, `HCH_AUTHENTICATE_USER_URL`, `HCH_NOTIFICATIONS_URL`,
//! `HCH_CLIENT_GRANT_ACCESS_TOKEN` and `VALIDATE_PATIENT` are honoured too;
//! prefixed variables win over them.

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::GateConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
