//! FHIR schema-version classification and resource encoding.
//!
//! A resource representation is classified into a small closed set of
//! supported FHIR versions. Each version selects an [`EncodingContext`];
//! anything else is an explicit [`GateError::UnsupportedSchemaVersion`].
//!
//! | Version | `fhirVersion` | Context |
//! |---|---|---|
//! | R5 | `5.0` | R4 |
//! | R4 / R4B | `4.0`, `4.3` | R4 |
//! | DSTU3 | `3.0` | DSTU3 |
//! | DSTU2 | `1.0` | DSTU2 |

use std::fmt;

use serde_json::Value;

use crate::error::{GateError, GateResult};
use crate::AUTHENTICATED_USER_LOGIN_ID;

/// Supported FHIR schema versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVersion {
    /// FHIR R5 (5.0.x).
    R5,
    /// FHIR R4 and R4B (4.0.x, 4.3.x).
    R4,
    /// FHIR STU3 (3.0.x).
    Dstu3,
    /// FHIR DSTU2 (1.0.x).
    Dstu2,
}

impl SchemaVersion {
    /// Classifies a `fhirVersion` string such as `4.0`, `4.0.1` or `R4`.
    pub fn classify(version: &str) -> GateResult<Self> {
        let version = version.trim();
        let mut parts = version.split('.');
        let major_minor = (parts.next(), parts.next());

        match major_minor {
            (Some("5"), Some("0")) => Ok(Self::R5),
            (Some("4"), Some("0" | "3")) => Ok(Self::R4),
            (Some("3"), Some("0")) => Ok(Self::Dstu3),
            (Some("1"), Some("0")) => Ok(Self::Dstu2),
            _ => match version.to_ascii_uppercase().as_str() {
                "R5" => Ok(Self::R5),
                "R4" | "R4B" => Ok(Self::R4),
                "STU3" | "DSTU3" | "R3" => Ok(Self::Dstu3),
                "DSTU2" | "R2" => Ok(Self::Dstu2),
                _ => Err(GateError::unsupported_schema_version(version)),
            },
        }
    }

    /// Extracts the `fhirVersion` parameter from a FHIR mime type, e.g.
    /// `application/fhir+json; fhirVersion=4.0`.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Option<&str> {
        content_type.split(';').skip(1).find_map(|param| {
            let (name, value) = param.split_once('=')?;
            name.trim()
                .eq_ignore_ascii_case("fhirVersion")
                .then(|| value.trim().trim_matches('"'))
        })
    }

    /// The encoding context for this version.
    #[must_use]
    pub const fn context(self) -> EncodingContext {
        match self {
            Self::R5 | Self::R4 => EncodingContext::R4,
            Self::Dstu3 => EncodingContext::Dstu3,
            Self::Dstu2 => EncodingContext::Dstu2,
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::R5 => write!(f, "5.0"),
            Self::R4 => write!(f, "4.0"),
            Self::Dstu3 => write!(f, "3.0"),
            Self::Dstu2 => write!(f, "1.0"),
        }
    }
}

/// The encoding context selected for a schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodingContext {
    /// R4 encoding, shared by R4 and R5.
    R4,
    /// STU3 encoding.
    Dstu3,
    /// DSTU2 encoding.
    Dstu2,
}

impl EncodingContext {
    /// Context name for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::R4 => "r4",
            Self::Dstu3 => "dstu3",
            Self::Dstu2 => "dstu2",
        }
    }
}

/// A resource encoded for forwarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedResource {
    /// The resource's logical id, if it has one.
    pub id: Option<String>,
    /// The resource's `resourceType`.
    pub resource_type: String,
    /// Compact JSON with the identity token merged in.
    pub payload: String,
}

/// Encodes resource representations within one [`EncodingContext`].
#[derive(Debug, Clone, Copy)]
pub struct ResourceCodec {
    context: EncodingContext,
}

impl ResourceCodec {
    /// Creates a codec for the given schema version.
    #[must_use]
    pub const fn for_version(version: SchemaVersion) -> Self {
        Self {
            context: version.context(),
        }
    }

    /// The selected encoding context.
    #[must_use]
    pub const fn context(&self) -> EncodingContext {
        self.context
    }

    /// Encodes a JSON resource body and merges the identity token.
    ///
    /// When `login_id` is `None` the key is left out entirely.
    pub fn encode(&self, body: &[u8], login_id: Option<&str>) -> GateResult<EncodedResource> {
        let mut resource: Value = serde_json::from_slice(body).map_err(|e| {
            GateError::internal_with_source("Response body is not valid JSON.", e)
        })?;

        let Some(object) = resource.as_object_mut() else {
            return Err(GateError::internal("Response body is not a FHIR resource."));
        };

        let resource_type = object
            .get("resourceType")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| GateError::internal("Response body has no resourceType."))?;
        let id = object
            .get("id")
            .and_then(Value::as_str)
            .map(ToString::to_string);

        if let Some(login_id) = login_id {
            object.insert(
                AUTHENTICATED_USER_LOGIN_ID.to_string(),
                Value::String(login_id.to_string()),
            );
        }

        let payload = serde_json::to_string(&resource).map_err(|e| {
            GateError::internal_with_source("Failed to encode resource.", e)
        })?;

        Ok(EncodedResource {
            id,
            resource_type,
            payload,
        })
    }
}
