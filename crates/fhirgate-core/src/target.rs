//! Request target parsing and the fixed allow-lists.
//!
//! The gate exposes exactly one resource type under the api root plus a
//! handful of meta-routes (discovery UI, API docs, capability statement).

/// The only resource type the gate exposes.
pub const ALLOWED_RESOURCE_TYPE: &str = "Patient";

/// Default api root of the upstream FHIR server.
pub const DEFAULT_API_ROOT: &str = "/fhir";

/// Non-resource routes that are always allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaRoute {
    /// Swagger UI, matched as a prefix.
    SwaggerUi,
    /// OpenAPI document, matched exactly.
    ApiDocs,
    /// Capability statement, matched exactly.
    Metadata,
}

impl MetaRoute {
    /// All meta-routes.
    pub const ALL: [Self; 3] = [Self::SwaggerUi, Self::ApiDocs, Self::Metadata];

    /// The route suffix after the api root.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::SwaggerUi => "/swagger-ui",
            Self::ApiDocs => "/api-docs",
            Self::Metadata => "/metadata",
        }
    }

    /// Returns true if `path` hits this route under `api_root`.
    #[must_use]
    pub fn matches(self, api_root: &str, path: &str) -> bool {
        let Some(rest) = path.strip_prefix(api_root) else {
            return false;
        };
        match self {
            Self::SwaggerUi => rest.starts_with(self.suffix()),
            Self::ApiDocs | Self::Metadata => rest == self.suffix(),
        }
    }

    /// Resolves the meta-route hit by `path`, if any.
    #[must_use]
    pub fn resolve(api_root: &str, path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|route| route.matches(api_root, path))
    }
}

/// A request path split into its FHIR REST components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    path: String,
    /// Everything after `{api_root}/`, `None` when the root is absent.
    after_root: Option<String>,
    resource_type: Option<String>,
    resource_id: Option<String>,
}

impl RequestTarget {
    /// Parses `path` relative to `api_root`.
    ///
    /// Query strings must already be stripped.
    #[must_use]
    pub fn parse(api_root: &str, path: &str) -> Self {
        let marker = format!("{}/", api_root.trim_end_matches('/'));
        let after_root = path
            .find(&marker)
            .map(|index| path[index + marker.len()..].to_string());

        let mut segments = after_root
            .as_deref()
            .unwrap_or_default()
            .split('/')
            .filter(|s| !s.is_empty());

        let resource_type = segments
            .next()
            .filter(|s| s.starts_with(|c: char| c.is_ascii_uppercase()))
            .map(ToString::to_string);
        let resource_id = resource_type
            .as_ref()
            .and_then(|_| segments.next())
            .filter(|s| !s.starts_with('$') && !s.starts_with('_'))
            .map(ToString::to_string);

        Self {
            path: path.to_string(),
            after_root,
            resource_type,
            resource_id,
        }
    }

    /// The full request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The resource type named by the first segment after the api root.
    #[must_use]
    pub fn resource_type(&self) -> Option<&str> {
        self.resource_type.as_deref()
    }

    /// The logical id named by the second segment, if any.
    #[must_use]
    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    /// Returns true if the target is the allowed resource type.
    #[must_use]
    pub fn is_allowed_resource(&self) -> bool {
        self.resource_type() == Some(ALLOWED_RESOURCE_TYPE)
    }

    /// The segment reported in an unknown-resource rejection.
    ///
    /// This is everything after `{api_root}/`, or `-` when the path does
    /// not contain the api root at all.
    #[must_use]
    pub fn rejected_segment(&self) -> &str {
        self.after_root.as_deref().unwrap_or("-")
    }
}

/// Returns true if `path` targets the allowed resource type prefix.
///
/// This is a plain prefix check, matching `{api_root}/Patient` and anything
/// beneath it.
#[must_use]
pub fn targets_allowed_resource(api_root: &str, path: &str) -> bool {
    path.starts_with(&allowed_prefix(api_root))
}

/// The path prefix of the allowed resource type.
#[must_use]
pub fn allowed_prefix(api_root: &str) -> String {
    format!("{}/{ALLOWED_RESOURCE_TYPE}", api_root.trim_end_matches('/'))
}
