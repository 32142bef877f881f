//! Capability filter middleware.
//!
//! Prunes the discovery documents served by the upstream so they only
//! advertise the exposed resource type. Filtering is pure removal, so running
//! it on an already-filtered document changes nothing.

use std::collections::HashSet;

use bytes::Bytes;
use http_body_util::Full;
use serde_json::Value;

use fhirgate_core::{MetaRoute, ALLOWED_RESOURCE_TYPE};

use crate::context::RequestContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::pipeline::Stage;
use crate::types::{collect_body, with_body, Request, Response};

/// Removes every `rest[].resource[]` entry of another type.
///
/// Returns true if anything was removed.
pub fn filter_capability_statement(document: &mut Value) -> bool {
    if document.get("resourceType").and_then(Value::as_str) != Some("CapabilityStatement") {
        return false;
    }
    let Some(rest) = document.get_mut("rest").and_then(Value::as_array_mut) else {
        return false;
    };

    let mut changed = false;
    for component in rest {
        let Some(resources) = component.get_mut("resource").and_then(Value::as_array_mut) else {
            continue;
        };
        let before = resources.len();
        resources.retain(|entry| {
            entry.get("type").and_then(Value::as_str) == Some(ALLOWED_RESOURCE_TYPE)
        });
        changed |= resources.len() != before;
    }
    changed
}

/// Removes OpenAPI paths of other resource types and the tags left unused.
///
/// System-level paths such as `/metadata` or `/$meta` are kept. Returns true
/// if anything was removed.
pub fn filter_openapi(document: &mut Value) -> bool {
    let Some(paths) = document.get_mut("paths").and_then(Value::as_object_mut) else {
        return false;
    };

    let before = paths.len();
    paths.retain(|path, _| !names_other_resource(path));
    let mut changed = paths.len() != before;

    let used: HashSet<String> = paths
        .values()
        .filter_map(Value::as_object)
        .flat_map(|operations| operations.values())
        .filter_map(|operation| operation.get("tags").and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_str)
        .map(ToString::to_string)
        .collect();

    if let Some(tags) = document.get_mut("tags").and_then(Value::as_array_mut) {
        let before = tags.len();
        tags.retain(|tag| {
            tag.get("name")
                .and_then(Value::as_str)
                .is_some_and(|name| used.contains(name))
        });
        changed |= tags.len() != before;
    }

    changed
}

fn names_other_resource(path: &str) -> bool {
    let first = path.trim_start_matches('/').split('/').next().unwrap_or_default();
    first.starts_with(|c: char| c.is_ascii_uppercase()) && first != ALLOWED_RESOURCE_TYPE
}

/// Post-handler stage that filters `{root}/metadata` and `{root}/api-docs`.
#[derive(Debug, Clone)]
pub struct CapabilityFilterMiddleware {
    api_root: String,
}

impl CapabilityFilterMiddleware {
    /// Creates the filter.
    pub fn new(api_root: impl Into<String>) -> Self {
        Self {
            api_root: api_root.into(),
        }
    }

    fn filter_for(&self, path: &str) -> Option<fn(&mut Value) -> bool> {
        match MetaRoute::resolve(&self.api_root, path)? {
            MetaRoute::Metadata => Some(filter_capability_statement),
            MetaRoute::ApiDocs => Some(filter_openapi),
            MetaRoute::SwaggerUi => None,
        }
    }
}

impl Middleware for CapabilityFilterMiddleware {
    fn name(&self) -> &'static str {
        Stage::CapabilityFilter.name()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let response = next.run(ctx, request).await;

            let Some(filter) = self.filter_for(ctx.path()) else {
                return response;
            };
            if !response.status().is_success() {
                return response;
            }

            let (parts, body) = response.into_parts();
            let bytes = collect_body(body).await;
            let response = Response::from_parts(parts, Full::new(Bytes::new()));

            let mut document: Value = match serde_json::from_slice(&bytes) {
                Ok(document) => document,
                Err(error) => {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        stage = self.name(),
                        error = %error,
                        "Discovery document is not JSON, passing through"
                    );
                    return with_body(response, bytes);
                }
            };

            if !filter(&mut document) {
                return with_body(response, bytes);
            }

            match serde_json::to_vec(&document) {
                Ok(filtered) => {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        stage = self.name(),
                        path = %ctx.path(),
                        "Discovery document filtered"
                    );
                    with_body(response, Bytes::from(filtered))
                }
                Err(error) => {
                    tracing::warn!(stage = self.name(), error = %error, "Failed to re-encode document");
                    with_body(response, bytes)
                }
            }
        })
    }
}
