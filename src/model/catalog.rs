//! Endpoint catalog: walks the spec's `paths` section into a flat list of
//! immutable endpoint descriptors.

use serde::Serialize;
use serde_json::Value;

use std::collections::BTreeSet;
use std::fmt;

use crate::{DroverError, DroverResult, ResolverContext, SchemaNode, SpecDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    /// Swagger method keys are lowercase; anything else under a path entry
    /// (`parameters`, vendor extensions) is not a method.
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "get" => Some(Self::Get),
            "post" => Some(Self::Post),
            "put" => Some(Self::Put),
            "delete" => Some(Self::Delete),
            "patch" => Some(Self::Patch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One documented (path, method) pair. Built once at catalog time, read-only
/// thereafter.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointDescriptor {
    pub path: String,
    pub method: HttpMethod,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_schema: Option<SchemaNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<SchemaNode>,
}

impl EndpointDescriptor {
    pub fn pretty(&self) -> String {
        let mut out = format!("{} {}", self.method, self.path);
        if !self.tags.is_empty() {
            let tags: Vec<&str> = self.tags.iter().map(String::as_str).collect();
            out.push_str(&format!(" [{}]", tags.join(", ")));
        }
        if self.request_schema.is_some() {
            out.push_str(" body");
        }
        if self.response_schema.is_some() {
            out.push_str(" response");
        }
        out
    }
}

/// Diagnostic sink with run-wide deduplication: each key is surfaced at most
/// once no matter how often the walk re-encounters it.
#[derive(Debug, Default)]
pub struct DiagnosticLog {
    seen: BTreeSet<String>,
    entries: Vec<String>,
}

impl DiagnosticLog {
    pub fn record(&mut self, key: String, message: String) {
        if self.seen.insert(key) {
            tracing::debug!("{message}");
            self.entries.push(message);
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

#[derive(Debug)]
pub struct Catalog {
    pub endpoints: Vec<EndpointDescriptor>,
    pub diagnostics: DiagnosticLog,
}

impl Catalog {
    pub fn build(spec: &SpecDocument) -> DroverResult<Self> {
        let resolver = ResolverContext::new(spec.definitions());
        let mut diagnostics = DiagnosticLog::default();
        let mut endpoints = Vec::new();

        for (path, methods) in spec.paths() {
            let Some(methods) = methods.as_object() else {
                return Err(DroverError::SchemaShape(format!(
                    "path entry {path:?} is not an object"
                )));
            };
            for (method_key, operation) in methods {
                let Some(method) = HttpMethod::from_key(method_key) else {
                    continue;
                };
                endpoints.push(build_descriptor(
                    path,
                    method,
                    operation,
                    &resolver,
                    &mut diagnostics,
                )?);
            }
        }

        Ok(Self {
            endpoints,
            diagnostics,
        })
    }
}

fn build_descriptor(
    path: &str,
    method: HttpMethod,
    operation: &Value,
    resolver: &ResolverContext<'_>,
    diagnostics: &mut DiagnosticLog,
) -> DroverResult<EndpointDescriptor> {
    let mut tags = BTreeSet::new();
    if let Some(entries) = operation.get("tags").and_then(Value::as_array) {
        for entry in entries {
            if let Some(tag) = entry.as_str() {
                tags.insert(tag.to_string());
            }
        }
    }

    let request_schema = request_schema(path, method, operation, resolver, diagnostics)?;
    let response_schema = response_schema(path, method, operation, resolver, diagnostics)?;

    Ok(EndpointDescriptor {
        path: path.to_string(),
        method,
        tags,
        request_schema,
        response_schema,
    })
}

/// The request schema comes from the first parameter with `in: body`.
fn request_schema(
    path: &str,
    method: HttpMethod,
    operation: &Value,
    resolver: &ResolverContext<'_>,
    diagnostics: &mut DiagnosticLog,
) -> DroverResult<Option<SchemaNode>> {
    let Some(parameters) = operation.get("parameters").and_then(Value::as_array) else {
        return Ok(None);
    };

    let mut schema = None;
    for parameter in parameters {
        if parameter.get("in").and_then(Value::as_str) != Some("body") {
            continue;
        }
        let name = parameter
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("<unnamed>");
        let reference = parameter
            .pointer("/schema/$ref")
            .and_then(Value::as_str)
            .unwrap_or("<inline>");
        diagnostics.record(
            format!("param|{path}|{method}|{name}|{reference}"),
            format!("body parameter {name} at {method} {path} (schema {reference})"),
        );

        if schema.is_none() {
            let Some(raw) = parameter.get("schema") else {
                continue;
            };
            let at = format!("{method} {path} body");
            let node = SchemaNode::from_value(raw, &at)?;
            schema = Some(resolver.resolve(&node)?);
        }
    }
    Ok(schema)
}

/// The response schema comes from the lowest numeric status code that
/// carries one; non-numeric statuses (`default`) sort after every numeric
/// status, so selection never depends on map iteration order.
fn response_schema(
    path: &str,
    method: HttpMethod,
    operation: &Value,
    resolver: &ResolverContext<'_>,
    diagnostics: &mut DiagnosticLog,
) -> DroverResult<Option<SchemaNode>> {
    let Some(responses) = operation.get("responses").and_then(Value::as_object) else {
        return Ok(None);
    };

    let mut candidates: Vec<(u32, &str, &Value)> = Vec::new();
    for (status, response) in responses {
        let Some(raw) = response.get("schema") else {
            continue;
        };
        diagnostics.record(
            format!("response|{path}|{method}|{status}"),
            format!("response {status} at {method} {path} carries a schema"),
        );
        let rank = status.parse::<u32>().unwrap_or(u32::MAX);
        candidates.push((rank, status, raw));
    }

    let Some((_, status, raw)) = candidates.into_iter().min_by_key(|(rank, _, _)| *rank)
    else {
        return Ok(None);
    };
    let at = format!("{method} {path} response {status}");
    let node = SchemaNode::from_value(raw, &at)?;
    Ok(Some(resolver.resolve(&node)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget_spec() -> SpecDocument {
        let doc = serde_json::json!({
            "paths": {
                "/widget": {
                    "post": {
                        "tags": ["widget"],
                        "parameters": [
                            {"name": "body", "in": "body", "schema": {"$ref": "#/definitions/WidgetInput"}}
                        ],
                        "responses": {
                            "404": {"description": "impossible"},
                            "200": {"schema": {"$ref": "#/definitions/Widget"}}
                        }
                    }
                },
                "/widget/{id}": {
                    "get": {
                        "responses": {
                            "default": {"schema": {"$ref": "#/definitions/Widget"}},
                            "200": {"schema": {"$ref": "#/definitions/Widget"}}
                        }
                    },
                    "put": {
                        "parameters": [
                            {"name": "body", "in": "body", "schema": {"$ref": "#/definitions/WidgetInput"}}
                        ],
                        "responses": {"200": {"schema": {"$ref": "#/definitions/Widget"}}}
                    },
                    "delete": {"responses": {"200": {"description": "gone"}}}
                }
            },
            "definitions": {
                "WidgetInput": {"type": "object", "properties": {"name": {"type": "string"}}},
                "Widget": {"type": "object", "properties": {
                    "id": {"type": "string"},
                    "name": {"type": "string"}
                }}
            }
        });
        SpecDocument::parse(doc.to_string().as_bytes()).expect("parse")
    }

    #[test]
    fn builds_one_descriptor_per_path_method_pair() {
        let catalog = Catalog::build(&widget_spec()).expect("catalog");
        assert_eq!(catalog.endpoints.len(), 4);

        let create = catalog
            .endpoints
            .iter()
            .find(|e| e.method == HttpMethod::Post)
            .expect("post endpoint");
        assert_eq!(create.path, "/widget");
        assert!(create.tags.contains("widget"));
        assert!(create.request_schema.is_some());
        assert!(create.response_schema.is_some());

        let delete = catalog
            .endpoints
            .iter()
            .find(|e| e.method == HttpMethod::Delete)
            .expect("delete endpoint");
        assert!(delete.request_schema.is_none());
        assert!(delete.response_schema.is_none());
    }

    #[test]
    fn request_schema_is_fully_resolved() {
        let catalog = Catalog::build(&widget_spec()).expect("catalog");
        let create = catalog
            .endpoints
            .iter()
            .find(|e| e.method == HttpMethod::Post)
            .expect("post endpoint");
        match create.request_schema.as_ref().expect("schema") {
            SchemaNode::Object { properties } => {
                assert!(properties.contains_key("name"));
            }
            other => panic!("expected object schema, got {other:?}"),
        }
    }

    #[test]
    fn response_selection_prefers_lowest_numeric_status() {
        // `default` would win under insertion order; the documented rule is
        // lowest numeric status, so "200" must be chosen over "default".
        let catalog = Catalog::build(&widget_spec()).expect("catalog");
        let read = catalog
            .endpoints
            .iter()
            .find(|e| e.method == HttpMethod::Get)
            .expect("get endpoint");
        assert!(read.response_schema.is_some());
        // Both candidates resolve to Widget here; the rank rule itself is
        // what the next assertion pins down.
        let mut diagnostics = DiagnosticLog::default();
        let resolver_defs = std::collections::BTreeMap::new();
        let resolver = ResolverContext::new(&resolver_defs);
        let operation = serde_json::json!({
            "responses": {
                "500": {"schema": {"type": "object", "properties": {"error": {"type": "string"}}}},
                "201": {"schema": {"type": "object", "properties": {"id": {"type": "string"}}}}
            }
        });
        let schema = response_schema(
            "/thing",
            HttpMethod::Post,
            &operation,
            &resolver,
            &mut diagnostics,
        )
        .expect("schema")
        .expect("present");
        match schema {
            SchemaNode::Object { properties } => {
                assert!(properties.contains_key("id"), "201 must beat 500");
            }
            other => panic!("expected object schema, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_diagnostic_tuples_are_emitted_once() {
        let mut log = DiagnosticLog::default();
        log.record("k".to_string(), "first".to_string());
        log.record("k".to_string(), "second".to_string());
        log.record("other".to_string(), "third".to_string());
        assert_eq!(log.entries(), &["first".to_string(), "third".to_string()]);
    }

    #[test]
    fn catalog_walk_dedupes_repeated_parameter_tuples() {
        let doc = serde_json::json!({
            "paths": {
                "/user": {
                    "post": {
                        "parameters": [
                            {"name": "body", "in": "body", "schema": {"$ref": "#/definitions/User"}},
                            {"name": "body", "in": "body", "schema": {"$ref": "#/definitions/User"}}
                        ],
                        "responses": {}
                    }
                }
            },
            "definitions": {
                "User": {"type": "object", "properties": {"id": {"type": "string"}}}
            }
        });
        let spec = SpecDocument::parse(doc.to_string().as_bytes()).expect("parse");
        let catalog = Catalog::build(&spec).expect("catalog");
        assert_eq!(catalog.diagnostics.entries().len(), 1);
    }
}
