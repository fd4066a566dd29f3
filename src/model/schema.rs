//! Canonical schema tree and reference resolution.
//!
//! Every schema in the spec document is normalized into a [`SchemaNode`] once
//! at load time; the rest of the pipeline never inspects raw JSON shapes.

use serde::Serialize;
use serde_json::Value;

use std::collections::{BTreeMap, BTreeSet};

use crate::{DroverError, DroverResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaNode {
    String {
        #[serde(skip_serializing_if = "Option::is_none")]
        format: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        enum_values: Vec<String>,
    },
    Integer,
    Boolean,
    Object {
        properties: BTreeMap<String, SchemaNode>,
    },
    Array {
        items: Box<SchemaNode>,
    },
    Reference {
        target: String,
    },
}

impl SchemaNode {
    /// Normalize one raw schema value. `at` names the location for error
    /// messages (e.g. `definitions.User.properties.id`).
    pub fn from_value(value: &Value, at: &str) -> DroverResult<Self> {
        let Some(obj) = value.as_object() else {
            return Err(DroverError::SchemaShape(format!(
                "schema at {at} is not an object"
            )));
        };

        if let Some(reference) = obj.get("$ref") {
            let Some(pointer) = reference.as_str() else {
                return Err(DroverError::Parse(format!(
                    "$ref at {at} is not a string"
                )));
            };
            // Only the final segment of `#/definitions/<Name>` is significant.
            let target = pointer.rsplit('/').next().unwrap_or_default();
            if target.is_empty() {
                return Err(DroverError::Parse(format!(
                    "$ref at {at} has no target name: {pointer:?}"
                )));
            }
            return Ok(Self::Reference {
                target: target.to_string(),
            });
        }

        let type_name = obj.get("type").and_then(Value::as_str);
        match type_name {
            Some("string") => {
                let format = obj
                    .get("format")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let enum_values = match obj.get("enum") {
                    None => Vec::new(),
                    Some(Value::Array(entries)) => {
                        let mut values = Vec::with_capacity(entries.len());
                        for entry in entries {
                            let Some(s) = entry.as_str() else {
                                return Err(DroverError::Parse(format!(
                                    "enum value at {at} is not a string: {entry}"
                                )));
                            };
                            values.push(s.to_string());
                        }
                        values
                    }
                    Some(other) => {
                        return Err(DroverError::Parse(format!(
                            "enum at {at} is not an array: {other}"
                        )));
                    }
                };
                Ok(Self::String {
                    format,
                    enum_values,
                })
            }
            Some("integer") => Ok(Self::Integer),
            Some("boolean") => Ok(Self::Boolean),
            Some("array") => {
                let Some(items) = obj.get("items") else {
                    return Err(DroverError::SchemaShape(format!(
                        "array schema at {at} has no items"
                    )));
                };
                let items = Self::from_value(items, &format!("{at}.items"))?;
                Ok(Self::Array {
                    items: Box::new(items),
                })
            }
            Some("object") => Self::object_from(obj, at),
            // Swagger 2.0 documents routinely omit `type: object` when
            // `properties` is present.
            None if obj.get("properties").is_some() => Self::object_from(obj, at),
            Some(other) => Err(DroverError::UnsupportedSchemaType(format!(
                "{other} (at {at})"
            ))),
            None => Err(DroverError::UnsupportedSchemaType(format!(
                "<missing> (at {at})"
            ))),
        }
    }

    fn object_from(
        obj: &serde_json::Map<String, Value>,
        at: &str,
    ) -> DroverResult<Self> {
        let mut properties = BTreeMap::new();
        if let Some(props) = obj.get("properties") {
            let Some(props) = props.as_object() else {
                return Err(DroverError::SchemaShape(format!(
                    "properties at {at} is not an object"
                )));
            };
            for (name, child) in props {
                let child = Self::from_value(child, &format!("{at}.properties.{name}"))?;
                properties.insert(name.clone(), child);
            }
        }
        Ok(Self::Object { properties })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::String { .. } => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object { .. } => "object",
            Self::Array { .. } => "array",
            Self::Reference { .. } => "reference",
        }
    }
}

/// Resolution context: the definitions table plus nothing else. The cycle
/// guard is local to each top-level `resolve` call, so the context itself is
/// freely shareable.
pub struct ResolverContext<'a> {
    definitions: &'a BTreeMap<String, SchemaNode>,
}

impl<'a> ResolverContext<'a> {
    pub fn new(definitions: &'a BTreeMap<String, SchemaNode>) -> Self {
        Self { definitions }
    }

    /// Expand every reference in `node` into its definition subtree. Fails
    /// with `CyclicSchema` if a reference chain re-enters a definition that
    /// is still being expanded.
    pub fn resolve(&self, node: &SchemaNode) -> DroverResult<SchemaNode> {
        let mut visiting = BTreeSet::new();
        self.resolve_guarded(node, &mut visiting)
    }

    fn resolve_guarded(
        &self,
        node: &SchemaNode,
        visiting: &mut BTreeSet<String>,
    ) -> DroverResult<SchemaNode> {
        match node {
            SchemaNode::Reference { target } => {
                if !visiting.insert(target.clone()) {
                    return Err(DroverError::CyclicSchema(target.clone()));
                }
                let definition = self.definitions.get(target).ok_or_else(|| {
                    DroverError::SchemaShape(format!(
                        "reference to unknown definition {target:?}"
                    ))
                })?;
                let resolved = self.resolve_guarded(definition, visiting)?;
                // Sibling branches may reference this name again.
                visiting.remove(target);
                Ok(resolved)
            }
            SchemaNode::Object { properties } => {
                let mut resolved = BTreeMap::new();
                for (name, child) in properties {
                    resolved.insert(name.clone(), self.resolve_guarded(child, visiting)?);
                }
                Ok(SchemaNode::Object {
                    properties: resolved,
                })
            }
            SchemaNode::Array { items } => Ok(SchemaNode::Array {
                items: Box::new(self.resolve_guarded(items, visiting)?),
            }),
            terminal => Ok(terminal.clone()),
        }
    }
}
