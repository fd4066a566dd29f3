//! Spec document loading: decode, canonicalize, shape-check, and normalize
//! the definitions table.
//!
//! Documents arrive as JSON or YAML. YAML mappings may carry non-string keys
//! (a bare `200:` parses as an integer), so the whole tree is canonicalized
//! into string-keyed `serde_json::Value` before anything else looks at it.

use serde_json::Value;

use std::collections::BTreeMap;
use std::path::Path;

use crate::{DroverError, DroverResult, SchemaNode};

#[derive(Debug, Clone)]
pub struct SpecDocument {
    paths: serde_json::Map<String, Value>,
    definitions: BTreeMap<String, SchemaNode>,
}

impl SpecDocument {
    pub fn load_file(path: &Path) -> DroverResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes).map_err(|err| match err {
            DroverError::Parse(msg) => {
                DroverError::Parse(format!("{}: {msg}", path.display()))
            }
            DroverError::SchemaShape(msg) => {
                DroverError::SchemaShape(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn parse(bytes: &[u8]) -> DroverResult<Self> {
        let document = decode(bytes)?;
        let Some(root) = document.as_object() else {
            return Err(DroverError::SchemaShape(
                "document root is not an object".to_string(),
            ));
        };

        let paths = match root.get("paths").and_then(Value::as_object) {
            Some(paths) => paths.clone(),
            None => {
                return Err(DroverError::SchemaShape(
                    "missing or non-object `paths` section".to_string(),
                ));
            }
        };

        let raw_definitions = match root.get("definitions").and_then(Value::as_object) {
            Some(definitions) => definitions,
            None => {
                return Err(DroverError::SchemaShape(
                    "missing or non-object `definitions` section".to_string(),
                ));
            }
        };

        let mut definitions = BTreeMap::new();
        for (name, schema) in raw_definitions {
            let node = SchemaNode::from_value(schema, &format!("definitions.{name}"))?;
            definitions.insert(name.clone(), node);
        }

        Ok(Self { paths, definitions })
    }

    pub fn paths(&self) -> &serde_json::Map<String, Value> {
        &self.paths
    }

    pub fn definitions(&self) -> &BTreeMap<String, SchemaNode> {
        &self.definitions
    }
}

/// JSON first for precise errors; YAML as the permissive fallback.
fn decode(bytes: &[u8]) -> DroverResult<Value> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => Ok(value),
        Err(json_err) => {
            let yaml: serde_yaml::Value = serde_yaml::from_slice(bytes).map_err(|yaml_err| {
                DroverError::Parse(format!(
                    "document is neither JSON ({json_err}) nor YAML ({yaml_err})"
                ))
            })?;
            canonicalize(yaml)
        }
    }
}

/// Recursively convert a YAML tree into a string-keyed JSON tree.
fn canonicalize(value: serde_yaml::Value) -> DroverResult<Value> {
    match value {
        serde_yaml::Value::Null => Ok(Value::Null),
        serde_yaml::Value::Bool(b) => Ok(Value::Bool(b)),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::from(i))
            } else if let Some(u) = n.as_u64() {
                Ok(Value::from(u))
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| {
                        DroverError::Parse(format!("non-finite number {n} in document"))
                    })
            } else {
                Err(DroverError::Parse(format!(
                    "unrepresentable number {n} in document"
                )))
            }
        }
        serde_yaml::Value::String(s) => Ok(Value::String(s)),
        serde_yaml::Value::Sequence(seq) => {
            let mut out = Vec::with_capacity(seq.len());
            for entry in seq {
                out.push(canonicalize(entry)?);
            }
            Ok(Value::Array(out))
        }
        serde_yaml::Value::Mapping(map) => {
            let mut out = serde_json::Map::new();
            for (key, entry) in map {
                out.insert(scalar_key(key)?, canonicalize(entry)?);
            }
            Ok(Value::Object(out))
        }
        serde_yaml::Value::Tagged(tagged) => canonicalize(tagged.value),
    }
}

fn scalar_key(key: serde_yaml::Value) -> DroverResult<String> {
    match key {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(DroverError::Parse(format!(
            "non-scalar mapping key {other:?} in document"
        ))),
    }
}
