//! Generic object record
//!
//! [`Object`] is a schema-less record in the usual `apiVersion`/`kind`/
//! `metadata`/`spec` layout. It is what the CLI loads from JSON files and
//! what most tests store.

use crate::record::Record;
use kindcache_common::{Kind, Labels};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Object metadata
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub annotations: Labels,
}

/// Schema-less record
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Object {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub spec: Value,
}

impl Object {
    /// Create an object of the given type. The API version is left empty
    /// until the object is tagged by the cache.
    pub fn new(kind: impl Into<String>, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_version: String::new(),
            kind: kind.into(),
            metadata: ObjectMeta {
                name: name.into(),
                namespace: namespace.into(),
                ..ObjectMeta::default()
            },
            spec: Value::Null,
        }
    }

    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.annotations.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_spec(mut self, spec: Value) -> Self {
        self.spec = spec;
        self
    }

    /// Get an annotation value
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(String::as_str)
    }

    /// Resolve a dotted field path to its scalar values.
    ///
    /// Supported paths:
    /// - `metadata.name`, `metadata.namespace`
    /// - `metadata.labels.<key>`, `metadata.annotations.<key>` (the key may
    ///   itself contain dots and slashes)
    /// - `spec.<a>.<b>...`, where arrays of scalars yield one value per item
    ///
    /// Unknown paths and non-scalar values yield no values.
    pub fn field_values(&self, path: &str) -> Vec<String> {
        match path {
            "metadata.name" => return vec![self.metadata.name.clone()],
            "metadata.namespace" => return vec![self.metadata.namespace.clone()],
            _ => {}
        }
        if let Some(key) = path.strip_prefix("metadata.labels.") {
            return self.metadata.labels.get(key).cloned().into_iter().collect();
        }
        if let Some(key) = path.strip_prefix("metadata.annotations.") {
            return self.annotation(key).map(str::to_string).into_iter().collect();
        }

        let pointer = match path.strip_prefix("spec") {
            Some("") => String::new(),
            Some(rest) if rest.starts_with('.') => rest
                .split('.')
                .skip(1)
                .map(|seg| format!("/{}", seg.replace('~', "~0").replace('/', "~1")))
                .collect(),
            _ => return Vec::new(),
        };
        match self.spec.pointer(&pointer) {
            Some(Value::Array(items)) => items.iter().filter_map(scalar_to_string).collect(),
            Some(value) => scalar_to_string(value).into_iter().collect(),
            None => Vec::new(),
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl Record for Object {
    fn type_name(&self) -> &str {
        &self.kind
    }

    fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn labels(&self) -> &Labels {
        &self.metadata.labels
    }

    fn set_kind(&mut self, kind: &Kind) {
        self.api_version = kind.api_version();
        self.kind.clone_from(&kind.kind);
    }
}
