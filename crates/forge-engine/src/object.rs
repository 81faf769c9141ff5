//! Kubernetes object view over a YAML document

use serde_yaml::{Mapping, Value};

use crate::error::{EngineError, Result};
use crate::node::mapping_at_mut;

/// A decoded Kubernetes object
///
/// `kind`, `api_version` and `name` are lifted out for classification; the
/// full document stays in `body` with unknown fields and their order intact.
#[derive(Debug, Clone, PartialEq)]
pub struct K8sObject {
    pub kind: String,
    pub api_version: String,
    pub name: String,
    body: Value,
}

impl K8sObject {
    /// Build from a decoded document; `kind` and `metadata.name` are required
    pub fn from_value(body: Value) -> Result<Self> {
        let kind = str_field(&body, &["kind"])
            .ok_or_else(|| EngineError::MissingField {
                field: "kind",
                context: describe(&body),
            })?
            .to_string();
        let name = str_field(&body, &["metadata", "name"])
            .ok_or_else(|| EngineError::MissingField {
                field: "metadata.name",
                context: format!("kind {kind}"),
            })?
            .to_string();
        let api_version = str_field(&body, &["apiVersion"]).unwrap_or_default().to_string();

        Ok(Self {
            kind,
            api_version,
            name,
            body,
        })
    }

    /// Parse a single-document YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::from_value(serde_yaml::from_str(yaml)?)
    }

    /// `metadata.namespace`, when present and non-empty
    pub fn namespace(&self) -> Option<&str> {
        str_field(&self.body, &["metadata", "namespace"]).filter(|ns| !ns.is_empty())
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        if let Some(metadata) = mapping_at_mut(&mut self.body, &["metadata"]) {
            metadata.insert("namespace".into(), namespace.into());
        }
    }

    /// Remove `metadata.namespace`; returns whether one was present
    pub fn clear_namespace(&mut self) -> bool {
        self.body
            .get_mut("metadata")
            .and_then(Value::as_mapping_mut)
            .and_then(|m| m.remove("namespace"))
            .is_some()
    }

    pub fn labels(&self) -> Option<&Mapping> {
        self.body
            .get("metadata")
            .and_then(|m| m.get("labels"))
            .and_then(Value::as_mapping)
    }

    pub fn annotations(&self) -> Option<&Mapping> {
        self.body
            .get("metadata")
            .and_then(|m| m.get("annotations"))
            .and_then(Value::as_mapping)
    }

    /// Per-object file name: `<Kind>_<Name>.yaml`
    pub fn file_name(&self) -> String {
        format!("{}_{}.yaml", self.kind, self.name)
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Value {
        &mut self.body
    }

    pub fn into_value(self) -> Value {
        self.body
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.body)?)
    }
}

fn str_field<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    current.as_str()
}

fn describe(value: &Value) -> String {
    match str_field(value, &["metadata", "name"]) {
        Some(name) => format!("name {name}"),
        None => "unnamed document".to_string(),
    }
}
