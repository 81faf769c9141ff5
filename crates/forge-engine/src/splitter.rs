//! Multi-document YAML splitting
//!
//! Decodes a rendered stream one document at a time. Null documents (an
//! empty section between two `---`) are dropped. Each document is then
//! re-serialized and cleaned line by line:
//!
//! - document separator lines
//! - full-line comments
//! - `helm.sh/chart` and `app.kubernetes.io/managed-by` provenance lines
//!
//! The provenance lines change on every chart bump and would otherwise
//! cause a re-deploy of every object.

use serde::Deserialize;
use serde_yaml::Value;

use crate::error::{EngineError, Result};

/// Lines carrying any of these markers are dropped
const PROVENANCE_MARKERS: &[&str] = &["helm.sh/chart", "app.kubernetes.io/managed-by"];

/// One document extracted from a stream
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDocument {
    /// Position among the non-empty documents of the stream, from 0
    pub index: usize,
    pub value: Value,
}

/// Split a raw multi-document YAML stream
///
/// Returns every non-null document in stream order. A malformed document
/// aborts the split with [`EngineError::Document`].
pub fn split(raw: &[u8]) -> Result<Vec<ManifestDocument>> {
    let text = normalize(raw);
    let mut documents = Vec::new();

    for (position, de) in serde_yaml::Deserializer::from_str(&text).enumerate() {
        let value = Value::deserialize(de).map_err(|source| EngineError::Document {
            index: position,
            source,
        })?;
        if value.is_null() {
            continue;
        }

        let index = documents.len();
        let value = clean_document(&value)
            .map_err(|source| EngineError::Document { index, source })?;
        if value.is_null() {
            continue;
        }
        documents.push(ManifestDocument { index, value });
    }

    tracing::trace!(documents = documents.len(), "split stream");
    Ok(documents)
}

/// Replace tabs with two spaces; some published manifests indent with tabs
fn normalize(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).replace('\t', "  ")
}

fn clean_document(value: &Value) -> std::result::Result<Value, serde_yaml::Error> {
    let text = serde_yaml::to_string(value)?;
    serde_yaml::from_str(&clean_lines(&text))
}

/// Drop separator, comment and provenance lines
pub fn clean_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed == "---" || trimmed.starts_with("--- ") || trimmed == "..." {
            continue;
        }
        if trimmed.starts_with('#') {
            continue;
        }
        if PROVENANCE_MARKERS.iter().any(|m| line.contains(m)) {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(docs: &[ManifestDocument]) -> Vec<&str> {
        docs.iter()
            .map(|d| d.value.get("kind").and_then(Value::as_str).unwrap_or(""))
            .collect()
    }

    #[test]
    fn test_split_preserves_order() {
        let raw = br#"
apiVersion: v1
kind: ServiceAccount
metadata:
  name: a
---
apiVersion: v1
kind: Service
metadata:
  name: b
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: c
"#;
        let docs = split(raw).unwrap();
        assert_eq!(kinds(&docs), vec!["ServiceAccount", "Service", "Deployment"]);
        assert_eq!(
            docs.iter().map(|d| d.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_empty_documents_are_skipped() {
        let raw = b"---\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n---\n# only a comment\n---\n";
        let docs = split(raw).unwrap();
        assert_eq!(kinds(&docs), vec!["ConfigMap"]);
    }

    #[test]
    fn test_empty_stream() {
        assert!(split(b"").unwrap().is_empty());
        assert!(split(b"---\n").unwrap().is_empty());
    }

    #[test]
    fn test_tabs_are_normalized() {
        let raw = b"apiVersion: v1\nkind: ConfigMap\nmetadata:\n\tname: tabbed\n";
        let docs = split(raw).unwrap();
        assert_eq!(
            docs[0].value["metadata"]["name"].as_str(),
            Some("tabbed")
        );
    }

    #[test]
    fn test_provenance_labels_are_removed() {
        let raw = br#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: cm
  labels:
    app.kubernetes.io/name: demo
    app.kubernetes.io/managed-by: Helm
    helm.sh/chart: demo-1.2.3
data:
  key: value
"#;
        let docs = split(raw).unwrap();
        let labels = docs[0].value["metadata"]["labels"].as_mapping().unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get("app.kubernetes.io/name").and_then(Value::as_str), Some("demo"));
        assert_eq!(docs[0].value["data"]["key"].as_str(), Some("value"));
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        let raw = b"apiVersion: v1\nkind: ConfigMap\n---\nkey: [unclosed\n";
        match split(raw) {
            Err(EngineError::Document { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected document error, got {:?}", other),
        }
    }

    #[test]
    fn test_clean_lines() {
        let text = "---\n# comment\nkind: A\n  # indented comment\nname: b\n";
        assert_eq!(clean_lines(text), "kind: A\nname: b\n");
    }
}
