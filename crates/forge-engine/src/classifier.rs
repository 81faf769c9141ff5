//! Namespace classification and per-object files
//!
//! Each split document becomes a [`K8sObject`] whose namespace is settled:
//! cluster-scoped kinds lose any namespace they carry, namespaced kinds
//! without one get the tool's primary namespace. Running the classifier on
//! its own output changes nothing.

use std::path::{Path, PathBuf};

use forge_core::{ToolConfig, is_cluster_scoped};

use crate::error::{EngineError, Result};
use crate::object::K8sObject;
use crate::splitter::ManifestDocument;

/// Settles namespaces for one tool's objects
pub struct ResourceClassifier<'a> {
    tool: &'a ToolConfig,
    default_namespace: Option<&'a str>,
}

impl<'a> ResourceClassifier<'a> {
    pub fn new(tool: &'a ToolConfig) -> Self {
        Self {
            tool,
            default_namespace: tool.primary_namespace(),
        }
    }

    /// Classify one document
    pub fn classify(&self, document: ManifestDocument) -> Result<K8sObject> {
        let mut object = K8sObject::from_value(document.value)?;
        self.apply(&mut object)?;
        Ok(object)
    }

    /// Settle the namespace of an already decoded object
    ///
    /// A namespaced object with no namespace of its own fails when the tool
    /// declares none.
    pub fn apply(&self, object: &mut K8sObject) -> Result<()> {
        if is_cluster_scoped(&object.kind, &object.api_version) {
            if object.clear_namespace() {
                tracing::debug!(
                    kind = %object.kind,
                    name = %object.name,
                    "dropped namespace from cluster-scoped object"
                );
            }
            return Ok(());
        }
        if object.namespace().is_some() {
            return Ok(());
        }
        match self.default_namespace {
            Some(ns) => {
                object.set_namespace(ns);
                Ok(())
            }
            None => Err(EngineError::MissingField {
                field: "namespace",
                context: format!(
                    "{}/{} of tool '{}', which declares no namespace",
                    object.kind, object.name, self.tool.name
                ),
            }),
        }
    }

    /// Classify every document and write it to `dir/<Kind>_<Name>.yaml`
    pub fn write_all(&self, documents: Vec<ManifestDocument>, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir).map_err(EngineError::io(dir))?;
        documents
            .into_iter()
            .map(|doc| {
                let object = self.classify(doc)?;
                write_object(&object, dir)
            })
            .collect()
    }
}

/// Write one object to `dir/<Kind>_<Name>.yaml`, replacing any previous copy
pub fn write_object(object: &K8sObject, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(object.file_name());
    std::fs::write(&path, object.to_yaml()?).map_err(EngineError::io(&path))?;
    Ok(path)
}
