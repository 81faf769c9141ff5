//! Smelting: render, split and classify every selected tool
//!
//! Tools are processed one after another and independently: a failing tool
//! is recorded in the [`AssemblyReport`] and the rest carry on.

use std::path::{Path, PathBuf};

use forge_core::{GitopsSettings, LayoutSettings, ToolConfig, ToolSet};
use minijinja::context;

use crate::classifier::ResourceClassifier;
use crate::error::{EngineError, Result};
use crate::node::strip_key;
use crate::render::SourceRenderer;
use crate::splitter::split;
use crate::templates::{self, TemplateRegistry};

/// Hand-maintained ExternalSecret files survive a re-smelt
const KEEP_MARKER: &str = "kind: ExternalSecret";

/// Result of smelting one tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSummary {
    pub tool: String,
    pub objects: usize,
    /// Namespace files written because no rendered object defined them
    pub namespaces_added: Vec<String>,
    pub crds_cleaned: usize,
}

/// A tool that could not be processed
#[derive(Debug)]
pub struct ToolFailure {
    pub tool: String,
    pub error: EngineError,
}

/// Per-tool outcome of an assembly run
#[derive(Debug)]
pub struct AssemblyReport<T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<ToolFailure>,
}

impl<T> Default for AssemblyReport<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> AssemblyReport<T> {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn record(&mut self, tool: &str, result: Result<T>) {
        match result {
            Ok(summary) => self.succeeded.push(summary),
            Err(error) => {
                tracing::error!(tool, error = %error, "tool failed");
                self.failed.push(ToolFailure {
                    tool: tool.to_string(),
                    error,
                });
            }
        }
    }
}

/// Runs the per-tool assembly pipeline
pub struct Smelter<'a> {
    layout: &'a LayoutSettings,
    gitops: &'a GitopsSettings,
    templates: &'a TemplateRegistry,
    renderer: &'a dyn SourceRenderer,
    keep_pre: bool,
}

impl<'a> Smelter<'a> {
    pub fn new(
        layout: &'a LayoutSettings,
        gitops: &'a GitopsSettings,
        templates: &'a TemplateRegistry,
        renderer: &'a dyn SourceRenderer,
    ) -> Self {
        Self {
            layout,
            gitops,
            templates,
            renderer,
            keep_pre: false,
        }
    }

    /// Keep `working/pre` (the rendered, unsplit streams) after the run
    pub fn keep_pre(mut self, keep: bool) -> Self {
        self.keep_pre = keep;
        self
    }

    /// Smelt every tool of the set
    pub async fn smelt(&self, tools: &ToolSet) -> AssemblyReport<ToolSummary> {
        let mut report = AssemblyReport::default();
        for tool in tools {
            let result = self.smelt_tool(tool).await;
            report.record(&tool.name, result);
        }

        let pre = self.layout.pre_dir();
        if !self.keep_pre && pre.exists() {
            if let Err(e) = std::fs::remove_dir_all(&pre) {
                tracing::warn!(path = %pre.display(), error = %e, "could not remove pre directory");
            }
        }
        report
    }

    /// Render, split and classify one tool into `working/<tool>/`
    pub async fn smelt_tool(&self, tool: &ToolConfig) -> Result<ToolSummary> {
        tracing::info!(tool = %tool.name, "smelting");
        let tool_dir = self.layout.working_dir.join(&tool.name);
        reset_tool_dir(&tool_dir)?;

        let rendered = self.renderer.render(tool).await?;
        let pre = self.layout.pre_dir();
        std::fs::create_dir_all(&pre).map_err(EngineError::io(&pre))?;
        let pre_file = pre.join(format!("{}.yaml", tool.name));
        std::fs::write(&pre_file, &rendered).map_err(EngineError::io(&pre_file))?;

        let documents = split(&rendered)?;
        let written = ResourceClassifier::new(tool).write_all(documents, &tool_dir)?;

        let namespaces_added = self.add_missing_namespaces(tool, &tool_dir)?;
        let crds_cleaned = strip_crd_descriptions(&tool_dir)?;
        self.write_application(tool)?;

        Ok(ToolSummary {
            tool: tool.name.clone(),
            objects: written.len(),
            namespaces_added,
            crds_cleaned,
        })
    }

    /// Write `Namespace_<ns>.yaml` for each declared namespace no object defines
    fn add_missing_namespaces(&self, tool: &ToolConfig, dir: &Path) -> Result<Vec<String>> {
        let mut added = Vec::new();
        for ns in tool.declared_namespaces() {
            if ns == "default" {
                continue;
            }
            let path = dir.join(format!("Namespace_{ns}.yaml"));
            if path.exists() {
                continue;
            }
            let manifest = self.templates.render(templates::NAMESPACE, context! { name => ns })?;
            std::fs::write(&path, manifest).map_err(EngineError::io(&path))?;
            added.push(ns.to_string());
        }
        Ok(added)
    }

    /// Argo CD Application pointing at the tool's directory in the GitOps repo
    fn write_application(&self, tool: &ToolConfig) -> Result<PathBuf> {
        let dir = self.layout.argo_apps_dir();
        std::fs::create_dir_all(&dir).map_err(EngineError::io(&dir))?;
        let app = self.templates.render(
            templates::APPLICATION,
            context! {
                name => &tool.name,
                sync_wave => tool.sync_wave(),
                path => format!("{}{}", self.gitops.path_prefix, tool.name),
                repo_url => &self.gitops.url,
                target_revision => &self.gitops.branch,
            },
        )?;
        let path = dir.join(format!("{}.yaml", tool.name));
        std::fs::write(&path, app).map_err(EngineError::io(&path))?;
        Ok(path)
    }
}

/// Empty a tool directory, keeping hand-maintained ExternalSecret files
fn reset_tool_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        for entry in std::fs::read_dir(dir).map_err(EngineError::io(dir))? {
            let path = entry.map_err(EngineError::io(dir))?.path();
            if !path.is_file() {
                continue;
            }
            if is_kept(&path)? {
                continue;
            }
            std::fs::remove_file(&path).map_err(EngineError::io(&path))?;
        }
    }
    std::fs::create_dir_all(dir).map_err(EngineError::io(dir))
}

/// Whether a working file is hand-maintained; a file that cannot be read is never deleted
fn is_kept(path: &Path) -> Result<bool> {
    let content = std::fs::read(path).map_err(EngineError::io(path))?;
    Ok(String::from_utf8_lossy(&content).contains(KEEP_MARKER))
}

/// Drop every `description` key from the tool's CRD files
fn strip_crd_descriptions(dir: &Path) -> Result<usize> {
    let mut cleaned = 0;
    for entry in std::fs::read_dir(dir).map_err(EngineError::io(dir))? {
        let path = entry.map_err(EngineError::io(dir))?.path();
        let is_crd = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .is_some_and(|n| n.starts_with("CustomResourceDefinition") && n.ends_with(".yaml"));
        if !is_crd {
            continue;
        }
        let content = std::fs::read_to_string(&path).map_err(EngineError::io(&path))?;
        let mut doc: serde_yaml::Value = serde_yaml::from_str(&content)?;
        if strip_key(&mut doc, "description") > 0 {
            std::fs::write(&path, serde_yaml::to_string(&doc)?).map_err(EngineError::io(&path))?;
        }
        cleaned += 1;
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Renderer returning a canned stream per tool
    struct StaticRenderer;

    #[async_trait]
    impl SourceRenderer for StaticRenderer {
        async fn render(&self, tool: &ToolConfig) -> Result<Vec<u8>> {
            match tool.name.as_str() {
                "broken" => Ok(b"kind: [unclosed\n".to_vec()),
                _ => Ok(br#"
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: widgets.example.com
spec:
  versions:
    - name: v1
      schema:
        openAPIV3Schema:
          description: A widget
          type: object
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
  labels:
    helm.sh/chart: demo-0.1.0
data:
  key: value
"#
                .to_vec()),
            }
        }
    }

    fn tool(name: &str, namespace: &str) -> ToolConfig {
        let mut tool = ToolConfig::new(name);
        tool.namespace = Some(namespace.to_string());
        tool.manifest_url = Some("https://example.com/manifest.yaml".to_string());
        tool
    }

    fn layout(dir: &TempDir) -> LayoutSettings {
        LayoutSettings::default().rooted_at(dir.path())
    }

    #[tokio::test]
    async fn test_smelt_tool_writes_objects_and_app() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let gitops = GitopsSettings::default();
        let templates = TemplateRegistry::new().unwrap();
        let smelter = Smelter::new(&layout, &gitops, &templates, &StaticRenderer);

        let summary = smelter.smelt_tool(&tool("demo", "demo-ns")).await.unwrap();
        assert_eq!(summary.objects, 2);
        assert_eq!(summary.namespaces_added, vec!["demo-ns"]);
        assert_eq!(summary.crds_cleaned, 1);

        let tool_dir = layout.working_dir.join("demo");
        let crd = std::fs::read_to_string(tool_dir.join("CustomResourceDefinition_widgets.example.com.yaml")).unwrap();
        assert!(!crd.contains("description"));
        let cm = std::fs::read_to_string(tool_dir.join("ConfigMap_settings.yaml")).unwrap();
        assert!(cm.contains("namespace: demo-ns"));
        assert!(!cm.contains("helm.sh/chart"));
        assert!(tool_dir.join("Namespace_demo-ns.yaml").exists());

        let app = std::fs::read_to_string(layout.argo_apps_dir().join("demo.yaml")).unwrap();
        assert!(app.contains("argocd.argoproj.io/sync-wave: \"0\""));
        assert!(layout.pre_dir().join("demo.yaml").exists());
    }

    #[tokio::test]
    async fn test_default_namespace_is_not_synthesized() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let gitops = GitopsSettings::default();
        let templates = TemplateRegistry::new().unwrap();
        let smelter = Smelter::new(&layout, &gitops, &templates, &StaticRenderer);

        let summary = smelter.smelt_tool(&tool("demo", "default")).await.unwrap();
        assert!(summary.namespaces_added.is_empty());
    }

    #[tokio::test]
    async fn test_failed_tool_does_not_stop_siblings() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let gitops = GitopsSettings::default();
        let templates = TemplateRegistry::new().unwrap();
        let smelter = Smelter::new(&layout, &gitops, &templates, &StaticRenderer);

        let tools: ToolSet = [tool("broken", "a"), tool("good", "b")].into_iter().collect();
        let report = smelter.smelt(&tools).await;

        assert!(!report.is_success());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].tool, "broken");
        assert!(matches!(report.failed[0].error, EngineError::Document { .. }));
        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(report.succeeded[0].tool, "good");
        // pre is removed unless asked to keep it
        assert!(!layout.pre_dir().exists());
    }

    #[tokio::test]
    async fn test_resmelt_keeps_external_secrets() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let tool_dir = layout.working_dir.join("demo");
        std::fs::create_dir_all(&tool_dir).unwrap();
        std::fs::write(
            tool_dir.join("ExternalSecret_db.yaml"),
            "apiVersion: external-secrets.io/v1beta1\nkind: ExternalSecret\nmetadata:\n  name: db\n",
        )
        .unwrap();
        std::fs::write(tool_dir.join("Service_stale.yaml"), "kind: Service\n").unwrap();

        let gitops = GitopsSettings::default();
        let templates = TemplateRegistry::new().unwrap();
        Smelter::new(&layout, &gitops, &templates, &StaticRenderer)
            .smelt_tool(&tool("demo", "demo-ns"))
            .await
            .unwrap();

        assert!(tool_dir.join("ExternalSecret_db.yaml").exists());
        assert!(!tool_dir.join("Service_stale.yaml").exists());
    }

    #[tokio::test]
    async fn test_resmelt_keeps_non_utf8_external_secret() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let tool_dir = layout.working_dir.join("demo");
        std::fs::create_dir_all(&tool_dir).unwrap();
        let mut content = b"kind: ExternalSecret\nmetadata:\n  name: legacy\n# ".to_vec();
        content.extend_from_slice(&[0xff, 0xfe, b'\n']);
        std::fs::write(tool_dir.join("ExternalSecret_legacy.yaml"), &content).unwrap();

        let gitops = GitopsSettings::default();
        let templates = TemplateRegistry::new().unwrap();
        Smelter::new(&layout, &gitops, &templates, &StaticRenderer)
            .smelt_tool(&tool("demo", "demo-ns"))
            .await
            .unwrap();

        assert_eq!(
            std::fs::read(tool_dir.join("ExternalSecret_legacy.yaml")).unwrap(),
            content
        );
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            is_kept(&dir.path().join("gone.yaml")),
            Err(EngineError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_resmelt_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let gitops = GitopsSettings::default();
        let templates = TemplateRegistry::new().unwrap();
        let smelter = Smelter::new(&layout, &gitops, &templates, &StaticRenderer);
        let demo = tool("demo", "demo-ns");

        smelter.smelt_tool(&demo).await.unwrap();
        let tool_dir = layout.working_dir.join("demo");
        let read_all = || {
            let mut files: Vec<_> = std::fs::read_dir(&tool_dir)
                .unwrap()
                .map(|e| {
                    let p = e.unwrap().path();
                    (p.clone(), std::fs::read(&p).unwrap())
                })
                .collect();
            files.sort();
            files
        };
        let first = read_all();
        smelter.smelt_tool(&demo).await.unwrap();
        assert_eq!(read_all(), first);
    }
}
