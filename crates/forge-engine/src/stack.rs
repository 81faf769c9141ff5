//! Stack assembly (cast)
//!
//! Packages every smelted tool into the output directory, tidies the result
//! and copies it into `stacks/<name>` and `stacks/latest`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use forge_core::{LayoutSettings, PackageSettings, ToolSet, validate_stack_name};
use minijinja::context;
use serde::Deserialize;
use walkdir::WalkDir;

use crate::error::{EngineError, Result};
use crate::exec::Exec;
use crate::package::{PackageReport, PackageWriter};
use crate::smelt::AssemblyReport;
use crate::templates::{self, TemplateRegistry};

/// Directory every cast refreshes besides the named stack
pub const LATEST_STACK: &str = "latest";

/// Runtime config mounting every envelope into the Crossplane function
pub const FUNCTION_TEMPLATES_FILE: &str = "function-templates.yaml";

/// Namespaces that exist on every cluster and are never shipped
const BUILTIN_NAMESPACES: &[&str] = &["default", "kube-system"];

/// Outcome of a cast
#[derive(Debug)]
pub struct CastReport {
    pub stack: String,
    pub packages: AssemblyReport<PackageReport>,
    /// Namespace documents dropped as duplicates or built-ins
    pub namespaces_dropped: usize,
    /// Files removed because they ended up empty
    pub empty_removed: usize,
    /// ConfigMap envelopes mounted by the function runtime config
    pub configmaps: Vec<String>,
    /// `stacks/<name>` and `stacks/latest`
    pub stack_dirs: Vec<PathBuf>,
}

/// Builds a stack out of the smelted working tree
pub struct StackAssembler<'a> {
    layout: &'a LayoutSettings,
    package: &'a PackageSettings,
    templates: &'a TemplateRegistry,
}

impl<'a> StackAssembler<'a> {
    pub fn new(
        layout: &'a LayoutSettings,
        package: &'a PackageSettings,
        templates: &'a TemplateRegistry,
    ) -> Self {
        Self {
            layout,
            package,
            templates,
        }
    }

    /// Package `tools` and publish the result as stack `name`
    ///
    /// Per-tool packaging failures are reported, not fatal; the stack is
    /// still written from the tools that succeeded.
    pub fn cast(&self, tools: &ToolSet, name: &str) -> Result<CastReport> {
        validate_stack_name(name)?;
        let output = &self.layout.output_dir;
        reset_dir(output)?;

        let writer = PackageWriter::new(self.templates, self.package);
        let mut packages = AssemblyReport::default();
        for tool in tools {
            let source = self.layout.working_dir.join(&tool.name);
            let result = if source.is_dir() {
                writer.package_tool(&tool.name, &source, output)
            } else {
                Err(EngineError::NotSmelted {
                    tool: tool.name.clone(),
                    path: source,
                })
            };
            packages.record(&tool.name, result);
        }

        let namespaces_dropped = dedupe_namespaces(output)?;
        let empty_removed = remove_empty_files(output)?;
        let configmaps = self.write_function_templates(output)?;

        let mut stack_dirs = Vec::new();
        for stack in [name, LATEST_STACK] {
            let dir = self.layout.stacks_dir.join(stack);
            if stack_dirs.contains(&dir) {
                continue;
            }
            self.populate_stack(&dir)?;
            stack_dirs.push(dir);
        }

        tracing::info!(
            stack = name,
            tools = packages.succeeded.len(),
            failed = packages.failed.len(),
            configmaps = configmaps.len(),
            "cast complete"
        );
        Ok(CastReport {
            stack: name.to_string(),
            packages,
            namespaces_dropped,
            empty_removed,
            configmaps,
            stack_dirs,
        })
    }

    /// Render the runtime config listing every `cm-*` envelope in `dir`
    fn write_function_templates(&self, dir: &Path) -> Result<Vec<String>> {
        let mut configmaps = Vec::new();
        for path in list_files(dir)? {
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            if stem.starts_with("cm-") {
                configmaps.push(stem);
            }
        }
        let rendered = self
            .templates
            .render(templates::FUNCTION_TEMPLATES, context! { configmaps => &configmaps })?;
        let path = dir.join(FUNCTION_TEMPLATES_FILE);
        std::fs::write(&path, rendered).map_err(EngineError::io(&path))?;
        Ok(configmaps)
    }

    /// Fresh copy of output, Argo CD applications and assets
    fn populate_stack(&self, dir: &Path) -> Result<()> {
        reset_dir(dir)?;
        copy_tree(&self.layout.output_dir, dir)?;
        let apps = self.layout.argo_apps_dir();
        if apps.is_dir() {
            copy_tree(&apps, &dir.join("argo-apps"))?;
        }
        if self.layout.assets_dir.is_dir() {
            copy_tree(&self.layout.assets_dir, dir)?;
        }
        tracing::debug!(path = %dir.display(), "stack written");
        Ok(())
    }
}

/// Build and push a multi-arch image from `context`, then check the registry has it
pub async fn publish_image(image: &str, context: &Path) -> Result<()> {
    tracing::info!(image, context = %context.display(), "building stack image");
    Exec::new("docker")
        .args(["buildx", "build", "-t", image])
        .args(["--platform", "linux/amd64,linux/arm64"])
        .args(["-f", "Dockerfile", "--push", "."])
        .current_dir(context)
        .output()
        .await?;
    Exec::new("docker")
        .args(["manifest", "inspect", image])
        .log_stdout(false)
        .output()
        .await?;
    tracing::info!(image, "image pushed");
    Ok(())
}

#[derive(Deserialize)]
struct NamespaceDoc {
    #[serde(default)]
    metadata: NamespaceMeta,
}

#[derive(Deserialize, Default)]
struct NamespaceMeta {
    #[serde(default)]
    name: String,
}

/// Keep the first document per namespace across every `namespace-*` file
///
/// Built-in namespaces are dropped. A file left without documents is removed.
fn dedupe_namespaces(dir: &Path) -> Result<usize> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut dropped = 0;

    for path in list_files(dir)? {
        let is_namespace_file = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with("namespace-"));
        if !is_namespace_file {
            continue;
        }
        let content = std::fs::read_to_string(&path).map_err(EngineError::io(&path))?;
        let mut kept = String::new();
        let mut changed = false;
        for chunk in split_raw_documents(&content) {
            let doc: NamespaceDoc = serde_yaml::from_str(chunk)?;
            let name = doc.metadata.name;
            if BUILTIN_NAMESPACES.contains(&name.as_str()) || !seen.insert(name.clone()) {
                tracing::debug!(namespace = %name, path = %path.display(), "dropping namespace");
                dropped += 1;
                changed = true;
                continue;
            }
            kept.push_str("---\n");
            kept.push_str(chunk);
        }
        if !changed {
            continue;
        }
        if kept.is_empty() {
            std::fs::remove_file(&path).map_err(EngineError::io(&path))?;
        } else {
            std::fs::write(&path, kept).map_err(EngineError::io(&path))?;
        }
    }
    Ok(dropped)
}

/// Non-empty documents of a `---`-separated stream, each ending in a newline
fn split_raw_documents(content: &str) -> Vec<&str> {
    let mut docs = Vec::new();
    let mut start = 0;
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        if line.trim_end() == "---" {
            if !content[start..offset].trim().is_empty() {
                docs.push(&content[start..offset]);
            }
            start = offset + line.len();
        }
        offset += line.len();
    }
    if !content[start..].trim().is_empty() {
        docs.push(&content[start..]);
    }
    docs
}

/// Remove yaml files with no content; returns how many went
fn remove_empty_files(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for path in list_files(dir)? {
        if path.extension().is_none_or(|ext| ext != "yaml") {
            continue;
        }
        let content = std::fs::read_to_string(&path).map_err(EngineError::io(&path))?;
        if content.trim().is_empty() {
            std::fs::remove_file(&path).map_err(EngineError::io(&path))?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(EngineError::io(dir))? {
        let path = entry.map_err(EngineError::io(dir))?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(EngineError::io(dir))?;
    }
    std::fs::create_dir_all(dir).map_err(EngineError::io(dir))
}

/// Recursively copy the contents of `src` into `dst`
fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry.map_err(|e| EngineError::Io {
            path: src.to_path_buf(),
            source: e.into(),
        })?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(EngineError::io(&target))?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(EngineError::io(&target))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::ToolConfig;
    use tempfile::TempDir;

    struct Workspace {
        _dir: TempDir,
        layout: LayoutSettings,
    }

    fn workspace() -> Workspace {
        let dir = TempDir::new().unwrap();
        let layout = LayoutSettings::default().rooted_at(dir.path());
        Workspace { _dir: dir, layout }
    }

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn tool(name: &str) -> ToolConfig {
        let mut tool = ToolConfig::new(name);
        tool.namespace = Some(name.to_string());
        tool.manifest_path = vec![format!("{name}/manifest.yaml")];
        tool
    }

    fn smelted(ws: &Workspace, tool: &str, files: &[(&str, &str)]) {
        for (name, content) in files {
            write(&ws.layout.working_dir.join(tool).join(name), content);
        }
    }

    #[test]
    fn test_split_raw_documents() {
        let docs = split_raw_documents("---\na: 1\n---\n\n---\nb: 2\n");
        assert_eq!(docs, vec!["a: 1\n", "b: 2\n"]);
        assert!(split_raw_documents("").is_empty());
    }

    #[test]
    fn test_cast_builds_stack() {
        let ws = workspace();
        smelted(
            &ws,
            "alpha",
            &[
                ("Namespace_alpha.yaml", "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: alpha\n"),
                ("Namespace_default.yaml", "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: default\n"),
                ("ConfigMap_a.yaml", "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n  namespace: alpha\n"),
            ],
        );
        smelted(
            &ws,
            "beta",
            &[
                ("Namespace_alpha.yaml", "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: alpha\n"),
                ("Secret_b.yaml", "apiVersion: v1\nkind: Secret\nmetadata:\n  name: b\n  namespace: beta\n"),
            ],
        );
        write(&ws.layout.argo_apps_dir().join("alpha.yaml"), "kind: Application\n");
        write(&ws.layout.assets_dir.join("deploy.sh"), "#!/bin/sh\n");

        let templates = TemplateRegistry::new().unwrap();
        let package = PackageSettings::default();
        let tools: ToolSet = [tool("alpha"), tool("beta")].into_iter().collect();
        let report = StackAssembler::new(&ws.layout, &package, &templates)
            .cast(&tools, "dev")
            .unwrap();

        assert!(report.packages.is_success());
        assert_eq!(report.namespaces_dropped, 2);
        assert_eq!(report.empty_removed, 0);
        assert_eq!(report.configmaps, vec!["cm-alpha-object-1", "cm-beta-secret-1"]);

        let output = &ws.layout.output_dir;
        let alpha_ns = std::fs::read_to_string(output.join("namespace-alpha-1.yaml")).unwrap();
        assert!(alpha_ns.contains("name: alpha"));
        assert!(!alpha_ns.contains("name: default"));
        // beta's only namespace document was a duplicate
        assert!(!output.join("namespace-beta-1.yaml").exists());

        let function = std::fs::read_to_string(output.join(FUNCTION_TEMPLATES_FILE)).unwrap();
        assert!(function.contains("/templates/cm-beta-secret-1"));

        for stack in ["dev", "latest"] {
            let dir = ws.layout.stacks_dir.join(stack);
            assert!(dir.join("cm-alpha-object-1.yaml").exists());
            assert!(dir.join("argo-apps/alpha.yaml").exists());
            assert!(dir.join("deploy.sh").exists());
        }
    }

    #[test]
    fn test_unsmelted_tool_is_reported() {
        let ws = workspace();
        smelted(
            &ws,
            "alpha",
            &[("ConfigMap_a.yaml", "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n")],
        );
        let templates = TemplateRegistry::new().unwrap();
        let package = PackageSettings::default();
        let tools: ToolSet = [tool("alpha"), tool("ghost")].into_iter().collect();
        let report = StackAssembler::new(&ws.layout, &package, &templates)
            .cast(&tools, "latest")
            .unwrap();

        assert_eq!(report.packages.succeeded.len(), 1);
        assert_eq!(report.packages.failed.len(), 1);
        assert!(matches!(report.packages.failed[0].error, EngineError::NotSmelted { .. }));
        assert_eq!(report.stack_dirs, vec![ws.layout.stacks_dir.join("latest")]);
    }

    #[test]
    fn test_invalid_stack_name() {
        let ws = workspace();
        let templates = TemplateRegistry::new().unwrap();
        let package = PackageSettings::default();
        let err = StackAssembler::new(&ws.layout, &package, &templates)
            .cast(&ToolSet::new(), "Bad Name")
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert!(!ws.layout.output_dir.exists());
    }

    #[test]
    fn test_empty_files_are_removed() {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join("empty.yaml"), "\n\n");
        write(&dir.path().join("full.yaml"), "a: 1\n");
        write(&dir.path().join("notes.txt"), "");
        assert_eq!(remove_empty_files(dir.path()).unwrap(), 1);
        assert!(dir.path().join("full.yaml").exists());
        assert!(dir.path().join("notes.txt").exists());
    }
}
