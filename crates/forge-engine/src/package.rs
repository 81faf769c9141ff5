//! Size-capped delivery packages
//!
//! Turns a tool's per-object files into a handful of delivery files, one
//! stream per [`ResourceCategory`]:
//!
//! - CRDs and Namespaces are concatenated verbatim behind `---` markers
//! - Secrets, ExternalSecrets and everything else are indented and embedded
//!   as entries of a ConfigMap envelope, one envelope per file
//!
//! Each stream rotates to a new file (`index + 1`) before an entry would
//! take it past the byte cap. The projected size of the rendered entry is
//! checked, so a file only exceeds the cap when a single entry is larger than
//! the cap on its own; such an entry always lands in a file by itself.

use std::collections::{BTreeMap, BTreeSet};
use std::collections::btree_map::Entry;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use forge_core::{PackageSettings, ResourceCategory};
use minijinja::context;

use crate::error::{EngineError, Result};
use crate::templates::{self, TemplateRegistry, indent};

/// Objects carrying this marker are install hooks and are not packaged
pub const HOOK_MARKER: &str = "helm.sh/hook";

/// Indentation of embedded objects inside an envelope's `data` block
const ENTRY_INDENT: usize = 4;

/// Writes delivery files for one tool at a time
pub struct PackageWriter<'a> {
    templates: &'a TemplateRegistry,
    max_file_size: u64,
    envelope_namespace: &'a str,
}

/// A delivery file that has been closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedFile {
    pub category: ResourceCategory,
    pub index: usize,
    pub path: PathBuf,
    /// Size on disk after blank-line normalization
    pub byte_size: u64,
    pub entries: usize,
}

/// Outcome of packaging one tool
#[derive(Debug, Clone, Default)]
pub struct PackageReport {
    pub tool: String,
    pub files: Vec<PackagedFile>,
    /// Per-object files left out because they are install hooks
    pub skipped_hooks: Vec<PathBuf>,
}

impl PackageReport {
    pub fn objects(&self) -> usize {
        self.files.iter().map(|f| f.entries).sum()
    }
}

/// A delivery file being written
struct PackageFile {
    category: ResourceCategory,
    index: usize,
    path: PathBuf,
    /// Bytes already written
    byte_size: u64,
    entries: usize,
    writer: BufWriter<File>,
}

impl PackageFile {
    fn create(category: ResourceCategory, tool: &str, index: usize, dir: &Path) -> Result<Self> {
        let path = dir.join(category.file_name(tool, index));
        let file = File::create(&path).map_err(EngineError::io(&path))?;
        tracing::debug!(path = %path.display(), "opened delivery file");
        Ok(Self {
            category,
            index,
            path,
            byte_size: 0,
            entries: 0,
            writer: BufWriter::new(file),
        })
    }

    fn write(&mut self, text: &str) -> Result<()> {
        self.writer
            .write_all(text.as_bytes())
            .map_err(EngineError::io(&self.path))?;
        self.byte_size += text.len() as u64;
        Ok(())
    }

    fn append(&mut self, entry: &str) -> Result<()> {
        self.write(entry)?;
        self.entries += 1;
        Ok(())
    }

    /// Whether appending `len` more bytes would cross `cap`
    ///
    /// An empty file accepts any entry, so one oversized object still ships.
    fn would_overflow(&self, len: usize, cap: u64) -> bool {
        self.entries > 0 && self.byte_size + len as u64 > cap
    }

    fn close(mut self) -> Result<PackagedFile> {
        self.writer.flush().map_err(EngineError::io(&self.path))?;
        Ok(PackagedFile {
            category: self.category,
            index: self.index,
            path: self.path,
            byte_size: self.byte_size,
            entries: self.entries,
        })
    }
}

impl<'a> PackageWriter<'a> {
    pub fn new(templates: &'a TemplateRegistry, settings: &'a PackageSettings) -> Self {
        Self {
            templates,
            max_file_size: settings.max_file_size,
            envelope_namespace: &settings.envelope_namespace,
        }
    }

    /// Package every per-object file in `source_dir` into `output_dir`
    pub fn package_tool(&self, tool: &str, source_dir: &Path, output_dir: &Path) -> Result<PackageReport> {
        std::fs::create_dir_all(output_dir).map_err(EngineError::io(output_dir))?;

        let mut report = PackageReport {
            tool: tool.to_string(),
            ..Default::default()
        };
        let mut open: BTreeMap<ResourceCategory, PackageFile> = BTreeMap::new();
        let mut keys: BTreeMap<ResourceCategory, BTreeSet<String>> = BTreeMap::new();

        for path in list_object_files(source_dir)? {
            let content = std::fs::read_to_string(&path).map_err(EngineError::io(&path))?;
            if content.contains(HOOK_MARKER) {
                tracing::debug!(path = %path.display(), "skipping hook");
                report.skipped_hooks.push(path);
                continue;
            }

            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let category = ResourceCategory::from_file_name(&file_name);
            let key = unique_key(keys.entry(category).or_default(), entry_key(&file_name));
            let entry = self.render_entry(category, &key, &content)?;

            if open
                .get(&category)
                .is_some_and(|f| f.would_overflow(entry.len(), self.max_file_size))
            {
                if let Some(full) = open.remove(&category) {
                    let next = full.index + 1;
                    tracing::debug!(tool, %category, index = next, "rotating delivery file");
                    report.files.push(full.close()?);
                    open.insert(category, self.open_file(tool, category, next, output_dir)?);
                }
            }

            let file = match open.entry(category) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => e.insert(self.open_file(tool, category, 1, output_dir)?),
            };
            file.append(&entry)?;
        }

        for (_, file) in open {
            report.files.push(file.close()?);
        }
        for file in report.files.iter_mut() {
            file.byte_size = strip_blank_lines(&file.path)?;
        }
        report.files.sort_by(|a, b| a.path.cmp(&b.path));

        tracing::info!(
            tool,
            files = report.files.len(),
            objects = report.objects(),
            hooks = report.skipped_hooks.len(),
            "packaged tool"
        );
        Ok(report)
    }

    /// Open `index` of a category stream, writing the envelope header if it has one
    fn open_file(
        &self,
        tool: &str,
        category: ResourceCategory,
        index: usize,
        dir: &Path,
    ) -> Result<PackageFile> {
        let mut file = PackageFile::create(category, tool, index, dir)?;
        if category.is_wrapped() {
            let header = self.templates.render(
                templates::CONFIGMAP_HEADER,
                context! {
                    tool => tool,
                    category => category.label(),
                    index => index,
                    namespace => self.envelope_namespace,
                },
            )?;
            file.write(&header)?;
        }
        Ok(file)
    }

    fn render_entry(&self, category: ResourceCategory, key: &str, content: &str) -> Result<String> {
        if !category.is_wrapped() {
            let mut raw = String::with_capacity(content.len() + 5);
            raw.push_str("---\n");
            raw.push_str(content);
            if !content.ends_with('\n') {
                raw.push('\n');
            }
            return Ok(raw);
        }
        self.templates.render(
            templates::CONFIGMAP_ENTRY,
            context! {
                key => key,
                content => indent(content, ENTRY_INDENT),
            },
        )
    }
}

/// ConfigMap data key for a per-object file
///
/// `Secret_my_token.yaml` becomes `secret-my-token`.
pub fn entry_key(file_name: &str) -> String {
    let stem = file_name.strip_suffix(".yaml").unwrap_or(file_name);
    stem.to_lowercase().replace('_', "-").replace(':', "")
}

/// `key`, or `key-2`, `key-3`, ... when an earlier entry of the stream took it
fn unique_key(taken: &mut BTreeSet<String>, key: String) -> String {
    let mut candidate = key.clone();
    let mut n = 2;
    while taken.contains(&candidate) {
        candidate = format!("{key}-{n}");
        n += 1;
    }
    if candidate != key {
        tracing::debug!(%key, %candidate, "entry key already taken");
    }
    taken.insert(candidate.clone());
    candidate
}

/// Regular files of a tool directory, sorted by name
fn list_object_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(EngineError::io(dir))? {
        let entry = entry.map_err(EngineError::io(dir))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Rewrite a file without blank lines; returns the new size
fn strip_blank_lines(path: &Path) -> Result<u64> {
    let content = std::fs::read_to_string(path).map_err(EngineError::io(path))?;
    let mut out = String::with_capacity(content.len());
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        out.push_str(line);
        out.push('\n');
    }
    std::fs::write(path, &out).map_err(EngineError::io(path))?;
    Ok(out.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ResourceClassifier;
    use crate::splitter::split;
    use forge_core::ToolConfig;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: widgets.example.com
spec:
  group: example.com
---
apiVersion: v1
kind: Namespace
metadata:
  name: sample-ns
---
apiVersion: v1
kind: Secret
metadata:
  name: sample-secret
stringData:
  token: abc
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: sample-cm
data:
  key: value
"#;

    struct Fixture {
        _dir: TempDir,
        working: PathBuf,
        output: PathBuf,
    }

    fn fixture(stream: &str) -> Fixture {
        let dir = TempDir::new().unwrap();
        let working = dir.path().join("working/sampletool");
        let output = dir.path().join("output");
        let mut tool = ToolConfig::new("sampletool");
        tool.namespace = Some("sample-ns".to_string());
        ResourceClassifier::new(&tool)
            .write_all(split(stream.as_bytes()).unwrap(), &working)
            .unwrap();
        Fixture {
            _dir: dir,
            working,
            output,
        }
    }

    fn names(report: &PackageReport) -> Vec<String> {
        report
            .files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_sample_tool_package() {
        let fx = fixture(SAMPLE);
        let templates = TemplateRegistry::new().unwrap();
        let settings = PackageSettings::default();
        let writer = PackageWriter::new(&templates, &settings);

        let report = writer.package_tool("sampletool", &fx.working, &fx.output).unwrap();
        assert_eq!(
            names(&report),
            vec![
                "cm-sampletool-object-1.yaml",
                "cm-sampletool-secret-1.yaml",
                "crd-sampletool-1.yaml",
                "namespace-sampletool-1.yaml",
            ]
        );

        let crd = std::fs::read_to_string(fx.output.join("crd-sampletool-1.yaml")).unwrap();
        assert!(crd.starts_with("---\n"));
        assert!(crd.contains("name: widgets.example.com"));
        assert!(!crd.contains("kind: ConfigMap"));

        let ns = std::fs::read_to_string(fx.output.join("namespace-sampletool-1.yaml")).unwrap();
        assert!(ns.starts_with("---\n"));
        assert!(ns.contains("kind: Namespace"));

        for (file, key, kind) in [
            ("cm-sampletool-secret-1.yaml", "secret-sample-secret", "Secret"),
            ("cm-sampletool-object-1.yaml", "configmap-sample-cm", "ConfigMap"),
        ] {
            let text = std::fs::read_to_string(fx.output.join(file)).unwrap();
            assert_eq!(text.matches("kind: ConfigMap\n").count(), if kind == "ConfigMap" { 2 } else { 1 });
            let envelope: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
            let data = envelope["data"].as_mapping().unwrap();
            assert_eq!(data.len(), 1);
            let payload: serde_yaml::Value =
                serde_yaml::from_str(data.get(key).and_then(|v| v.as_str()).unwrap()).unwrap();
            assert_eq!(payload["kind"].as_str(), Some(kind));
            assert_eq!(payload["metadata"]["namespace"].as_str(), Some("sample-ns"));
        }
    }

    #[test]
    fn test_colliding_entry_keys_are_suffixed() {
        let fx = fixture(
            r#"
apiVersion: v1
kind: Secret
metadata:
  name: a_b
stringData:
  which: underscore
---
apiVersion: v1
kind: Secret
metadata:
  name: a-b
stringData:
  which: dash
"#,
        );
        let templates = TemplateRegistry::new().unwrap();
        let settings = PackageSettings::default();
        PackageWriter::new(&templates, &settings)
            .package_tool("sampletool", &fx.working, &fx.output)
            .unwrap();

        let text = std::fs::read_to_string(fx.output.join("cm-sampletool-secret-1.yaml")).unwrap();
        let envelope: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
        let data = envelope["data"].as_mapping().unwrap();
        assert_eq!(data.len(), 2);
        for (key, which) in [("secret-a-b", "dash"), ("secret-a-b-2", "underscore")] {
            let payload: serde_yaml::Value =
                serde_yaml::from_str(data.get(key).and_then(|v| v.as_str()).unwrap()).unwrap();
            assert_eq!(payload["stringData"]["which"].as_str(), Some(which));
        }
    }

    #[test]
    fn test_unique_key() {
        let mut taken = BTreeSet::new();
        assert_eq!(unique_key(&mut taken, "x".to_string()), "x");
        assert_eq!(unique_key(&mut taken, "x".to_string()), "x-2");
        assert_eq!(unique_key(&mut taken, "x".to_string()), "x-3");
        assert_eq!(unique_key(&mut taken, "y".to_string()), "y");
    }

    #[test]
    fn test_external_secret_gets_its_own_stream() {
        let fx = fixture(
            r#"
apiVersion: external-secrets.io/v1beta1
kind: ExternalSecret
metadata:
  name: foo
spec:
  refreshInterval: 1h
"#,
        );
        let templates = TemplateRegistry::new().unwrap();
        let settings = PackageSettings::default();
        let report = PackageWriter::new(&templates, &settings)
            .package_tool("sampletool", &fx.working, &fx.output)
            .unwrap();
        assert_eq!(names(&report), vec!["cm-sampletool-externalsecret-1.yaml"]);
        assert_eq!(report.files[0].category, ResourceCategory::ExternalSecret);
    }

    #[test]
    fn test_hooks_are_skipped() {
        let fx = fixture(
            r#"
apiVersion: batch/v1
kind: Job
metadata:
  name: pre-install
  annotations:
    helm.sh/hook: pre-install
---
apiVersion: v1
kind: Service
metadata:
  name: svc
"#,
        );
        let templates = TemplateRegistry::new().unwrap();
        let settings = PackageSettings::default();
        let report = PackageWriter::new(&templates, &settings)
            .package_tool("sampletool", &fx.working, &fx.output)
            .unwrap();
        assert_eq!(report.skipped_hooks.len(), 1);
        assert_eq!(report.objects(), 1);
        let text = std::fs::read_to_string(&report.files[0].path).unwrap();
        assert!(!text.contains("pre-install"));
    }

    #[test]
    fn test_rotation_respects_cap() {
        let mut stream = String::new();
        for i in 0..12 {
            stream.push_str(&format!(
                "---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm-{i:02}\ndata:\n  blob: {}\n",
                "x".repeat(300)
            ));
        }
        let fx = fixture(&stream);
        let templates = TemplateRegistry::new().unwrap();
        let settings = PackageSettings {
            max_file_size: 1500,
            ..Default::default()
        };
        let report = PackageWriter::new(&templates, &settings)
            .package_tool("sampletool", &fx.working, &fx.output)
            .unwrap();

        assert!(report.files.len() > 1);
        assert_eq!(report.objects(), 12);
        for (i, file) in report.files.iter().enumerate() {
            assert_eq!(file.index, i + 1);
            assert!(file.byte_size <= 1500, "{} is {} bytes", file.path.display(), file.byte_size);
            assert!(file.entries >= 1);
            // Every rotated file carries its own header
            let text = std::fs::read_to_string(&file.path).unwrap();
            assert!(text.starts_with("apiVersion: v1\nkind: ConfigMap\n"));
            assert!(text.contains(&format!("name: cm-sampletool-object-{}\n", i + 1)));
        }
    }

    #[test]
    fn test_oversized_entry_sits_alone() {
        let stream = format!(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: small\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: zbig\ndata:\n  blob: {}\n",
            "y".repeat(4000)
        );
        let fx = fixture(&stream);
        let templates = TemplateRegistry::new().unwrap();
        let settings = PackageSettings {
            max_file_size: 1000,
            ..Default::default()
        };
        let report = PackageWriter::new(&templates, &settings)
            .package_tool("sampletool", &fx.working, &fx.output)
            .unwrap();

        assert_eq!(report.files.len(), 2);
        assert_eq!(report.files[0].entries, 1);
        assert!(report.files[0].byte_size <= 1000);
        assert_eq!(report.files[1].entries, 1);
        assert!(report.files[1].byte_size > 1000);
    }

    #[test]
    fn test_no_blank_lines_in_output() {
        let fx = fixture(SAMPLE);
        let templates = TemplateRegistry::new().unwrap();
        let settings = PackageSettings::default();
        let report = PackageWriter::new(&templates, &settings)
            .package_tool("sampletool", &fx.working, &fx.output)
            .unwrap();
        for file in &report.files {
            let text = std::fs::read_to_string(&file.path).unwrap();
            assert!(text.lines().all(|l| !l.trim().is_empty()));
            assert_eq!(file.byte_size, text.len() as u64);
        }
    }

    #[test]
    fn test_entry_key() {
        assert_eq!(entry_key("Secret_my_token.yaml"), "secret-my-token");
        assert_eq!(entry_key("ClusterRole_system:aggregate.yaml"), "clusterrole-systemaggregate");
    }

    #[test]
    fn test_missing_source_dir() {
        let dir = TempDir::new().unwrap();
        let templates = TemplateRegistry::new().unwrap();
        let settings = PackageSettings::default();
        let err = PackageWriter::new(&templates, &settings)
            .package_tool("ghost", &dir.path().join("nope"), &dir.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }
}
