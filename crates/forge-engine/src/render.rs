//! Rendering a tool's source into a raw manifest stream

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use forge_core::{SourceKind, ToolConfig};
use walkdir::WalkDir;

use crate::error::{EngineError, Result};
use crate::exec::Exec;

/// Values file written by `helm show values` when a tool configures none
pub const DEFAULT_VALUES_FILE: &str = "values.yaml";

/// Turns a tool into raw multi-document YAML
#[async_trait]
pub trait SourceRenderer: Send + Sync {
    async fn render(&self, tool: &ToolConfig) -> Result<Vec<u8>>;
}

/// Renders Helm charts with `helm`, reads static manifests from the input
/// directory and downloads manifest URLs
pub struct DefaultRenderer {
    input_dir: PathBuf,
    helm: String,
    http: reqwest::Client,
}

impl DefaultRenderer {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            helm: "helm".to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Use a different `helm` binary
    pub fn with_helm(mut self, helm: impl Into<String>) -> Self {
        self.helm = helm.into();
        self
    }

    async fn render_helm(&self, tool: &ToolConfig) -> Result<Vec<u8>> {
        let chart = tool.helm_chart_name.as_deref().unwrap_or_default();
        let repo = tool.helm_url.as_deref().unwrap_or_default();
        let release = tool.helm_name.as_deref().unwrap_or_default();
        let tool_input = self.input_dir.join(&tool.name);

        let values_name = match tool.values.as_deref().filter(|v| !v.is_empty()) {
            Some(name) => name.to_string(),
            None => {
                self.fetch_default_values(tool, chart, repo, &tool_input).await?;
                DEFAULT_VALUES_FILE.to_string()
            }
        };
        let values_path = tool_input.join(values_name);

        let mut exec = Exec::new(&self.helm)
            .args(["template", release, "--repo", repo, chart, "-f"])
            .arg(&values_path)
            .arg("--include-crds")
            .env("KUBECONFIG", "")
            .log_stdout(false);
        if let Some(version) = tool.helm_version.as_deref().filter(|v| !v.is_empty()) {
            exec = exec.args(["--version", version]);
        }
        if let Some(namespace) = tool.primary_namespace() {
            exec = exec.args(["--namespace", namespace]);
        }

        Ok(exec.output().await?.stdout)
    }

    /// `helm show values` into `input/<tool>/values.yaml`
    async fn fetch_default_values(
        &self,
        tool: &ToolConfig,
        chart: &str,
        repo: &str,
        tool_input: &Path,
    ) -> Result<()> {
        let mut exec = Exec::new(&self.helm)
            .args(["show", "values", "--repo", repo, chart])
            .env("KUBECONFIG", "")
            .log_stdout(false);
        if let Some(version) = tool.helm_version.as_deref().filter(|v| !v.is_empty()) {
            exec = exec.args(["--version", version]);
        }
        let output = exec.output().await?;

        tokio::fs::create_dir_all(tool_input)
            .await
            .map_err(EngineError::io(tool_input))?;
        let path = tool_input.join(DEFAULT_VALUES_FILE);
        tokio::fs::write(&path, &output.stdout)
            .await
            .map_err(EngineError::io(&path))?;
        tracing::info!(tool = %tool.name, path = %path.display(), "wrote chart default values");
        Ok(())
    }

    /// Concatenate every listed file, or every yaml file under a listed directory
    async fn render_paths(&self, tool: &ToolConfig) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for entry in &tool.manifest_path {
            for path in yaml_files(&self.input_dir.join(entry))? {
                let content = tokio::fs::read(&path).await.map_err(EngineError::io(&path))?;
                out.extend_from_slice(b"---\n");
                out.extend_from_slice(&content);
                if !content.ends_with(b"\n") {
                    out.push(b'\n');
                }
            }
        }
        Ok(out)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let download_err = |source| EngineError::Download {
            url: url.to_string(),
            source,
        };
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(download_err)?;
        let bytes = response.bytes().await.map_err(download_err)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SourceRenderer for DefaultRenderer {
    async fn render(&self, tool: &ToolConfig) -> Result<Vec<u8>> {
        let kind = tool.source_kind().ok_or_else(|| EngineError::NoSource {
            tool: tool.name.clone(),
        })?;
        tracing::debug!(tool = %tool.name, source = ?kind, "rendering");
        match kind {
            SourceKind::HelmChart => self.render_helm(tool).await,
            SourceKind::ManifestPath => self.render_paths(tool).await,
            SourceKind::ManifestUrl => {
                let url = tool.manifest_url.as_deref().unwrap_or_default();
                self.download(url).await
            }
        }
    }
}

/// A file, or the `.yaml`/`.yml` files below a directory in name order
fn yaml_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(EngineError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "manifest path not found"),
        });
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|e| EngineError::Io {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        let is_yaml = entry
            .path()
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if entry.file_type().is_file() && is_yaml {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_manifest_paths_are_concatenated() {
        let dir = TempDir::new().unwrap();
        let tool_dir = dir.path().join("demo");
        std::fs::create_dir_all(tool_dir.join("nested")).unwrap();
        std::fs::write(tool_dir.join("a.yaml"), "kind: A\n").unwrap();
        std::fs::write(tool_dir.join("nested/b.yml"), "kind: B").unwrap();
        std::fs::write(tool_dir.join("README.md"), "not yaml").unwrap();
        std::fs::write(dir.path().join("single.yaml"), "kind: C\n").unwrap();

        let mut tool = ToolConfig::new("demo");
        tool.manifest_path = vec!["demo".to_string(), "single.yaml".to_string()];

        let out = DefaultRenderer::new(dir.path()).render(&tool).await.unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "---\nkind: A\n---\nkind: B\n---\nkind: C\n"
        );
    }

    #[tokio::test]
    async fn test_missing_manifest_path() {
        let dir = TempDir::new().unwrap();
        let mut tool = ToolConfig::new("demo");
        tool.manifest_path = vec!["missing".to_string()];
        let err = DefaultRenderer::new(dir.path()).render(&tool).await.unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }

    #[tokio::test]
    async fn test_manifest_url_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/install.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("kind: Downloaded\n"))
            .mount(&server)
            .await;

        let mut tool = ToolConfig::new("remote");
        tool.manifest_url = Some(format!("{}/install.yaml", server.uri()));

        let out = DefaultRenderer::new("input").render(&tool).await.unwrap();
        assert_eq!(out, b"kind: Downloaded\n");
    }

    #[tokio::test]
    async fn test_manifest_url_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut tool = ToolConfig::new("remote");
        tool.manifest_url = Some(format!("{}/gone.yaml", server.uri()));

        let err = DefaultRenderer::new("input").render(&tool).await.unwrap_err();
        assert!(matches!(err, EngineError::Download { .. }));
    }

    #[tokio::test]
    async fn test_tool_without_source() {
        let err = DefaultRenderer::new("input")
            .render(&ToolConfig::new("empty"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoSource { .. }));
    }
}
