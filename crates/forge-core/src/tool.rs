//! Tool configuration

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CoreError, Result};

/// Sync wave used when a tool does not declare one
pub const DEFAULT_SYNC_WAVE: &str = "0";

/// A deployable unit: one Helm chart, one manifest set, or one manifest URL
///
/// Field names follow the kebab-case keys of the tools file
/// (`helm-chart-name`, `manifest-url`, ...). A tool with a non-empty
/// `collection` is a named group of other tools and carries no source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ToolConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm_chart_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm_url: Option<String>,

    /// Release name passed to `helm template`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm_version: Option<String>,

    /// Values file name, relative to `input/<tool>/`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_url: Option<String>,

    /// Static manifests, relative to the input directory
    #[serde(default, rename = "manifestpath", skip_serializing_if = "Vec::is_empty")]
    pub manifest_path: Vec<String>,

    #[serde(
        default,
        rename = "syncwave",
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub sync_wave: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collection: Vec<String>,
}

/// Where a tool's manifests come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    HelmChart,
    ManifestPath,
    ManifestUrl,
}

impl ToolConfig {
    /// Create a bare tool with just a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Whether this entry is a collection of other tools
    pub fn is_collection(&self) -> bool {
        !self.collection.is_empty()
    }

    /// Default namespace: first of `namespaces`, else `namespace`
    pub fn primary_namespace(&self) -> Option<&str> {
        self.namespaces
            .iter()
            .map(String::as_str)
            .find(|ns| !ns.is_empty())
            .or_else(|| non_empty(&self.namespace))
    }

    /// Every namespace the tool declares, deduplicated, in declaration order
    pub fn declared_namespaces(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        let all = self
            .namespaces
            .iter()
            .map(String::as_str)
            .chain(non_empty(&self.namespace));
        for ns in all {
            if !ns.is_empty() && !out.contains(&ns) {
                out.push(ns);
            }
        }
        out
    }

    /// Source of the tool's manifests
    ///
    /// A Helm chart wins over static manifests, which win over a URL.
    pub fn source_kind(&self) -> Option<SourceKind> {
        if non_empty(&self.helm_chart_name).is_some() {
            Some(SourceKind::HelmChart)
        } else if !self.manifest_path.is_empty() {
            Some(SourceKind::ManifestPath)
        } else if non_empty(&self.manifest_url).is_some() {
            Some(SourceKind::ManifestUrl)
        } else {
            None
        }
    }

    /// Sync wave annotation value, `"0"` when unset
    pub fn sync_wave(&self) -> &str {
        non_empty(&self.sync_wave).unwrap_or(DEFAULT_SYNC_WAVE)
    }

    /// Overlay every non-empty field of `input` onto this config
    pub fn merge_overrides(&mut self, input: &ToolConfig) {
        fn overlay(base: &mut Option<String>, input: &Option<String>) {
            if let Some(v) = non_empty(input) {
                *base = Some(v.to_string());
            }
        }
        fn overlay_list(base: &mut Vec<String>, input: &[String]) {
            if !input.is_empty() {
                *base = input.to_vec();
            }
        }

        overlay(&mut self.namespace, &input.namespace);
        overlay_list(&mut self.namespaces, &input.namespaces);
        overlay(&mut self.helm_chart_name, &input.helm_chart_name);
        overlay(&mut self.helm_url, &input.helm_url);
        overlay(&mut self.helm_name, &input.helm_name);
        overlay(&mut self.helm_version, &input.helm_version);
        overlay(&mut self.values, &input.values);
        overlay(&mut self.manifest_url, &input.manifest_url);
        overlay_list(&mut self.manifest_path, &input.manifest_path);
        overlay(&mut self.sync_wave, &input.sync_wave);
        overlay_list(&mut self.collection, &input.collection);
    }

    /// Check required fields
    ///
    /// Collections only need a name. Every other tool needs a source and a
    /// namespace; Helm charts also need a release name and a repository.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(CoreError::InvalidTool {
                name: "<unnamed>".to_string(),
                message: "missing 'name'".to_string(),
            });
        }
        if self.is_collection() {
            return Ok(());
        }

        let Some(kind) = self.source_kind() else {
            return Err(CoreError::InvalidTool {
                name: self.name.clone(),
                message: "either 'manifest-url', 'helm-chart-name' or 'manifestpath' must be provided"
                    .to_string(),
            });
        };

        if self.primary_namespace().is_none() {
            return Err(CoreError::MissingField {
                name: self.name.clone(),
                field: "namespace".to_string(),
            });
        }

        if kind == SourceKind::HelmChart {
            if non_empty(&self.helm_name).is_none() {
                return Err(CoreError::MissingField {
                    name: self.name.clone(),
                    field: "helm-name".to_string(),
                });
            }
            if non_empty(&self.helm_url).is_none() {
                return Err(CoreError::MissingField {
                    name: self.name.clone(),
                    field: "helm-url".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// `Some(s)` when the option holds a non-empty string
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Accept `syncwave: 2` as well as `syncwave: "2"`
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wave {
        Text(String),
        Int(i64),
    }

    Ok(Option::<Wave>::deserialize(deserializer)?.map(|w| match w {
        Wave::Text(s) => s,
        Wave::Int(n) => n.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn helm_tool() -> ToolConfig {
        serde_yaml::from_str(
            r#"
name: cert-manager
helm-chart-name: cert-manager
helm-url: https://charts.jetstack.io
helm-name: cert-manager
helm-version: v1.16.1
namespace: cert-manager
values: values_cf.yaml
syncwave: -2
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_deserialize_kebab_keys() {
        let tool = helm_tool();
        assert_eq!(tool.helm_chart_name.as_deref(), Some("cert-manager"));
        assert_eq!(tool.helm_version.as_deref(), Some("v1.16.1"));
        assert_eq!(tool.values.as_deref(), Some("values_cf.yaml"));
        assert_eq!(tool.sync_wave(), "-2");
        assert_eq!(tool.source_kind(), Some(SourceKind::HelmChart));
    }

    #[test]
    fn test_manifest_path_list() {
        let tool: ToolConfig = serde_yaml::from_str(
            r#"
name: kyverno-policies
namespace: kyverno
manifestpath:
  - kyverno-policies/base
  - kyverno-policies/extra.yaml
"#,
        )
        .unwrap();
        assert_eq!(tool.manifest_path.len(), 2);
        assert_eq!(tool.source_kind(), Some(SourceKind::ManifestPath));
        assert_eq!(tool.sync_wave(), DEFAULT_SYNC_WAVE);
        assert!(tool.validate().is_ok());
    }

    #[test]
    fn test_primary_namespace_prefers_list() {
        let mut tool = ToolConfig::new("monitoring");
        tool.namespace = Some("fallback".to_string());
        assert_eq!(tool.primary_namespace(), Some("fallback"));

        tool.namespaces = vec!["monitoring".to_string(), "grafana".to_string()];
        assert_eq!(tool.primary_namespace(), Some("monitoring"));
        assert_eq!(
            tool.declared_namespaces(),
            vec!["monitoring", "grafana", "fallback"]
        );
    }

    #[test]
    fn test_empty_namespace_is_absent() {
        let mut tool = ToolConfig::new("x");
        tool.namespace = Some(String::new());
        assert_eq!(tool.primary_namespace(), None);
    }

    #[test]
    fn test_validate_requires_source() {
        let tool = ToolConfig::new("nothing");
        let err = tool.validate().unwrap_err();
        assert!(err.to_string().contains("manifest-url"));
    }

    #[test]
    fn test_validate_helm_requires_namespace() {
        let mut tool = helm_tool();
        tool.namespace = None;
        match tool.validate() {
            Err(CoreError::MissingField { field, .. }) => assert_eq!(field, "namespace"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_validate_manifest_tool_requires_namespace() {
        let mut tool = ToolConfig::new("plain");
        tool.manifest_path = vec!["plain".to_string()];
        match tool.validate() {
            Err(CoreError::MissingField { field, .. }) => assert_eq!(field, "namespace"),
            other => panic!("unexpected: {:?}", other),
        }

        tool.namespaces = vec!["plain".to_string()];
        assert!(tool.validate().is_ok());
    }

    #[test]
    fn test_validate_helm_requires_helm_name() {
        let mut tool = helm_tool();
        tool.helm_name = Some(String::new());
        match tool.validate() {
            Err(CoreError::MissingField { field, .. }) => assert_eq!(field, "helm-name"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_collection_only_needs_name() {
        let mut tool = ToolConfig::new("base");
        tool.collection = vec!["a".to_string()];
        assert!(tool.validate().is_ok());
    }

    #[test]
    fn test_merge_overrides_skips_empty() {
        let mut base = helm_tool();
        let mut input = ToolConfig::new("cert-manager");
        input.namespace = Some("certs".to_string());
        input.helm_version = Some(String::new());

        base.merge_overrides(&input);
        assert_eq!(base.namespace.as_deref(), Some("certs"));
        assert_eq!(base.helm_version.as_deref(), Some("v1.16.1"));
        assert_eq!(base.helm_url.as_deref(), Some("https://charts.jetstack.io"));
    }
}
