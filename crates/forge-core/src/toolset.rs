//! Tool set loading: defaults, selections, collection expansion
//!
//! A run starts from two tools files: the defaults (every tool the platform
//! knows about) and the input (the tools selected for this run, optionally
//! overriding default fields). Loading resolves the input against the
//! defaults in three steps:
//!
//! 1. expand collections recursively into their member tools
//! 2. overlay the non-empty input fields on the default config
//! 3. validate every resulting tool

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::tool::ToolConfig;

/// Ordered map of tool name to configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolSet {
    tools: BTreeMap<String, ToolConfig>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a tools file (a YAML list of tool configs)
    pub fn from_yaml(content: &str) -> Result<Self> {
        let configs: Vec<ToolConfig> = serde_yaml::from_str(content)?;
        Ok(configs.into_iter().collect())
    }

    /// Load a tools file from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load the input file against the defaults file and resolve it
    ///
    /// A missing defaults file counts as empty.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(input: P, defaults: Q) -> Result<Self> {
        let defaults = match defaults.as_ref() {
            path if path.exists() => Self::from_file(path)?,
            _ => Self::new(),
        };
        let inputs = Self::from_file(input)?;
        Self::resolve(&inputs, &defaults)
    }

    /// Expand, merge and validate `inputs` against `defaults`
    pub fn resolve(inputs: &ToolSet, defaults: &ToolSet) -> Result<Self> {
        let mut resolved = inputs.expand(defaults)?;
        for (name, config) in resolved.tools.iter_mut() {
            if let Some(input) = inputs.get(name) {
                config.merge_overrides(input);
            }
        }
        resolved.validate()?;
        tracing::debug!(tools = resolved.len(), "resolved tool set");
        Ok(resolved)
    }

    /// Replace every selection by its default config, expanding collections
    ///
    /// Selections with no default entry are kept as declared. Collection
    /// members must exist in the defaults. A collection that reaches itself
    /// is rejected with [`CoreError::CollectionCycle`].
    pub fn expand(&self, defaults: &ToolSet) -> Result<Self> {
        let mut out = ToolSet::new();
        for (name, config) in &self.tools {
            match defaults.get(name) {
                Some(default) => {
                    let mut path = Vec::new();
                    expand_into(default, defaults, &mut path, &mut out)?;
                }
                None => out.insert(config.clone()),
            }
        }
        Ok(out)
    }

    /// Keep only the named tools; `all` keeps everything
    pub fn select(&self, names: &[String]) -> Result<Self> {
        if names.is_empty() || names.iter().any(|n| n == "all") {
            return Ok(self.clone());
        }
        names
            .iter()
            .map(|name| {
                self.get(name)
                    .cloned()
                    .ok_or_else(|| CoreError::UnknownTool { name: name.clone() })
            })
            .collect()
    }

    /// Validate every tool
    pub fn validate(&self) -> Result<()> {
        self.tools.values().try_for_each(ToolConfig::validate)
    }

    pub fn insert(&mut self, config: ToolConfig) {
        self.tools.insert(config.name.clone(), config);
    }

    pub fn get(&self, name: &str) -> Option<&ToolConfig> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolConfig> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn expand_into(
    config: &ToolConfig,
    defaults: &ToolSet,
    path: &mut Vec<String>,
    out: &mut ToolSet,
) -> Result<()> {
    if path.contains(&config.name) {
        let mut cycle = path.clone();
        cycle.push(config.name.clone());
        return Err(CoreError::CollectionCycle { path: cycle });
    }
    if !config.is_collection() {
        out.insert(config.clone());
        return Ok(());
    }

    path.push(config.name.clone());
    for member in &config.collection {
        let member_config = defaults
            .get(member)
            .ok_or_else(|| CoreError::UnknownTool {
                name: member.clone(),
            })?;
        expand_into(member_config, defaults, path, out)?;
    }
    path.pop();
    Ok(())
}

impl FromIterator<ToolConfig> for ToolSet {
    fn from_iter<I: IntoIterator<Item = ToolConfig>>(iter: I) -> Self {
        let mut set = ToolSet::new();
        for config in iter {
            set.insert(config);
        }
        set
    }
}

impl<'a> IntoIterator for &'a ToolSet {
    type Item = &'a ToolConfig;
    type IntoIter = std::collections::btree_map::Values<'a, String, ToolConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.tools.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const DEFAULTS: &str = r#"
- name: test1
  manifest-url: https://test1.yaml
  namespace: defaultnamespace
- name: test2
  manifest-url: https://test2.yaml
  namespace: test2
- name: test3
  helm-chart-name: test3
  helm-url: https://charts.example.com
  helm-name: test3
  namespace: test3
- name: group
  collection:
    - test2
    - test3
- name: everything
  collection:
    - test1
    - group
"#;

    fn defaults() -> ToolSet {
        ToolSet::from_yaml(DEFAULTS).unwrap()
    }

    #[test]
    fn test_single_tool_merges_input_over_defaults() {
        let inputs = ToolSet::from_yaml(
            r#"
- name: test1
  namespace: testnamespace
"#,
        )
        .unwrap();

        let result = ToolSet::resolve(&inputs, &defaults()).unwrap();
        assert_eq!(result.len(), 1);
        let tool = result.get("test1").unwrap();
        assert_eq!(tool.namespace.as_deref(), Some("testnamespace"));
        assert_eq!(tool.manifest_url.as_deref(), Some("https://test1.yaml"));
    }

    #[test]
    fn test_collection_expands_transitively() {
        let inputs = ToolSet::from_yaml("- name: everything\n").unwrap();
        let result = ToolSet::resolve(&inputs, &defaults()).unwrap();

        let names: Vec<_> = result.names().collect();
        assert_eq!(names, vec!["test1", "test2", "test3"]);
        assert!(!result.contains("group"));
    }

    #[test]
    fn test_explicit_values_survive_collection_expansion() {
        let inputs = ToolSet::from_yaml(
            r#"
- name: group
- name: test2
  namespace: custom
"#,
        )
        .unwrap();
        let result = ToolSet::resolve(&inputs, &defaults()).unwrap();
        assert_eq!(result.get("test2").unwrap().namespace.as_deref(), Some("custom"));
        assert_eq!(result.get("test3").unwrap().namespace.as_deref(), Some("test3"));
    }

    #[test]
    fn test_tool_without_default_is_kept() {
        let inputs = ToolSet::from_yaml(
            r#"
- name: local
  namespace: local
  manifestpath: [local/manifest.yaml]
"#,
        )
        .unwrap();
        let result = ToolSet::resolve(&inputs, &defaults()).unwrap();
        assert!(result.contains("local"));
    }

    #[test]
    fn test_collection_cycle_is_rejected() {
        let defaults = ToolSet::from_yaml(
            r#"
- name: a
  collection: [b]
- name: b
  collection: [c]
- name: c
  collection: [a]
"#,
        )
        .unwrap();
        let inputs = ToolSet::from_yaml("- name: a\n").unwrap();

        match ToolSet::resolve(&inputs, &defaults) {
            Err(CoreError::CollectionCycle { path }) => {
                assert_eq!(path, vec!["a", "b", "c", "a"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_collection_member() {
        let defaults = ToolSet::from_yaml("- name: g\n  collection: [missing]\n").unwrap();
        let inputs = ToolSet::from_yaml("- name: g\n").unwrap();
        assert!(matches!(
            ToolSet::resolve(&inputs, &defaults),
            Err(CoreError::UnknownTool { name }) if name == "missing"
        ));
    }

    #[test]
    fn test_validation_runs_after_merge() {
        let inputs = ToolSet::from_yaml("- name: orphan\n").unwrap();
        assert!(matches!(
            ToolSet::resolve(&inputs, &defaults()),
            Err(CoreError::InvalidTool { .. })
        ));
    }

    #[test]
    fn test_select() {
        let set = defaults();
        let picked = set.select(&["test1".to_string()]).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(set.select(&["all".to_string()]).unwrap().len(), set.len());
        assert!(set.select(&["nope".to_string()]).is_err());
    }

    #[test]
    fn test_load_from_files() {
        let mut defaults_file = NamedTempFile::new().unwrap();
        defaults_file.write_all(DEFAULTS.as_bytes()).unwrap();
        let mut input_file = NamedTempFile::new().unwrap();
        input_file.write_all(b"- name: test3\n").unwrap();

        let set = ToolSet::load(input_file.path(), defaults_file.path()).unwrap();
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["test3"]);
    }

    #[test]
    fn test_load_without_defaults() {
        let mut input_file = NamedTempFile::new().unwrap();
        input_file
            .write_all(b"- name: local\n  namespace: local\n  manifestpath: [local/]\n")
            .unwrap();

        let set = ToolSet::load(input_file.path(), "/nonexistent/default.yaml").unwrap();
        assert!(set.contains("local"));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ToolSet::from_file("/nonexistent/tools.yaml"),
            Err(CoreError::ConfigNotFound { .. })
        ));
    }
}
