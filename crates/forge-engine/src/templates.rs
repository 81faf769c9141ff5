//! Template registry for generated manifests
//!
//! Built once per run and handed by reference to the components that render
//! envelopes, namespaces and Argo CD applications. Built-in templates can
//! be replaced by files of the same name in an override directory.

use std::path::Path;

use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde::Serialize;

use crate::error::{EngineError, Result};

/// Header of a ConfigMap delivery envelope: `{tool, category, index, namespace}`
pub const CONFIGMAP_HEADER: &str = "configmap-header";
/// One embedded object inside an envelope: `{key, content}`
pub const CONFIGMAP_ENTRY: &str = "configmap-entry";
/// Namespace manifest: `{name}`
pub const NAMESPACE: &str = "namespace";
/// Argo CD Application for one tool: `{name, sync_wave, path, repo_url, target_revision}`
pub const APPLICATION: &str = "application";
/// Crossplane runtime config mounting every envelope: `{configmaps}`
pub const FUNCTION_TEMPLATES: &str = "function-templates";

const BUILTIN: &[(&str, &str)] = &[
    (CONFIGMAP_HEADER, include_str!("../templates/configmap-header.yaml.j2")),
    (CONFIGMAP_ENTRY, include_str!("../templates/configmap-entry.yaml.j2")),
    (NAMESPACE, include_str!("../templates/namespace.yaml.j2")),
    (APPLICATION, include_str!("../templates/application.yaml.j2")),
    (FUNCTION_TEMPLATES, include_str!("../templates/function-templates.yaml.j2")),
];

/// Named templates used by the assembly pipeline
pub struct TemplateRegistry {
    env: Environment<'static>,
}

impl TemplateRegistry {
    /// Registry with the built-in templates
    pub fn new() -> Result<Self> {
        let mut env = Self::create_environment();
        for &(name, source) in BUILTIN {
            env.add_template(name, source)?;
        }
        Ok(Self { env })
    }

    /// Built-in templates, replaced by `<dir>/<name>.yaml.j2` where present
    pub fn with_overrides(dir: &Path) -> Result<Self> {
        let mut registry = Self::new()?;
        for &(name, _) in BUILTIN {
            let path = dir.join(format!("{name}.yaml.j2"));
            if path.is_file() {
                let source = std::fs::read_to_string(&path).map_err(EngineError::io(&path))?;
                tracing::debug!(template = name, path = %path.display(), "template override");
                registry.env.add_template_owned(name.to_string(), source)?;
            }
        }
        Ok(registry)
    }

    fn create_environment() -> Environment<'static> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_keep_trailing_newline(true);
        env
    }

    /// Render a named template
    pub fn render<S: Serialize>(&self, name: &str, context: S) -> Result<String> {
        let template = self.env.get_template(name)?;
        Ok(template.render(context)?)
    }
}

/// Indent every non-empty line by `spaces`; lines are joined without a trailing newline
pub fn indent(text: &str, spaces: usize) -> String {
    let prefix = " ".repeat(spaces);
    let mut out = String::with_capacity(text.len() + spaces * text.lines().count());
    let mut first = true;
    for line in text.lines() {
        if !first {
            out.push('\n');
        }
        first = false;
        if !line.is_empty() {
            out.push_str(&prefix);
        }
        out.push_str(line);
    }
    out
}
