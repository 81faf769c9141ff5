//! CLI command implementations

pub mod cast;
pub mod forge;
pub mod smelt;
pub mod tools;

use std::path::{Path, PathBuf};

use forge_core::{ForgeSettings, LayoutSettings, ToolSet};

use crate::error::Result;

/// Settings plus the layout rooted at the workspace directory
pub struct Workspace {
    pub settings: ForgeSettings,
    pub layout: LayoutSettings,
}

impl Workspace {
    /// Load `settings` (relative to `root` unless absolute) and root the layout
    pub fn load(root: &Path, settings: &Path) -> Result<Self> {
        let settings_path = if settings.is_absolute() {
            settings.to_path_buf()
        } else {
            root.join(settings)
        };
        let settings = ForgeSettings::load_or_default(&settings_path)?;
        let layout = settings.layout.rooted_at(root);
        Ok(Self { settings, layout })
    }

    /// Selected tools, expanded against the defaults and validated
    ///
    /// `names` narrows the selection; empty or `all` keeps every tool.
    pub fn tools(&self, config: Option<&PathBuf>, names: &[String]) -> Result<ToolSet> {
        let input = config.unwrap_or(&self.layout.tools_file);
        let tools = ToolSet::load(input, &self.layout.defaults_file)?;
        Ok(tools.select(names)?)
    }
}
