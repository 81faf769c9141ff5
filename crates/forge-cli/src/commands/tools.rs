//! Tools command - show the resolved tool selection

use std::path::PathBuf;

use console::style;
use forge_core::{SourceKind, ToolConfig};

use super::Workspace;
use crate::error::Result;

/// Run the tools command
pub fn run(workspace: &Workspace, config: Option<&PathBuf>, names: &[String]) -> Result<()> {
    let tools = workspace.tools(config, names)?;
    if tools.is_empty() {
        println!("{}", style("No tools selected").dim());
        return Ok(());
    }

    println!("{} tool(s):", style(tools.len()).bold());
    for tool in &tools {
        println!(
            "  {} {} {} {}",
            style("•").dim(),
            style(&tool.name).cyan(),
            source_label(tool),
            style(format!(
                "[{}] wave {}",
                tool.declared_namespaces().join(", "),
                tool.sync_wave()
            ))
            .dim()
        );
    }
    Ok(())
}

fn source_label(tool: &ToolConfig) -> String {
    match tool.source_kind() {
        Some(SourceKind::HelmChart) => format!(
            "helm:{}@{}",
            tool.helm_chart_name.as_deref().unwrap_or_default(),
            tool.helm_version.as_deref().unwrap_or("latest")
        ),
        Some(SourceKind::ManifestPath) => format!("manifests:{}", tool.manifest_path.join(",")),
        Some(SourceKind::ManifestUrl) => {
            format!("url:{}", tool.manifest_url.as_deref().unwrap_or_default())
        }
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_label() {
        let mut tool = ToolConfig::new("cert-manager");
        tool.helm_chart_name = Some("cert-manager".into());
        tool.helm_version = Some("v1.14.0".into());
        assert_eq!(source_label(&tool), "helm:cert-manager@v1.14.0");

        let mut tool = ToolConfig::new("crds");
        tool.manifest_path = vec!["crds/a.yaml".into(), "crds/b.yaml".into()];
        assert_eq!(source_label(&tool), "manifests:crds/a.yaml,crds/b.yaml");

        assert_eq!(source_label(&ToolConfig::new("bare")), "-");
    }
}
