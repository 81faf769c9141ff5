//! Smelt command - render and split every selected tool

use std::path::PathBuf;

use console::style;
use forge_engine::{DefaultRenderer, Smelter, TemplateRegistry};

use super::Workspace;
use crate::display;
use crate::error::{CliError, Result};

/// Run the smelt command
pub async fn run(
    workspace: &Workspace,
    config: Option<&PathBuf>,
    names: &[String],
    templates_dir: Option<&PathBuf>,
    keep_pre: bool,
) -> Result<()> {
    let tools = workspace.tools(config, names)?;
    display::banner("smelt");
    println!(
        "{} Smelting {} tool(s) into {}",
        style("→").blue().bold(),
        tools.len(),
        workspace.layout.working_dir.display()
    );

    let templates = match templates_dir {
        Some(dir) => TemplateRegistry::with_overrides(dir)?,
        None => TemplateRegistry::new()?,
    };
    let renderer = DefaultRenderer::new(workspace.layout.input_dir.clone());
    let smelter = Smelter::new(
        &workspace.layout,
        &workspace.settings.gitops,
        &templates,
        &renderer,
    )
    .keep_pre(keep_pre);

    let spinner = display::spinner("Smelting");
    let report = smelter.smelt(&tools).await;
    spinner.finish_and_clear();

    display::print_smelt(&report);
    if !report.is_success() {
        return Err(CliError::Assembly {
            failed: report.failed.len(),
            total: tools.len(),
        });
    }
    println!(
        "{} Smelted {} tool(s)",
        style("✓").green().bold(),
        report.succeeded.len()
    );
    Ok(())
}
