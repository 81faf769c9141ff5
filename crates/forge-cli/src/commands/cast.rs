//! Cast command - package smelted tools into a stack

use std::path::PathBuf;

use console::style;
use forge_core::validate_stack_name;
use forge_engine::{LATEST_STACK, StackAssembler, TemplateRegistry, publish_image};

use super::Workspace;
use crate::display;
use crate::error::{CliError, Result};

/// Run the cast command
pub async fn run(
    workspace: &Workspace,
    config: Option<&PathBuf>,
    names: &[String],
    stack: Option<&str>,
    image: Option<&str>,
    templates_dir: Option<&PathBuf>,
) -> Result<()> {
    let stack = stack.unwrap_or(LATEST_STACK);
    validate_stack_name(stack).map_err(|e| {
        CliError::config_with_help(
            e.to_string(),
            "Use lowercase letters, digits, '-' and '_' only",
        )
    })?;
    let tools = workspace.tools(config, names)?;

    display::banner("cast");
    println!(
        "{} Casting {} tool(s) into stack {}",
        style("→").blue().bold(),
        tools.len(),
        style(stack).cyan()
    );

    let templates = match templates_dir {
        Some(dir) => TemplateRegistry::with_overrides(dir)?,
        None => TemplateRegistry::new()?,
    };
    let assembler = StackAssembler::new(&workspace.layout, &workspace.settings.package, &templates);
    let report = assembler.cast(&tools, stack)?;
    display::print_cast(&report);

    if !report.packages.is_success() {
        return Err(CliError::Assembly {
            failed: report.packages.failed.len(),
            total: tools.len(),
        });
    }

    if let Some(image) = image {
        let context = workspace.layout.stacks_dir.join(stack);
        let spinner = display::spinner(format!("Building and pushing {image}"));
        let result = publish_image(image, &context).await;
        spinner.finish_and_clear();
        result?;
        println!("{} Pushed {}", style("✓").green().bold(), style(image).cyan());
    }

    println!(
        "{} Completed stack {}",
        style("✓").green().bold(),
        style(stack).cyan()
    );
    Ok(())
}
