//! Forge command - deploy a stack to a cluster

use std::path::PathBuf;

use console::style;
use forge_kube::{
    ContextSource, DeployPlan, DeploymentSequencer, KubectlCluster, Prompter, select_stack,
};
use tokio_util::sync::CancellationToken;

use super::Workspace;
use crate::display::{self, PhaseSpinner};
use crate::error::{CliError, Result};

/// Run the forge command
pub async fn run(
    workspace: &Workspace,
    stack: Option<&str>,
    kubeconfig: Option<PathBuf>,
    context: Option<String>,
    prompter: &dyn Prompter,
    cancel: CancellationToken,
) -> Result<()> {
    display::banner("forge");

    let mut source = ContextSource::from_env().with_context(context);
    if let Some(path) = kubeconfig {
        if !path.is_file() {
            return Err(CliError::usage(format!(
                "kubeconfig not found: {}",
                path.display()
            )));
        }
        source.env_kubeconfig = None;
        source.default_kubeconfig = Some(path);
    }

    let plan = DeployPlan::from(&workspace.settings.deploy);
    let sequencer = DeploymentSequencer::new(&plan).with_cancellation(cancel);

    let target = sequencer.select_context(&source, prompter).await?;
    let stack = select_stack(&workspace.layout.stacks_dir, stack, prompter)?;

    let question = format!("Deploy stack '{}' to {}?", stack.name, target.describe());
    if !prompter.confirm(&question, true)? {
        println!("{} Aborted", style("✗").yellow());
        return Ok(());
    }
    println!(
        "{} Deploying {} to {}",
        style("→").blue().bold(),
        style(&stack.name).cyan(),
        style(target.describe()).cyan()
    );

    let cluster = KubectlCluster::connect(&target).await?;
    let spinner = PhaseSpinner::new();
    let result = sequencer
        .with_observer(&spinner)
        .deploy(&cluster, &stack.path)
        .await;
    spinner.finish();

    let report = result?;
    display::print_deploy(&report);
    println!("{} Deployment complete", style("✓").green().bold());
    Ok(())
}
