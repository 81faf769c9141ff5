//! Display formatting for CLI output

use std::io::IsTerminal;
use std::time::Duration;

use console::style;
use forge_engine::{AssemblyReport, CastReport, ToolSummary};
use forge_kube::{DeployObserver, DeployPhase, DeployReport};
use indicatif::{ProgressBar, ProgressStyle};

pub fn banner(action: &str) {
    println!("{} {}", style("Cluster Forge").bold().magenta(), style(action).dim());
}

/// Spinner on a terminal, hidden otherwise
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    if !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub fn print_failures<T>(report: &AssemblyReport<T>) {
    for failure in &report.failed {
        println!(
            "  {} {}: {}",
            style("✗").red().bold(),
            style(&failure.tool).cyan(),
            failure.error
        );
    }
}

pub fn print_smelt(report: &AssemblyReport<ToolSummary>) {
    for tool in &report.succeeded {
        let mut details = format!("{} object(s)", tool.objects);
        if tool.crds_cleaned > 0 {
            details.push_str(&format!(", {} CRD(s) trimmed", tool.crds_cleaned));
        }
        if !tool.namespaces_added.is_empty() {
            details.push_str(&format!(", added namespace {}", tool.namespaces_added.join(", ")));
        }
        println!("  {} {} {}", style("✓").green().bold(), style(&tool.tool).cyan(), style(details).dim());
    }
    print_failures(report);
}

pub fn print_cast(report: &CastReport) {
    for package in &report.packages.succeeded {
        println!(
            "  {} {} {}",
            style("✓").green().bold(),
            style(&package.tool).cyan(),
            style(format!(
                "{} file(s), {} object(s)",
                package.files.len(),
                package.objects()
            ))
            .dim()
        );
        for file in &package.files {
            let name = file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            println!("      {} {}", name, style(format!("{} bytes", file.byte_size)).dim());
        }
        if !package.skipped_hooks.is_empty() {
            println!(
                "      {} skipped {} hook(s)",
                style("⚠").yellow(),
                package.skipped_hooks.len()
            );
        }
    }
    print_failures(&report.packages);
    if report.namespaces_dropped > 0 {
        println!(
            "  {} dropped {} duplicate or built-in namespace(s)",
            style("→").blue(),
            report.namespaces_dropped
        );
    }
    for dir in &report.stack_dirs {
        println!("  {} {}", style("→").blue(), dir.display());
    }
}

pub fn print_deploy(report: &DeployReport) {
    for crd in &report.crds {
        println!(
            "  {} {} {}",
            style("✓").green().bold(),
            crd.name,
            style(format!("after {} check(s)", crd.checks)).dim()
        );
    }
    println!(
        "{} Applied {} file(s)",
        style("✓").green().bold(),
        report.applied.len()
    );
}

/// Shows the running phase as a spinner
pub struct PhaseSpinner {
    pb: ProgressBar,
}

impl PhaseSpinner {
    pub fn new() -> Self {
        Self { pb: spinner("Starting") }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl DeployObserver for PhaseSpinner {
    fn phase_started(&self, phase: DeployPhase) {
        self.pb.set_message(phase.to_string());
    }

    fn phase_finished(&self, phase: DeployPhase) {
        self.pb
            .println(format!("  {} {}", style("✓").green().bold(), phase));
    }
}
