//! Cluster Forge CLI - assemble tool manifests into stacks and deploy them

use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use forge_kube::{NonInteractive, Prompter};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

mod commands;
mod display;
mod error;
mod exit_codes;
mod prompt;

use commands::Workspace;
use error::{CliError, Result};

#[derive(Parser)]
#[command(name = "clusterforge")]
#[command(version)]
#[command(about = "Assemble Helm charts and manifests into stacks and deploy them", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace root holding input/, working/, output/ and stacks/
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Settings file, relative to the root
    #[arg(long, global = true, env = "FORGE_SETTINGS", default_value = "forge.yaml")]
    settings: PathBuf,

    /// Also append logs to logs/<name>
    #[arg(long, global = true, env = "LOG_NAME")]
    log_file: Option<String>,

    /// Never prompt; take defaults and first choices
    #[arg(long, global = true)]
    non_interactive: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render every selected tool and split it into per-object files
    Smelt {
        /// Tool names to smelt (default: all)
        tools: Vec<String>,

        /// Tools file (default: from settings)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory with template overrides
        #[arg(long)]
        templates: Option<PathBuf>,

        /// Keep the rendered streams under working/pre
        #[arg(long)]
        keep_pre: bool,
    },

    /// Package smelted tools into delivery files and a named stack
    Cast {
        /// Tool names to cast (default: all)
        tools: Vec<String>,

        /// Tools file (default: from settings)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Stack name
        #[arg(short, long)]
        stack: Option<String>,

        /// Build and push the stack as this container image
        #[arg(long)]
        image: Option<String>,

        /// Directory with template overrides
        #[arg(long)]
        templates: Option<PathBuf>,
    },

    /// Deploy a stack to a cluster
    Forge {
        /// Stack to deploy (prompted when omitted)
        #[arg(short, long)]
        stack: Option<String>,

        /// Kubeconfig file, skips the KUBECONFIG confirmation
        #[arg(long)]
        kubeconfig: Option<PathBuf>,

        /// Kubernetes context to use
        #[arg(long)]
        context: Option<String>,
    },

    /// Show the resolved tool selection
    Tools {
        /// Tool names to show (default: all)
        tools: Vec<String>,

        /// Tools file (default: from settings)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    miette::set_panic_hook();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_tracing(&cli.root, cli.log_file.as_deref())?;
    let workspace = Workspace::load(&cli.root, &cli.settings)?;

    let non_interactive = cli.non_interactive;
    let command = cli.command;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        match command {
            Commands::Smelt {
                tools,
                config,
                templates,
                keep_pre,
            } => {
                commands::smelt::run(
                    &workspace,
                    config.as_ref(),
                    &tools,
                    templates.as_ref(),
                    keep_pre,
                )
                .await
            }

            Commands::Cast {
                tools,
                config,
                stack,
                image,
                templates,
            } => {
                commands::cast::run(
                    &workspace,
                    config.as_ref(),
                    &tools,
                    stack.as_deref(),
                    image.as_deref(),
                    templates.as_ref(),
                )
                .await
            }

            Commands::Forge {
                stack,
                kubeconfig,
                context,
            } => {
                let prompter: Box<dyn Prompter> = if non_interactive {
                    Box::new(NonInteractive)
                } else {
                    Box::new(prompt::TerminalPrompter::new())
                };
                commands::forge::run(
                    &workspace,
                    stack.as_deref(),
                    kubeconfig,
                    context,
                    prompter.as_ref(),
                    interrupt_token(),
                )
                .await
            }

            Commands::Tools { tools, config } => {
                commands::tools::run(&workspace, config.as_ref(), &tools)
            }
        }
    })
}

/// Token cancelled on Ctrl-C
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling deployment");
            token.cancel();
        }
    });
    cancel
}

/// Log to stderr filtered by `LOG_LEVEL` (or `RUST_LOG`), optionally also to `logs/<name>`
fn init_tracing(root: &Path, log_file: Option<&str>) -> Result<()> {
    let directives = std::env::var("LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::from_str(&directives).unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true);

    let file_layer = match log_file {
        Some(name) => {
            if name.is_empty() || Path::new(name).components().count() != 1 {
                return Err(CliError::usage(format!("invalid log file name: '{name}'")));
            }
            let dir = root.join("logs");
            std::fs::create_dir_all(&dir)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(name))?;
            Some(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}
