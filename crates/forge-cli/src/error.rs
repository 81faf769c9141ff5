//! CLI error types with exit code handling
//!
//! Every library error is mapped onto a [`CliError`] so the process exits
//! with a stable code per failure class.

use forge_core::CoreError;
use forge_engine::EngineError;
use forge_kube::KubeError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Tool configuration or settings are invalid
    #[error("Configuration error: {message}")]
    #[diagnostic(code(clusterforge::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Some tools could not be assembled
    #[error("{failed} of {total} tool(s) failed")]
    #[diagnostic(
        code(clusterforge::cli::assembly),
        help("See the errors above; the remaining tools were processed")
    )]
    Assembly { failed: usize, total: usize },

    /// Deployment stopped
    #[error("Deploy failed: {message}")]
    #[diagnostic(code(clusterforge::cli::deploy))]
    Deploy {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(clusterforge::cli::io))]
    Io { message: String },

    /// Invalid arguments
    #[error("{message}")]
    #[diagnostic(code(clusterforge::cli::usage))]
    Usage { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(clusterforge::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Assembly { .. } => exit_codes::ASSEMBLY_ERROR,
            CliError::Deploy { .. } => exit_codes::DEPLOY_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a configuration error with help text
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => e.into(),
            CoreError::ConfigNotFound { .. } => CliError::config_with_help(
                err.to_string(),
                "Create input/config.yaml or pass --config",
            ),
            CoreError::CollectionCycle { .. } => CliError::config_with_help(
                err.to_string(),
                "A collection may not include itself, directly or through another collection",
            ),
            other => CliError::config(other.to_string()),
        }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Config(e) => e.into(),
            EngineError::Io { .. } => CliError::Io {
                message: err.to_string(),
            },
            EngineError::NotSmelted { .. } => CliError::config_with_help(
                err.to_string(),
                "Run `clusterforge smelt` for this tool first",
            ),
            other => CliError::internal(other.to_string()),
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        let help = match &err {
            KubeError::NoStacks { .. } => Some("Run `clusterforge cast` to assemble a stack".to_string()),
            KubeError::PhaseFailed { source, .. } => match source.as_ref() {
                KubeError::CrdNeverAppeared { .. } | KubeError::CrdNotEstablished { .. } => Some(
                    "Check the Crossplane pods in the system namespace, or raise deploy.crd-timeout in forge.yaml"
                        .to_string(),
                ),
                _ => None,
            },
            _ => None,
        };
        CliError::Deploy {
            message: err.to_string(),
            help,
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
