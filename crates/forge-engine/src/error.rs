//! Engine error types

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::exec::CommandError;

/// Main engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("malformed YAML in document {index}: {source}")]
    Document {
        index: usize,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("object is missing '{field}' ({context})")]
    MissingField { field: &'static str, context: String },

    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error(transparent)]
    Config(#[from] forge_core::CoreError),

    #[error("tool '{tool}' has no manifest source")]
    NoSource { tool: String },

    #[error("tool '{tool}' has not been smelted ({} is missing)", .path.display())]
    NotSmelted { tool: String, path: PathBuf },
}

impl EngineError {
    /// Build a closure that attaches `path` to an I/O error
    pub fn io(path: impl AsRef<Path>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        move |source| Self::Io { path, source }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
