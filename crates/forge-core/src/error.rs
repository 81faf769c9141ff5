//! Core error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Config file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid tool '{name}': {message}")]
    InvalidTool { name: String, message: String },

    #[error("Missing required field '{field}' in tool '{name}'")]
    MissingField { name: String, field: String },

    #[error("Unknown tool '{name}' (not present in the defaults file)")]
    UnknownTool { name: String },

    #[error("Collection cycle detected: {}", .path.join(" -> "))]
    CollectionCycle { path: Vec<String> },

    #[error("Invalid stack name '{name}': only lowercase letters, digits, '-' and '_' are allowed")]
    InvalidStackName { name: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
