//! Discovering assembled stacks

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::context::Prompter;
use crate::error::{KubeError, Result};

/// One directory under `stacks/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEntry {
    pub name: String,
    pub path: PathBuf,
    pub modified: DateTime<Local>,
}

/// Stack directories, most recently modified first
pub fn list_stacks(dir: &Path) -> Result<Vec<StackEntry>> {
    let mut stacks = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_dir() {
            continue;
        }
        stacks.push(StackEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path(),
            modified: DateTime::from(metadata.modified()?),
        });
    }
    stacks.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
    Ok(stacks)
}

/// The stack named `name`, or the operator's pick among all stacks
pub fn select_stack(dir: &Path, name: Option<&str>, prompter: &dyn Prompter) -> Result<StackEntry> {
    let mut stacks = list_stacks(dir)?;
    if let Some(name) = name {
        return stacks
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| KubeError::StackNotFound {
                name: name.to_string(),
                dir: dir.to_path_buf(),
            });
    }
    if stacks.is_empty() {
        return Err(KubeError::NoStacks {
            dir: dir.to_path_buf(),
        });
    }
    let names: Vec<String> = stacks.iter().map(|s| s.name.clone()).collect();
    let index = prompter.select("Select a stack to deploy", &names)?;
    if index >= stacks.len() {
        return Err(KubeError::Prompt(format!("no stack at index {index}")));
    }
    let stack = stacks.swap_remove(index);
    tracing::info!(stack = %stack.name, "selected stack");
    Ok(stack)
}
