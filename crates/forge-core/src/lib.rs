//! Forge Core - shared types for the Cluster Forge pipelines
//!
//! This crate provides the foundational types used by the assembly and
//! deployment pipelines:
//! - `ToolConfig` / `ToolSet`: declared tools, collection expansion and validation
//! - `ResourceCategory`: delivery category derived from an object's kind
//! - `is_cluster_scoped`: static table of cluster-scoped kinds
//! - `ForgeSettings`: directory layout, package cap and deploy timings

pub mod category;
pub mod error;
pub mod scope;
pub mod settings;
pub mod tool;
pub mod toolset;

pub use category::ResourceCategory;
pub use error::{CoreError, Result};
pub use scope::is_cluster_scoped;
pub use settings::{
    DeploySettings, ForgeSettings, GitopsSettings, LayoutSettings, PackageSettings,
    validate_stack_name,
};
pub use tool::{SourceKind, ToolConfig};
pub use toolset::ToolSet;
