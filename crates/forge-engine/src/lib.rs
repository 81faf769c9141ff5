//! Forge Engine - manifest assembly for Cluster Forge
//!
//! The engine turns each tool's rendered manifest stream into delivery files:
//!
//! ```text
//! render ─▶ split ─▶ classify ─▶ working/<tool>/<Kind>_<Name>.yaml ─▶ package ─▶ output/
//! ```
//!
//! - [`splitter`]: multi-document YAML into cleaned documents
//! - [`classifier`]: namespace settlement and per-object files
//! - [`package`]: size-capped, category-specific delivery files
//! - [`smelt`] and [`stack`]: the per-tool pipelines behind `smelt` and `cast`

pub mod classifier;
pub mod error;
pub mod exec;
pub mod node;
pub mod object;
pub mod package;
pub mod render;
pub mod smelt;
pub mod splitter;
pub mod stack;
pub mod templates;

pub use classifier::ResourceClassifier;
pub use error::{EngineError, Result};
pub use exec::{CommandError, CommandOutput, Exec};
pub use object::K8sObject;
pub use package::{PackageReport, PackageWriter, PackagedFile};
pub use render::{DefaultRenderer, SourceRenderer};
pub use smelt::{AssemblyReport, Smelter, ToolFailure, ToolSummary};
pub use splitter::{ManifestDocument, split};
pub use stack::{CastReport, FUNCTION_TEMPLATES_FILE, LATEST_STACK, StackAssembler, publish_image};
pub use templates::TemplateRegistry;
