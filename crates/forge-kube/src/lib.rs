//! Forge Kube - deploying assembled stacks to a cluster
//!
//! - [`context`]: kubeconfig and context selection behind a [`Prompter`]
//! - [`cluster`]: the [`ClusterOps`] seam and its `kubectl` implementation
//! - [`poll`]: deadline-bounded, cancellable polling
//! - [`sequencer`]: the ordered deployment phases
//! - [`stacks`]: finding stacks to deploy
//! - [`mock`]: in-memory cluster for tests

pub mod cluster;
pub mod context;
pub mod error;
pub mod mock;
pub mod poll;
pub mod sequencer;
pub mod stacks;

pub use cluster::{ClusterOps, CrdState, KubectlCluster, WaitCondition};
pub use context::{ClusterTarget, ContextSource, NonInteractive, Prompter, resolve_target};
pub use error::{KubeError, Result};
pub use mock::{MockCluster, OperationCounts};
pub use poll::{PollStop, Poller};
pub use sequencer::{
    CrdWait, DeployObserver, DeployPhase, DeployPlan, DeployReport, DeploymentSequencer, StackFiles,
};
pub use stacks::{StackEntry, list_stacks, select_stack};
