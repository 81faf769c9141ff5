//! Error types for forge-kube

use std::path::PathBuf;
use std::time::Duration;

use forge_engine::CommandError;
use thiserror::Error;

use crate::sequencer::DeployPhase;

/// Result type for forge-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while selecting a cluster or deploying to it
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Kubeconfig could not be read or turned into a client config
    #[error("kubeconfig error: {0}")]
    Kubeconfig(String),

    /// Kubeconfig has no contexts to choose from
    #[error("kubeconfig {} defines no contexts", .path.display())]
    NoContexts { path: PathBuf },

    /// Requested context is not in the kubeconfig
    #[error("context '{name}' not found in {}", .path.display())]
    ContextNotFound { name: String, path: PathBuf },

    /// Interactive prompt failed or was aborted
    #[error("prompt failed: {0}")]
    Prompt(String),

    /// kubectl (or another tool) failed
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Required CRD was never created
    #[error("CRD {name} did not appear within {waited:?}")]
    CrdNeverAppeared { name: String, waited: Duration },

    /// Required CRD exists but never became Established
    #[error("CRD {name} exists but was not Established within {waited:?}")]
    CrdNotEstablished { name: String, waited: Duration },

    /// Waiting was interrupted
    #[error("cancelled")]
    Cancelled,

    /// A deployment phase failed; later phases were not run
    #[error("deployment failed during {phase}: {source}")]
    PhaseFailed {
        phase: DeployPhase,
        #[source]
        source: Box<KubeError>,
    },

    /// Stack directory lacks a file the plan applies
    #[error("stack file not found: {}", .path.display())]
    MissingStackFile { path: PathBuf },

    /// No stack to deploy
    #[error("no stacks found in {}\nHint: Run `clusterforge cast` first", .dir.display())]
    NoStacks { dir: PathBuf },

    /// Named stack does not exist
    #[error("stack '{name}' not found in {}", .dir.display())]
    StackNotFound { name: String, dir: PathBuf },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<kube::config::KubeconfigError> for KubeError {
    fn from(e: kube::config::KubeconfigError) -> Self {
        KubeError::Kubeconfig(e.to_string())
    }
}

impl From<kube::config::InClusterError> for KubeError {
    fn from(e: kube::config::InClusterError) -> Self {
        KubeError::Kubeconfig(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// Phase that failed, if this came out of the sequencer
    pub fn phase(&self) -> Option<DeployPhase> {
        match self {
            KubeError::PhaseFailed { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Wrap as a failure of `phase`
    pub(crate) fn in_phase(self, phase: DeployPhase) -> Self {
        match self {
            already @ KubeError::PhaseFailed { .. } => already,
            other => KubeError::PhaseFailed {
                phase,
                source: Box::new(other),
            },
        }
    }
}
