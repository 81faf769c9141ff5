//! In-memory cluster for testing
//!
//! Records every call, answers CRD checks from a per-CRD script and can be
//! told to fail specific operations.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use forge_engine::CommandError;

use crate::cluster::{ClusterOps, CrdState, WaitCondition};
use crate::error::{KubeError, Result};

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Apply(PathBuf),
    CrdState(String),
    Wait(String),
    DeletePods(String),
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone)]
pub struct OperationCounts {
    pub applies: usize,
    pub crd_checks: usize,
    pub waits: usize,
    pub deletes: usize,
}

/// In-memory [`ClusterOps`]
#[derive(Clone, Default)]
pub struct MockCluster {
    /// CRD name -> states returned by successive checks; the last one repeats
    crds: Arc<RwLock<HashMap<String, VecDeque<CrdState>>>>,
    /// Applied file names, waited resources or namespaces that fail
    failures: Arc<RwLock<HashSet<String>>>,
    operations: Arc<RwLock<Vec<Operation>>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the states a CRD reports, one per check
    pub fn with_crd(self, name: &str, states: impl IntoIterator<Item = CrdState>) -> Self {
        self.crds
            .write()
            .unwrap()
            .insert(name.to_string(), states.into_iter().collect());
        self
    }

    /// Make the operation on `target` fail (a file name, wait resource or namespace)
    pub fn failing(self, target: &str) -> Self {
        self.failures.write().unwrap().insert(target.to_string());
        self
    }

    /// Every call in order
    pub fn operations(&self) -> Vec<Operation> {
        self.operations.read().unwrap().clone()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        let mut counts = OperationCounts::default();
        for op in self.operations.read().unwrap().iter() {
            match op {
                Operation::Apply(_) => counts.applies += 1,
                Operation::CrdState(_) => counts.crd_checks += 1,
                Operation::Wait(_) => counts.waits += 1,
                Operation::DeletePods(_) => counts.deletes += 1,
            }
        }
        counts
    }

    /// How many times a CRD was checked
    pub fn crd_checks(&self, name: &str) -> usize {
        self.operations
            .read()
            .unwrap()
            .iter()
            .filter(|op| matches!(op, Operation::CrdState(n) if n == name))
            .count()
    }

    /// File names applied, in order
    pub fn applied(&self) -> Vec<String> {
        self.operations
            .read()
            .unwrap()
            .iter()
            .filter_map(|op| match op {
                Operation::Apply(path) => path.file_name().map(|n| n.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, op: Operation) {
        self.operations.write().unwrap().push(op);
    }

    fn check(&self, target: &str, command: &str) -> Result<()> {
        if self.failures.read().unwrap().contains(target) {
            return Err(KubeError::Command(CommandError::Failed {
                command: command.to_string(),
                status: "exit status: 1".to_string(),
                stdout: String::new(),
                stderr: format!("mock failure for {target}"),
            }));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterOps for MockCluster {
    async fn apply(&self, manifest: &Path) -> Result<()> {
        self.record(Operation::Apply(manifest.to_path_buf()));
        let name = manifest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.check(&name, &format!("kubectl apply -f {}", manifest.display()))
    }

    async fn crd_state(&self, name: &str) -> Result<CrdState> {
        self.record(Operation::CrdState(name.to_string()));
        let mut crds = self.crds.write().unwrap();
        let state = match crds.get_mut(name) {
            Some(states) if states.len() > 1 => states.pop_front().unwrap_or(CrdState::NotFound),
            Some(states) => states.front().copied().unwrap_or(CrdState::NotFound),
            None => CrdState::NotFound,
        };
        Ok(state)
    }

    async fn wait_for(&self, condition: &WaitCondition) -> Result<()> {
        self.record(Operation::Wait(condition.resource.clone()));
        self.check(&condition.resource, "kubectl wait")
    }

    async fn delete_pods(&self, namespace: &str) -> Result<()> {
        self.record(Operation::DeletePods(namespace.to_string()));
        self.check(namespace, "kubectl delete pods")
    }
}
