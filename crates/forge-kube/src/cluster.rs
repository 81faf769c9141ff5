//! Cluster operations used by the deployment sequencer
//!
//! [`ClusterOps`] is the narrow seam between the sequencer and a live
//! cluster. [`KubectlCluster`] shells out to `kubectl` for apply, wait and
//! delete, and reads CRD status through the API.

use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use forge_engine::Exec;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::Client;
use kube::api::{Api, DynamicObject};
use kube::discovery::ApiResource;

use crate::context::ClusterTarget;
use crate::error::Result;

/// Observed state of a CRD
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrdState {
    NotFound,
    /// Created but without `Established=True`
    Existing,
    Established,
}

/// `kubectl wait --for=condition=<condition>` on one resource or a whole kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitCondition {
    /// `providers/provider-kubernetes` or a kind such as `pods`
    pub resource: String,
    pub condition: String,
    pub namespace: Option<String>,
    /// Wait on every object of `resource`
    pub all: bool,
    pub timeout: Duration,
}

impl WaitCondition {
    pub fn new(resource: impl Into<String>, condition: impl Into<String>, timeout: Duration) -> Self {
        Self {
            resource: resource.into(),
            condition: condition.into(),
            namespace: None,
            all: false,
            timeout,
        }
    }

    /// Every object of the kind in `namespace`
    pub fn all_in(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self.all = true;
        self
    }

    fn kubectl_args(&self) -> Vec<String> {
        let mut args = vec![
            "wait".to_string(),
            format!("--for=condition={}", self.condition),
            format!("--timeout={}s", self.timeout.as_secs()),
            self.resource.clone(),
        ];
        if self.all {
            args.push("--all".to_string());
        }
        if let Some(ns) = &self.namespace {
            args.push("-n".to_string());
            args.push(ns.clone());
        }
        args
    }
}

/// Operations the deployment needs from a cluster
#[async_trait]
pub trait ClusterOps: Send + Sync {
    /// `kubectl apply -f <manifest>`
    async fn apply(&self, manifest: &Path) -> Result<()>;

    /// Current state of a CRD by name
    async fn crd_state(&self, name: &str) -> Result<CrdState>;

    /// Block until a condition holds or its timeout expires
    async fn wait_for(&self, condition: &WaitCondition) -> Result<()>;

    /// Delete every pod in a namespace
    async fn delete_pods(&self, namespace: &str) -> Result<()>;
}

/// A cluster reached through `kubectl` and the Kubernetes API
pub struct KubectlCluster {
    client: Client,
    kubectl: String,
    target_args: Vec<OsString>,
}

impl KubectlCluster {
    /// Connect to `target`
    pub async fn connect(target: &ClusterTarget) -> Result<Self> {
        let config = target.client_config().await?;
        let client = Client::try_from(config)?;
        Ok(Self {
            client,
            kubectl: "kubectl".to_string(),
            target_args: target.kubectl_args(),
        })
    }

    /// Use a different `kubectl` binary
    pub fn with_kubectl(mut self, kubectl: impl Into<String>) -> Self {
        self.kubectl = kubectl.into();
        self
    }

    fn kubectl(&self) -> Exec {
        Exec::new(&self.kubectl).args(&self.target_args)
    }

    fn crd_api(&self) -> Api<DynamicObject> {
        Api::all_with(
            self.client.clone(),
            &ApiResource::erase::<CustomResourceDefinition>(&()),
        )
    }
}

#[async_trait]
impl ClusterOps for KubectlCluster {
    async fn apply(&self, manifest: &Path) -> Result<()> {
        self.kubectl().arg("apply").arg("-f").arg(manifest).output().await?;
        Ok(())
    }

    async fn crd_state(&self, name: &str) -> Result<CrdState> {
        let state = match self.crd_api().get_opt(name).await? {
            None => CrdState::NotFound,
            Some(crd) if is_crd_established(&crd) => CrdState::Established,
            Some(_) => CrdState::Existing,
        };
        tracing::debug!(crd = name, ?state, "checked CRD");
        Ok(state)
    }

    async fn wait_for(&self, condition: &WaitCondition) -> Result<()> {
        self.kubectl().args(condition.kubectl_args()).output().await?;
        Ok(())
    }

    async fn delete_pods(&self, namespace: &str) -> Result<()> {
        self.kubectl()
            .args(["delete", "pods", "--all", "-n", namespace])
            .output()
            .await?;
        Ok(())
    }
}

/// A CRD is ready when it has the "Established" condition set to "True"
fn is_crd_established(crd: &DynamicObject) -> bool {
    crd.data
        .get("status")
        .and_then(|s| s.get("conditions"))
        .and_then(|c| c.as_array())
        .is_some_and(|conds| {
            conds.iter().any(|c| {
                c.get("type").and_then(|t| t.as_str()) == Some("Established")
                    && c.get("status").and_then(|s| s.as_str()) == Some("True")
            })
        })
}
