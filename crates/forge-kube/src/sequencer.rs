//! Deployment sequencer
//!
//! Applies an assembled stack in a fixed order. Later layers depend on
//! custom resource types registered by earlier ones, so the sequence blocks
//! on the required CRDs becoming Established before anything else goes in.
//!
//! ```text
//! SelectContext ─▶ ApplyBase ─▶ AwaitRequiredCRDs ─▶ ApplyCore ─▶ AwaitProviderHealthy
//!   ─▶ ApplyComposition ─▶ RestartSystemPods ─▶ AwaitSystemPodsReady ─▶ ApplyStackClaim ─▶ Done
//! ```
//!
//! Any failure stops the sequence and is reported with the phase it
//! happened in. Nothing is rolled back.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use forge_core::DeploySettings;
use tokio_util::sync::CancellationToken;

use crate::cluster::{ClusterOps, CrdState, WaitCondition};
use crate::context::{ClusterTarget, ContextSource, Prompter, resolve_target};
use crate::error::{KubeError, Result};
use crate::poll::{PollStop, Poller};

/// Stages of a deployment, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeployPhase {
    SelectContext,
    ApplyBase,
    AwaitRequiredCrds,
    ApplyCore,
    AwaitProviderHealthy,
    ApplyComposition,
    RestartSystemPods,
    AwaitSystemPodsReady,
    ApplyStackClaim,
    Done,
}

impl DeployPhase {
    pub const ALL: [DeployPhase; 10] = [
        DeployPhase::SelectContext,
        DeployPhase::ApplyBase,
        DeployPhase::AwaitRequiredCrds,
        DeployPhase::ApplyCore,
        DeployPhase::AwaitProviderHealthy,
        DeployPhase::ApplyComposition,
        DeployPhase::RestartSystemPods,
        DeployPhase::AwaitSystemPodsReady,
        DeployPhase::ApplyStackClaim,
        DeployPhase::Done,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DeployPhase::SelectContext => "select-context",
            DeployPhase::ApplyBase => "apply-base",
            DeployPhase::AwaitRequiredCrds => "await-required-crds",
            DeployPhase::ApplyCore => "apply-core",
            DeployPhase::AwaitProviderHealthy => "await-provider-healthy",
            DeployPhase::ApplyComposition => "apply-composition",
            DeployPhase::RestartSystemPods => "restart-system-pods",
            DeployPhase::AwaitSystemPodsReady => "await-system-pods-ready",
            DeployPhase::ApplyStackClaim => "apply-stack-claim",
            DeployPhase::Done => "done",
        }
    }
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stack files applied by each phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFiles {
    pub base: String,
    pub core: String,
    pub provider: String,
    pub composition: String,
    pub claim: String,
}

impl Default for StackFiles {
    fn default() -> Self {
        Self {
            base: "crossplane_base.yaml".to_string(),
            core: "crossplane.yaml".to_string(),
            provider: "crossplane_provider.yaml".to_string(),
            composition: "composition.yaml".to_string(),
            claim: "stack.yaml".to_string(),
        }
    }
}

/// Everything a deployment needs to know besides the cluster
#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub files: StackFiles,
    pub required_crds: Vec<String>,
    pub system_namespace: String,
    pub provider: String,
    pub crd_poll_interval: Duration,
    pub crd_timeout: Duration,
    pub crd_established_timeout: Duration,
    pub provider_timeout: Duration,
    pub pods_timeout: Duration,
}

impl From<&DeploySettings> for DeployPlan {
    fn from(settings: &DeploySettings) -> Self {
        Self {
            files: StackFiles::default(),
            required_crds: settings.required_crds.clone(),
            system_namespace: settings.system_namespace.clone(),
            provider: settings.provider.clone(),
            crd_poll_interval: settings.crd_poll_interval,
            crd_timeout: settings.crd_timeout,
            crd_established_timeout: settings.crd_established_timeout,
            provider_timeout: settings.provider_timeout,
            pods_timeout: settings.pods_timeout,
        }
    }
}

impl Default for DeployPlan {
    fn default() -> Self {
        Self::from(&DeploySettings::default())
    }
}

impl DeployPlan {
    /// Every file this plan applies, in order
    pub fn ordered_files(&self) -> [&str; 5] {
        [
            self.files.base.as_str(),
            self.files.core.as_str(),
            self.files.provider.as_str(),
            self.files.composition.as_str(),
            self.files.claim.as_str(),
        ]
    }

    /// Stack files the plan needs that are missing from `stack`
    pub fn missing_files(&self, stack: &Path) -> Vec<PathBuf> {
        self.ordered_files()
            .iter()
            .map(|f| stack.join(f))
            .filter(|p| !p.is_file())
            .collect()
    }
}

/// Per-CRD result of the readiness wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrdWait {
    pub name: String,
    /// How many times the CRD was checked
    pub checks: usize,
    pub waited: Duration,
}

/// What a completed deployment did
#[derive(Debug, Clone, Default)]
pub struct DeployReport {
    pub completed: Vec<DeployPhase>,
    pub applied: Vec<PathBuf>,
    pub crds: Vec<CrdWait>,
}

/// Progress notifications while the sequence runs
pub trait DeployObserver: Send + Sync {
    fn phase_started(&self, _phase: DeployPhase) {}
    fn phase_finished(&self, _phase: DeployPhase) {}
}

/// Observer that ignores everything
pub struct Silent;

impl DeployObserver for Silent {}

/// Runs the deployment phases against one cluster
pub struct DeploymentSequencer<'a> {
    plan: &'a DeployPlan,
    cancel: CancellationToken,
    observer: &'a dyn DeployObserver,
}

impl<'a> DeploymentSequencer<'a> {
    pub fn new(plan: &'a DeployPlan) -> Self {
        Self {
            plan,
            cancel: CancellationToken::new(),
            observer: &Silent,
        }
    }

    /// Token that interrupts CRD polling when cancelled
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn DeployObserver) -> Self {
        self.observer = observer;
        self
    }

    /// `SelectContext`: settle kubeconfig and context, then check a client config can be built
    pub async fn select_context(
        &self,
        source: &ContextSource,
        prompter: &dyn Prompter,
    ) -> Result<ClusterTarget> {
        let phase = DeployPhase::SelectContext;
        self.observer.phase_started(phase);
        let target = async {
            let target = resolve_target(source, prompter)?;
            target.client_config().await?;
            Ok::<_, KubeError>(target)
        }
        .await
        .map_err(|e| e.in_phase(phase))?;
        tracing::info!(cluster = %target.describe(), "using cluster");
        self.observer.phase_finished(phase);
        Ok(target)
    }

    /// Run every phase after `SelectContext` against `cluster`
    pub async fn deploy(&self, cluster: &dyn ClusterOps, stack: &Path) -> Result<DeployReport> {
        tracing::info!(stack = %stack.display(), "deploying stack");
        if let Some(path) = self.plan.missing_files(stack).into_iter().next() {
            return Err(KubeError::MissingStackFile { path });
        }

        let mut report = DeployReport {
            completed: vec![DeployPhase::SelectContext],
            ..Default::default()
        };
        let files = &self.plan.files;

        self.run(&mut report, DeployPhase::ApplyBase, async |r| {
            apply(cluster, stack, &files.base, r).await
        })
        .await?;

        self.run(&mut report, DeployPhase::AwaitRequiredCrds, async |r| {
            for name in &self.plan.required_crds {
                let wait = self.await_crd(cluster, name).await?;
                r.crds.push(wait);
            }
            Ok(())
        })
        .await?;

        self.run(&mut report, DeployPhase::ApplyCore, async |r| {
            apply(cluster, stack, &files.core, r).await
        })
        .await?;

        self.run(&mut report, DeployPhase::AwaitProviderHealthy, async |_| {
            let provider = format!("providers/{}", self.plan.provider);
            cluster
                .wait_for(&WaitCondition::new(provider, "Healthy", self.plan.provider_timeout))
                .await
        })
        .await?;

        self.run(&mut report, DeployPhase::ApplyComposition, async |r| {
            apply(cluster, stack, &files.provider, r).await?;
            apply(cluster, stack, &files.composition, r).await
        })
        .await?;

        self.run(&mut report, DeployPhase::RestartSystemPods, async |_| {
            cluster.delete_pods(&self.plan.system_namespace).await
        })
        .await?;

        self.run(&mut report, DeployPhase::AwaitSystemPodsReady, async |_| {
            let pods = WaitCondition::new("pods", "Ready", self.plan.pods_timeout)
                .all_in(self.plan.system_namespace.clone());
            cluster.wait_for(&pods).await
        })
        .await?;

        self.run(&mut report, DeployPhase::ApplyStackClaim, async |r| {
            apply(cluster, stack, &files.claim, r).await
        })
        .await?;

        report.completed.push(DeployPhase::Done);
        tracing::info!("deployment complete");
        Ok(report)
    }

    async fn run<F>(&self, report: &mut DeployReport, phase: DeployPhase, step: F) -> Result<()>
    where
        F: AsyncFnOnce(&mut DeployReport) -> Result<()>,
    {
        if self.cancel.is_cancelled() {
            return Err(KubeError::Cancelled.in_phase(phase));
        }
        tracing::info!(%phase, "phase started");
        self.observer.phase_started(phase);
        step(report).await.map_err(|e| {
            tracing::error!(%phase, error = %e, "phase failed");
            e.in_phase(phase)
        })?;
        self.observer.phase_finished(phase);
        report.completed.push(phase);
        Ok(())
    }

    /// Poll one CRD until it is Established
    ///
    /// The CRD gets `crd_timeout` in total to show up. Once it exists it has
    /// `crd_established_timeout` (never more than what is left of the total)
    /// to become Established.
    async fn await_crd(&self, cluster: &dyn ClusterOps, name: &str) -> Result<CrdWait> {
        let mut poller = Poller::new(self.plan.crd_poll_interval, self.plan.crd_timeout, &self.cancel);
        let mut checks = 0;
        let mut exists = false;
        loop {
            checks += 1;
            match cluster.crd_state(name).await? {
                CrdState::Established => {
                    tracing::info!(crd = name, checks, "CRD established");
                    return Ok(CrdWait {
                        name: name.to_string(),
                        checks,
                        waited: poller.elapsed(),
                    });
                }
                CrdState::Existing if !exists => {
                    exists = true;
                    poller.tighten(self.plan.crd_established_timeout);
                    tracing::info!(crd = name, "CRD created, waiting for Established");
                }
                CrdState::Existing => {}
                CrdState::NotFound => {
                    tracing::info!(crd = name, retry_in = ?self.plan.crd_poll_interval, "CRD not found");
                }
            }

            match poller.tick().await {
                Ok(()) => {}
                Err(PollStop::Cancelled) => return Err(KubeError::Cancelled),
                Err(PollStop::TimedOut(waited)) if exists => {
                    return Err(KubeError::CrdNotEstablished {
                        name: name.to_string(),
                        waited,
                    });
                }
                Err(PollStop::TimedOut(waited)) => {
                    return Err(KubeError::CrdNeverAppeared {
                        name: name.to_string(),
                        waited,
                    });
                }
            }
        }
    }
}

async fn apply(cluster: &dyn ClusterOps, stack: &Path, file: &str, report: &mut DeployReport) -> Result<()> {
    let path = stack.join(file);
    tracing::info!(file, "applying");
    cluster.apply(&path).await?;
    report.applied.push(path);
    Ok(())
}
