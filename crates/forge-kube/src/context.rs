//! Choosing which cluster to deploy to
//!
//! Resolution order: the `KUBECONFIG` path if the operator confirms it, then
//! `~/.kube/config` if it exists, then the in-cluster service account.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use kube::config::{KubeConfigOptions, Kubeconfig};

use crate::error::{KubeError, Result};

/// Interactive questions asked while resolving a deployment
pub trait Prompter: Send + Sync {
    /// Yes/no question
    fn confirm(&self, question: &str, default: bool) -> Result<bool>;

    /// Pick one of `options`; returns its index
    fn select(&self, title: &str, options: &[String]) -> Result<usize>;
}

/// Answers every question with its default and picks the first option
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn confirm(&self, _question: &str, default: bool) -> Result<bool> {
        Ok(default)
    }

    fn select(&self, title: &str, options: &[String]) -> Result<usize> {
        if options.is_empty() {
            return Err(KubeError::Prompt(format!("nothing to choose for '{title}'")));
        }
        Ok(0)
    }
}

/// The cluster a deployment talks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterTarget {
    /// `None` means in-cluster configuration
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
}

impl ClusterTarget {
    pub fn in_cluster() -> Self {
        Self {
            kubeconfig: None,
            context: None,
        }
    }

    pub fn is_in_cluster(&self) -> bool {
        self.kubeconfig.is_none()
    }

    /// Client configuration for this target
    pub async fn client_config(&self) -> Result<kube::Config> {
        let Some(path) = &self.kubeconfig else {
            return Ok(kube::Config::incluster()?);
        };
        let kubeconfig = Kubeconfig::read_from(path)?;
        let options = KubeConfigOptions {
            context: self.context.clone(),
            cluster: None,
            user: None,
        };
        Ok(kube::Config::from_custom_kubeconfig(kubeconfig, &options).await?)
    }

    /// `--kubeconfig` / `--context` for kubectl
    pub fn kubectl_args(&self) -> Vec<OsString> {
        let mut args = Vec::new();
        if let Some(path) = &self.kubeconfig {
            args.push(OsString::from("--kubeconfig"));
            args.push(path.clone().into_os_string());
        }
        if let Some(context) = &self.context {
            args.push(OsString::from("--context"));
            args.push(OsString::from(context));
        }
        args
    }

    pub fn describe(&self) -> String {
        match (&self.kubeconfig, &self.context) {
            (None, _) => "in-cluster".to_string(),
            (Some(path), Some(ctx)) => format!("{ctx} ({})", path.display()),
            (Some(path), None) => path.display().to_string(),
        }
    }
}

/// Where a kubeconfig may come from
#[derive(Debug, Clone, Default)]
pub struct ContextSource {
    /// Kubeconfig picked from `KUBECONFIG`
    pub env_kubeconfig: Option<PathBuf>,
    /// Usually `~/.kube/config`
    pub default_kubeconfig: Option<PathBuf>,
    /// Context named on the command line; skips the selection prompt
    pub context: Option<String>,
}

impl ContextSource {
    /// Read `KUBECONFIG` and the home directory
    pub fn from_env() -> Self {
        Self {
            env_kubeconfig: std::env::var_os("KUBECONFIG")
                .and_then(|value| pick_kubeconfig(&value)),
            default_kubeconfig: dirs::home_dir().map(|home| home.join(".kube").join("config")),
            context: None,
        }
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }
}

/// First existing file of a `KUBECONFIG` path list, else its first entry
///
/// Files of a list are not merged; only one of them is used.
fn pick_kubeconfig(value: &OsStr) -> Option<PathBuf> {
    let paths: Vec<PathBuf> = std::env::split_paths(value)
        .filter(|p| !p.as_os_str().is_empty())
        .collect();
    if paths.len() > 1 {
        tracing::debug!(count = paths.len(), "KUBECONFIG lists several files, using one");
    }
    paths
        .iter()
        .find(|p| p.is_file())
        .or_else(|| paths.first())
        .cloned()
}

/// Resolve the kubeconfig and context to deploy with
pub fn resolve_target(source: &ContextSource, prompter: &dyn Prompter) -> Result<ClusterTarget> {
    let Some(path) = kubeconfig_path(source, prompter)? else {
        tracing::warn!("no kubeconfig found, falling back to in-cluster configuration");
        return Ok(ClusterTarget::in_cluster());
    };

    let kubeconfig = Kubeconfig::read_from(&path)?;
    let mut names: Vec<String> = kubeconfig.contexts.iter().map(|c| c.name.clone()).collect();
    names.sort();

    let context = match &source.context {
        Some(wanted) if names.contains(wanted) => wanted.clone(),
        Some(wanted) => {
            return Err(KubeError::ContextNotFound {
                name: wanted.clone(),
                path,
            });
        }
        None => match names.len() {
            0 => return Err(KubeError::NoContexts { path }),
            1 => names.remove(0),
            _ => {
                let index = prompter.select("Select a Kubernetes context", &names)?;
                names
                    .get(index)
                    .cloned()
                    .ok_or_else(|| KubeError::Prompt(format!("no context at index {index}")))?
            }
        },
    };

    tracing::info!(kubeconfig = %path.display(), context = %context, "selected context");
    Ok(ClusterTarget {
        kubeconfig: Some(path),
        context: Some(context),
    })
}

fn kubeconfig_path(source: &ContextSource, prompter: &dyn Prompter) -> Result<Option<PathBuf>> {
    if let Some(env_path) = &source.env_kubeconfig {
        tracing::info!(path = %env_path.display(), "KUBECONFIG environment variable detected");
        let question = format!("Use the KUBECONFIG path {}?", env_path.display());
        if prompter.confirm(&question, true)? {
            return Ok(Some(env_path.clone()));
        }
    }
    Ok(source
        .default_kubeconfig
        .as_deref()
        .filter(|p| p.is_file())
        .map(Path::to_path_buf))
}
