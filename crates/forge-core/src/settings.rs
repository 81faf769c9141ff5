//! Forge settings (`forge.yaml`)
//!
//! Every field has a default, so an absent or partial file is fine.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Size cap of one delivery file: 300 KiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 300 * 1024;

static STACK_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_-]+$").expect("valid regex"));

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ForgeSettings {
    pub layout: LayoutSettings,
    pub package: PackageSettings,
    pub gitops: GitopsSettings,
    pub deploy: DeploySettings,
}

/// On-disk layout of a forge workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LayoutSettings {
    /// Source values and static manifests (`input/<tool>/`)
    pub input_dir: PathBuf,
    /// Split per-object files (`working/<tool>/<Kind>_<Name>.yaml`)
    pub working_dir: PathBuf,
    /// Delivery files produced by cast
    pub output_dir: PathBuf,
    /// Assembled stacks (`stacks/<name>/`)
    pub stacks_dir: PathBuf,
    /// Tools selected for this run
    pub tools_file: PathBuf,
    /// Every known tool
    pub defaults_file: PathBuf,
    /// Extra files copied into every stack (deploy manifests, scripts)
    pub assets_dir: PathBuf,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            working_dir: PathBuf::from("working"),
            output_dir: PathBuf::from("output"),
            stacks_dir: PathBuf::from("stacks"),
            tools_file: PathBuf::from("input/config.yaml"),
            defaults_file: PathBuf::from("input/default.yaml"),
            assets_dir: PathBuf::from("assets"),
        }
    }
}

impl LayoutSettings {
    /// Re-root every relative path under `root`
    pub fn rooted_at(&self, root: &Path) -> Self {
        let join = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                root.join(p)
            }
        };
        Self {
            input_dir: join(&self.input_dir),
            working_dir: join(&self.working_dir),
            output_dir: join(&self.output_dir),
            stacks_dir: join(&self.stacks_dir),
            tools_file: join(&self.tools_file),
            defaults_file: join(&self.defaults_file),
            assets_dir: join(&self.assets_dir),
        }
    }

    /// `working/pre`, where rendered but unsplit manifests land
    pub fn pre_dir(&self) -> PathBuf {
        self.working_dir.join("pre")
    }

    /// `working/argo-apps`, one Argo CD Application per tool
    pub fn argo_apps_dir(&self) -> PathBuf {
        self.working_dir.join("argo-apps")
    }
}

/// Delivery package settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PackageSettings {
    /// Byte cap of one delivery file
    pub max_file_size: u64,
    /// Namespace of the ConfigMap envelopes
    pub envelope_namespace: String,
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            envelope_namespace: "crossplane-system".to_string(),
        }
    }
}

/// Where Argo CD pulls tool manifests from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GitopsSettings {
    pub url: String,
    pub branch: String,
    pub path_prefix: String,
}

impl Default for GitopsSettings {
    fn default() -> Self {
        Self {
            url: "http://gitea-http.cf-gitea.svc:3000/forge/clusterforge.git".to_string(),
            branch: "HEAD".to_string(),
            path_prefix: String::new(),
        }
    }
}

/// Deployment timings and targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DeploySettings {
    /// CRDs that must be Established before the core layer is applied
    pub required_crds: Vec<String>,

    /// Namespace whose pods are restarted to reload providers
    pub system_namespace: String,

    /// Provider that must report Healthy before compositions are applied
    pub provider: String,

    /// Pause between CRD checks (default: 5s)
    #[serde(with = "humantime_serde")]
    pub crd_poll_interval: Duration,

    /// Total time allowed for each required CRD (default: 10m)
    #[serde(with = "humantime_serde")]
    pub crd_timeout: Duration,

    /// Single wait for the Established condition once a CRD exists (default: 60s)
    #[serde(with = "humantime_serde")]
    pub crd_established_timeout: Duration,

    /// Provider health wait (default: 60s)
    #[serde(with = "humantime_serde")]
    pub provider_timeout: Duration,

    /// System pods readiness wait (default: 600s)
    #[serde(with = "humantime_serde")]
    pub pods_timeout: Duration,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            required_crds: [
                "providers.pkg.crossplane.io",
                "functions.pkg.crossplane.io",
                "deploymentruntimeconfigs.pkg.crossplane.io",
                "compositions.apiextensions.crossplane.io",
                "compositeresourcedefinitions.apiextensions.crossplane.io",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            system_namespace: "crossplane-system".to_string(),
            provider: "provider-kubernetes".to_string(),
            crd_poll_interval: Duration::from_secs(5),
            crd_timeout: Duration::from_secs(600),
            crd_established_timeout: Duration::from_secs(60),
            provider_timeout: Duration::from_secs(60),
            pods_timeout: Duration::from_secs(600),
        }
    }
}

impl ForgeSettings {
    /// Load settings, falling back to defaults when the file is absent
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Stack names become directory names and image tags
pub fn validate_stack_name(name: &str) -> Result<()> {
    if STACK_NAME.is_match(name) {
        Ok(())
    } else {
        Err(CoreError::InvalidStackName {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ForgeSettings::default();
        assert_eq!(settings.package.max_file_size, 307_200);
        assert_eq!(settings.deploy.required_crds.len(), 5);
        assert_eq!(settings.deploy.crd_poll_interval, Duration::from_secs(5));
        assert_eq!(settings.layout.pre_dir(), PathBuf::from("working/pre"));
    }

    #[test]
    fn test_partial_file() {
        let settings = ForgeSettings::from_yaml(
            r#"
package:
  max-file-size: 1024
deploy:
  crd-timeout: 2m
  pods-timeout: 15m
"#,
        )
        .unwrap();
        assert_eq!(settings.package.max_file_size, 1024);
        assert_eq!(settings.package.envelope_namespace, "crossplane-system");
        assert_eq!(settings.deploy.crd_timeout, Duration::from_secs(120));
        assert_eq!(settings.deploy.pods_timeout, Duration::from_secs(900));
        assert_eq!(settings.deploy.provider_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_empty_file() {
        assert_eq!(ForgeSettings::from_yaml("").unwrap(), ForgeSettings::default());
    }

    #[test]
    fn test_rooted_layout() {
        let layout = LayoutSettings::default().rooted_at(Path::new("/srv/forge"));
        assert_eq!(layout.working_dir, PathBuf::from("/srv/forge/working"));
        assert_eq!(layout.argo_apps_dir(), PathBuf::from("/srv/forge/working/argo-apps"));
    }

    #[test]
    fn test_stack_names() {
        assert!(validate_stack_name("latest").is_ok());
        assert!(validate_stack_name("dev_stack-2").is_ok());
        assert!(validate_stack_name("Dev").is_err());
        assert!(validate_stack_name("a/b").is_err());
        assert!(validate_stack_name("").is_err());
    }
}
