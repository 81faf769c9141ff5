//! Delivery categories for packaged objects

use std::fmt;

/// Delivery category of a classified object
///
/// CRDs and Namespaces ship as raw manifests; the other three are embedded
/// as payload inside a ConfigMap envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceCategory {
    /// CustomResourceDefinition
    Crd,
    /// Namespace
    Namespace,
    /// ExternalSecret and friends (checked before Secret)
    ExternalSecret,
    /// Secret
    Secret,
    /// Everything else
    Object,
}

impl ResourceCategory {
    /// All categories, in precedence order.
    pub const ALL: [ResourceCategory; 5] = [
        Self::Crd,
        Self::Namespace,
        Self::ExternalSecret,
        Self::Secret,
        Self::Object,
    ];

    /// Categorize by substring match on the kind
    ///
    /// Precedence: CRD > Namespace > ExternalSecret > Secret > Object, so
    /// `ExternalSecret` never falls into the plain Secret bucket.
    pub fn from_kind(kind: &str) -> Self {
        if kind.contains("CustomResourceDefinition") {
            Self::Crd
        } else if kind.contains("Namespace") {
            Self::Namespace
        } else if kind.contains("ExternalSecret") {
            Self::ExternalSecret
        } else if kind.contains("Secret") {
            Self::Secret
        } else {
            Self::Object
        }
    }

    /// Categorize a per-object file named `<Kind>_<Name>.yaml`
    pub fn from_file_name(file_name: &str) -> Self {
        let kind = file_name
            .split_once('_')
            .map(|(kind, _)| kind)
            .unwrap_or(file_name);
        Self::from_kind(kind)
    }

    /// Whether objects of this category are wrapped in a delivery envelope
    pub fn is_wrapped(&self) -> bool {
        !matches!(self, Self::Crd | Self::Namespace)
    }

    /// Label used in delivery file names and header templates
    pub fn label(&self) -> &'static str {
        match self {
            Self::Crd => "crd",
            Self::Namespace => "namespace",
            Self::ExternalSecret => "externalsecret",
            Self::Secret => "secret",
            Self::Object => "object",
        }
    }

    /// Delivery file name for a tool and rotation index (starting at 1)
    pub fn file_name(&self, tool: &str, index: usize) -> String {
        if self.is_wrapped() {
            format!("cm-{}-{}-{}.yaml", tool, self.label(), index)
        } else {
            format!("{}-{}-{}.yaml", self.label(), tool, index)
        }
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
