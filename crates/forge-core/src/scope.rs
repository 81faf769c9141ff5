//! Known cluster-scoped resource kinds
//!
//! Objects of these kinds live outside any namespace, so the classifier never
//! writes a namespace onto them. Keys are lower-cased kinds; values are the
//! lower-cased API versions under which the kind is cluster-scoped. The table
//! is data: extend it when a new cluster-scoped API shows up in a rendered tool.

use phf::phf_map;

static CLUSTER_SCOPED: phf::Map<&'static str, &'static [&'static str]> = phf_map! {
    // core
    "componentstatus" => &["v1"],
    "namespace" => &["v1"],
    "node" => &["v1"],
    "persistentvolume" => &["v1"],

    // admission / extension / aggregation
    "mutatingwebhookconfiguration" => &["admissionregistration.k8s.io/v1"],
    "validatingwebhookconfiguration" => &["admissionregistration.k8s.io/v1"],
    "validatingadmissionpolicy" => &["admissionregistration.k8s.io/v1"],
    "validatingadmissionpolicybinding" => &["admissionregistration.k8s.io/v1"],
    "customresourcedefinition" => &["apiextensions.k8s.io/v1"],
    "apiservice" => &["apiregistration.k8s.io/v1"],

    // authn / authz reviews
    "selfsubjectreview" => &["authentication.k8s.io/v1"],
    "tokenreview" => &["authentication.k8s.io/v1"],
    "selfsubjectaccessreview" => &["authorization.k8s.io/v1"],
    "selfsubjectrulesreview" => &["authorization.k8s.io/v1"],
    "subjectaccessreview" => &["authorization.k8s.io/v1"],

    "certificatesigningrequest" => &["certificates.k8s.io/v1"],
    "flowschema" => &["flowcontrol.apiserver.k8s.io/v1"],
    "prioritylevelconfiguration" => &["flowcontrol.apiserver.k8s.io/v1"],
    "nodemetrics" => &["metrics.k8s.io/v1beta1"],
    "ingressclass" => &["networking.k8s.io/v1"],
    "runtimeclass" => &["node.k8s.io/v1"],
    "clusterrole" => &["rbac.authorization.k8s.io/v1"],
    "clusterrolebinding" => &["rbac.authorization.k8s.io/v1"],
    "priorityclass" => &["scheduling.k8s.io/v1"],
    "csidriver" => &["storage.k8s.io/v1"],
    "csinode" => &["storage.k8s.io/v1"],
    "storageclass" => &["storage.k8s.io/v1"],
    "volumeattachment" => &["storage.k8s.io/v1"],
    "volumesnapshotclass" => &["snapshot.storage.k8s.io/v1"],
    "volumesnapshotcontent" => &["snapshot.storage.k8s.io/v1"],
    "gatewayclass" => &["gateway.networking.k8s.io/v1", "gateway.networking.k8s.io/v1beta1"],

    // trivy operator
    "clustercompliancereport" => &["aquasecurity.github.io/v1alpha1"],
    "clusterconfigauditreport" => &["aquasecurity.github.io/v1alpha1"],
    "clusterinfraassessmentreport" => &["aquasecurity.github.io/v1alpha1"],
    "clusterrbacassessmentreport" => &["aquasecurity.github.io/v1alpha1"],
    "clustersbomreport" => &["aquasecurity.github.io/v1alpha1"],
    "clustervulnerabilityreport" => &["aquasecurity.github.io/v1alpha1"],

    "clusterworkflowtemplate" => &["argoproj.io/v1alpha1"],
    "clusterissuer" => &["cert-manager.io/v1"],

    // cilium
    "ciliumendpointslice" => &["cilium.io/v2alpha1"],
    "ciliumexternalworkload" => &["cilium.io/v2"],
    "ciliumidentity" => &["cilium.io/v2"],
    "ciliumnode" => &["cilium.io/v2"],
    "ciliumclusterwidenetworkpolicy" => &["cilium.io/v2"],

    // external-secrets
    "clusterexternalsecret" => &["external-secrets.io/v1", "external-secrets.io/v1beta1"],
    "clustersecretstore" => &["external-secrets.io/v1", "external-secrets.io/v1beta1"],

    // kyverno
    "clusteradmissionreport" => &["kyverno.io/v1alpha2"],
    "clusterbackgroundscanreport" => &["kyverno.io/v1alpha2"],
    "clustercleanuppolicy" => &["kyverno.io/v2beta1", "kyverno.io/v2"],
    "clusterpolicy" => &["kyverno.io/v1"],

    // crossplane
    "provider" => &["pkg.crossplane.io/v1"],
    "function" => &["pkg.crossplane.io/v1", "pkg.crossplane.io/v1beta1"],
    "configuration" => &["pkg.crossplane.io/v1"],
    "deploymentruntimeconfig" => &["pkg.crossplane.io/v1beta1"],
    "composition" => &["apiextensions.crossplane.io/v1"],
    "compositeresourcedefinition" => &["apiextensions.crossplane.io/v1"],

    // gke
    "allowlistedv2workload" => &["auto.gke.io/v1"],
    "allowlistedworkload" => &["auto.gke.io/v1"],
    "membership" => &["hub.gke.io/v1"],
    "clusternodemonitoring" => &["monitoring.googleapis.com/v1"],
    "clusterpodmonitoring" => &["monitoring.googleapis.com/v1"],
    "clusterrules" => &["monitoring.googleapis.com/v1"],
    "globalrules" => &["monitoring.googleapis.com/v1"],
    "dataplanev2encryption" => &["networking.gke.io/v1alpha1"],
    "gkenetworkparamset" => &["networking.gke.io/v1"],
    "networklogging" => &["networking.gke.io/v1alpha1"],
    "network" => &["networking.gke.io/v1"],
    "remotenode" => &["networking.gke.io/v1alpha1"],
    "audit" => &["warden.gke.io/v1"],

    "clusterdomainclaim" => &["networking.internal.knative.dev/v1alpha1"],

    // tailscale
    "connector" => &["tailscale.com/v1alpha1"],
    "proxyclass" => &["tailscale.com/v1alpha1"],
};

/// Check whether a `(kind, apiVersion)` pair is cluster-scoped.
///
/// Comparison is case-insensitive on both parts.
pub fn is_cluster_scoped(kind: &str, api_version: &str) -> bool {
    let kind = kind.to_ascii_lowercase();
    CLUSTER_SCOPED
        .get(kind.as_str())
        .is_some_and(|versions| {
            versions
                .iter()
                .any(|v| v.eq_ignore_ascii_case(api_version))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_cluster_scoped() {
        assert!(is_cluster_scoped("Namespace", "v1"));
        assert!(is_cluster_scoped("CustomResourceDefinition", "apiextensions.k8s.io/v1"));
        assert!(is_cluster_scoped("ClusterRole", "rbac.authorization.k8s.io/v1"));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(is_cluster_scoped("clusterrolebinding", "RBAC.authorization.k8s.io/v1"));
        assert!(is_cluster_scoped("STORAGECLASS", "storage.k8s.io/v1"));
    }

    #[test]
    fn test_namespaced_kinds() {
        assert!(!is_cluster_scoped("ConfigMap", "v1"));
        assert!(!is_cluster_scoped("Deployment", "apps/v1"));
        assert!(!is_cluster_scoped("Role", "rbac.authorization.k8s.io/v1"));
    }

    #[test]
    fn test_api_version_must_match() {
        // Same kind name, different group: namespaced
        assert!(!is_cluster_scoped("Network", "k8s.cni.cncf.io/v1"));
        assert!(!is_cluster_scoped("Provider", "example.com/v1"));
        assert!(is_cluster_scoped("Provider", "pkg.crossplane.io/v1"));
    }
}
