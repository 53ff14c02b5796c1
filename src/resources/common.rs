//! Common constants and label helpers shared by the Kubernetes collaborators

use kube::ResourceExt;

use crate::crd::GaleraCluster;

/// Operator field manager name
pub const FIELD_MANAGER: &str = "galera-operator";

/// Label carrying the owning cluster name
pub const CLUSTER_LABEL: &str = "galera.example.com/cluster";

/// Label selector matching the pods of a cluster
pub fn pod_selector(cluster: &GaleraCluster) -> String {
    format!("{}={}", CLUSTER_LABEL, cluster.name_any())
}

/// Headless Service giving every pod a stable DNS name
pub fn internal_service_name(cluster: &GaleraCluster) -> String {
    format!("{}-internal", cluster.name_any())
}
