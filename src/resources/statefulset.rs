//! StatefulSet pod naming helpers

use std::cmp::Ordering;

use kube::ResourceExt;

use crate::controller::error::{Error, Result};
use crate::crd::GaleraCluster;

/// Name of the pod with the given ordinal
pub fn pod_name(cluster: &GaleraCluster, ordinal: i32) -> String {
    format!("{}-{}", cluster.name_any(), ordinal)
}

/// Names of every pod the StatefulSet manages, in ordinal order
pub fn pod_names(cluster: &GaleraCluster) -> Vec<String> {
    (0..cluster.spec.replicas)
        .map(|i| pod_name(cluster, i))
        .collect()
}

/// Ordinal of a StatefulSet pod, parsed from the `-<ordinal>` suffix of its name
pub fn pod_index(pod_name: &str) -> Result<i32> {
    pod_name
        .rsplit_once('-')
        .and_then(|(_, ordinal)| ordinal.parse::<i32>().ok())
        .filter(|ordinal| *ordinal >= 0)
        .ok_or_else(|| Error::InvalidPodName(pod_name.to_string()))
}

/// Order pod names by ordinal, falling back to plain string order
///
/// `galera-2` sorts before `galera-10`.
pub fn compare_pod_names(a: &str, b: &str) -> Ordering {
    match (pod_index(a), pod_index(b)) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}
