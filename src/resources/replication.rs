//! Replication sync checks

use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client, ResourceExt};

use crate::controller::error::Result;
use crate::crd::GaleraCluster;
use crate::resources::ReplicationClient;
use crate::resources::pods::is_pod_ready;
use crate::resources::statefulset::pod_name;

/// Uses pod readiness as the sync signal
///
/// The Galera readiness probe only succeeds once the member reports the
/// `Synced` local state, so a `Ready` pod is a synced member.
#[derive(Clone)]
pub struct PodReadinessReplicationClient {
    api: Api<Pod>,
    cluster: GaleraCluster,
}

impl PodReadinessReplicationClient {
    pub fn new(client: Client, cluster: &GaleraCluster) -> Self {
        let ns = cluster.namespace().unwrap_or_else(|| "default".to_string());
        Self {
            api: Api::namespaced(client, &ns),
            cluster: cluster.clone(),
        }
    }
}

impl ReplicationClient for PodReadinessReplicationClient {
    async fn is_synced(&self, pod_index: i32) -> Result<bool> {
        let name = pod_name(&self.cluster, pod_index);
        Ok(self
            .api
            .get_opt(&name)
            .await?
            .is_some_and(|pod| is_pod_ready(&pod)))
    }
}
