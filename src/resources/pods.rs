//! Kubernetes backed pod directory

use k8s_openapi::api::core::v1::Pod;
use kube::api::{DeleteParams, ListParams};
use kube::{Api, Client, ResourceExt};
use tracing::debug;

use crate::controller::error::Result;
use crate::crd::GaleraCluster;
use crate::resources::PodDirectory;
use crate::resources::common::pod_selector;
use crate::resources::statefulset::compare_pod_names;

/// Pod phase reported once all containers have started
pub const POD_RUNNING: &str = "Running";

/// Whether the pod reports the `Running` phase
pub fn is_pod_running(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .is_some_and(|phase| phase == POD_RUNNING)
}

/// Whether the pod's `Ready` condition is `True`
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

/// Pods of one GaleraCluster, found by label selector
#[derive(Clone)]
pub struct KubePodDirectory {
    api: Api<Pod>,
    selector: String,
}

impl KubePodDirectory {
    pub fn new(client: Client, cluster: &GaleraCluster) -> Self {
        let ns = cluster.namespace().unwrap_or_else(|| "default".to_string());
        Self {
            api: Api::namespaced(client, &ns),
            selector: pod_selector(cluster),
        }
    }
}

impl PodDirectory for KubePodDirectory {
    async fn list_pods(&self) -> Result<Vec<Pod>> {
        let mut pods = self
            .api
            .list(&ListParams::default().labels(&self.selector))
            .await?
            .items;
        pods.sort_by(|a, b| compare_pod_names(&a.name_any(), &b.name_any()));
        Ok(pods)
    }

    async fn get_pod(&self, name: &str) -> Result<Option<Pod>> {
        Ok(self.api.get_opt(name).await?)
    }

    async fn delete_pod(&self, name: &str) -> Result<()> {
        match self.api.delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                debug!(pod = name, "Deleted pod");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
