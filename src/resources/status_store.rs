//! Recovery record persistence in the GaleraCluster status

use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use tracing::debug;

use crate::controller::error::Result;
use crate::crd::{GaleraCluster, RecoveryRecord};
use crate::resources::StatusStore;
use crate::resources::common::FIELD_MANAGER;

/// Build the merge patch for `status.galeraRecovery`
///
/// `None` produces an explicit `null`, which removes the field.
pub fn recovery_status_patch(record: Option<&RecoveryRecord>) -> serde_json::Value {
    serde_json::json!({
        "status": {
            "galeraRecovery": record
        }
    })
}

/// Stores the recovery record in `status.galeraRecovery`
#[derive(Clone)]
pub struct KubeStatusStore {
    api: Api<GaleraCluster>,
    name: String,
}

impl KubeStatusStore {
    pub fn new(client: Client, cluster: &GaleraCluster) -> Self {
        let ns = cluster.namespace().unwrap_or_else(|| "default".to_string());
        Self {
            api: Api::namespaced(client, &ns),
            name: cluster.name_any(),
        }
    }
}

impl StatusStore for KubeStatusStore {
    async fn read(&self) -> Result<Option<RecoveryRecord>> {
        let cluster = self.api.get_status(&self.name).await?;
        Ok(cluster.status.and_then(|s| s.galera_recovery))
    }

    async fn write(&self, record: Option<&RecoveryRecord>) -> Result<()> {
        let patch = recovery_status_patch(record);

        self.api
            .patch_status(
                &self.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;

        debug!(cluster = %self.name, cleared = record.is_none(), "Patched recovery status");
        Ok(())
    }
}
