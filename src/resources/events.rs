//! Kubernetes events emitted during recovery

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};
use tracing::warn;

use crate::crd::GaleraCluster;
use crate::resources::EventSink;
use crate::resources::common::FIELD_MANAGER;

/// Event reasons
pub mod reasons {
    pub const CLUSTER_BOOTSTRAP: &str = "GaleraClusterBootstrap";
    pub const CLUSTER_BOOTSTRAP_TIMEOUT: &str = "GaleraClusterBootstrapTimeout";
    pub const CLUSTER_RECOVERED: &str = "GaleraClusterRecovered";
    pub const POD_STATE_FETCHED: &str = "GaleraPodStateFetched";
    pub const POD_RECOVERED: &str = "GaleraPodRecovered";
    pub const POD_SYNCED: &str = "GaleraPodSynced";
    pub const POD_SYNC_TIMEOUT: &str = "GaleraPodSyncTimeout";
    pub const POD_NOT_SAFE_TO_BOOTSTRAP: &str = "GaleraPodNotSafeToBootstrap";
}

const ACTION: &str = "Recovery";

/// Publishes events on the GaleraCluster object
#[derive(Clone)]
pub struct KubeEventSink {
    recorder: Recorder,
    reference: ObjectReference,
}

impl KubeEventSink {
    pub fn new(client: Client, cluster: &GaleraCluster) -> Self {
        let reporter = Reporter {
            controller: FIELD_MANAGER.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
            reference: cluster.object_ref(&()),
        }
    }
}

impl EventSink for KubeEventSink {
    async fn publish(&self, type_: EventType, reason: &str, note: String) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: Some(note),
            action: ACTION.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, &self.reference).await {
            warn!(reason = reason, error = %e, "Failed to publish event");
        }
    }
}
