//! Collaborators of the recovery process
//!
//! The recovery orchestrator only talks to the outside world through the traits
//! in this module. Kubernetes and HTTP backed implementations live in the
//! submodules; tests substitute in-memory fakes.

pub mod agent;
pub mod common;
pub mod events;
pub mod pods;
pub mod replication;
pub mod statefulset;
pub mod status_store;

use std::future::Future;

use k8s_openapi::api::core::v1::Pod;
use kube::runtime::events::EventType;

use crate::controller::error::Result;
use crate::crd::{NodeState, RecoveredBootstrap, RecoveryRecord};

pub use agent::{AgentError, Bootstrap, HttpAgentClientSet};
pub use common::{FIELD_MANAGER, internal_service_name, pod_selector};
pub use events::KubeEventSink;
pub use pods::KubePodDirectory;
pub use replication::PodReadinessReplicationClient;
pub use status_store::KubeStatusStore;

/// Lookup and deletion of the pods of one cluster
pub trait PodDirectory: Send + Sync {
    /// Pods belonging to the cluster, sorted by name
    fn list_pods(&self) -> impl Future<Output = Result<Vec<Pod>>> + Send;

    /// A single pod, `None` when it does not exist
    fn get_pod(&self, name: &str) -> impl Future<Output = Result<Option<Pod>>> + Send;

    /// Delete a pod. Deleting a missing pod is not an error.
    fn delete_pod(&self, name: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Clients for the agent sidecar running next to every MariaDB container
pub trait AgentClientSet: Send + Sync {
    /// Galera state as persisted by the node
    fn node_state(&self, pod: &str) -> impl Future<Output = Result<NodeState>> + Send;

    /// Restart the node in recovery mode
    fn enable_recovery(&self, pod: &str) -> impl Future<Output = Result<()>> + Send;

    /// Run the recovery procedure and return the certified position
    fn start_recovery(&self, pod: &str)
    -> impl Future<Output = Result<RecoveredBootstrap>> + Send;

    /// Leave recovery mode
    fn disable_recovery(&self, pod: &str) -> impl Future<Output = Result<()>> + Send;

    /// Make the node bootstrap a new cluster from `bootstrap`
    fn enable_bootstrap(
        &self,
        pod: &str,
        bootstrap: &Bootstrap,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Replication health of individual members
pub trait ReplicationClient: Send + Sync {
    /// Whether the member with the given ordinal is synced with the cluster
    fn is_synced(&self, pod_index: i32) -> impl Future<Output = Result<bool>> + Send;
}

/// Read-modify-write access to the persisted recovery record
pub trait StatusStore: Send + Sync {
    /// Current record, `None` when no recovery is in progress
    fn read(&self) -> impl Future<Output = Result<Option<RecoveryRecord>>> + Send;

    /// Persist the record. `None` removes it from the status.
    fn write(&self, record: Option<&RecoveryRecord>) -> impl Future<Output = Result<()>> + Send;
}

/// Sink for recovery events
///
/// Publishing is best effort and never fails the recovery.
pub trait EventSink: Send + Sync {
    fn publish(
        &self,
        type_: EventType,
        reason: &str,
        note: String,
    ) -> impl Future<Output = ()> + Send;
}
