use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// GaleraCluster is the Schema for the galeraclusters API
///
/// Only the fields read or written by the recovery subsystem are modelled here.
/// Workload reconciliation (StatefulSet, Services, TLS) lives elsewhere.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "galera.example.com",
    version = "v1alpha1",
    kind = "GaleraCluster",
    plural = "galeraclusters",
    shortname = "gc",
    namespaced,
    status = "GaleraClusterStatus",
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Bootstrap", "type":"string", "jsonPath":".status.galeraRecovery.bootstrap.pod"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GaleraClusterSpec {
    /// Number of Galera members (StatefulSet replicas)
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Galera specific configuration
    #[serde(default)]
    pub galera: GaleraSpec,
}

fn default_replicas() -> i32 {
    3
}

/// Galera configuration
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GaleraSpec {
    /// Automatic recovery after quorum loss
    #[serde(default)]
    pub recovery: GaleraRecoverySpec,
}

/// Configuration of the quorum-loss recovery process
///
/// Durations accept `s`, `m` and `h` suffixes (e.g. "30s", "5m"). Bare numbers are seconds.
/// No duration may exceed 24h.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GaleraRecoverySpec {
    /// Run recovery automatically when the cluster loses quorum
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// How long the cluster must be unhealthy before recovery starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_healthy_timeout: Option<String>,

    /// Maximum age of a bootstrap attempt before the recovery is started over
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_bootstrap_timeout: Option<String>,

    /// Timeout for fetching or recovering the state of a single pod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_recovery_timeout: Option<String>,

    /// Timeout for restarting and syncing every pod after the bootstrap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_sync_timeout: Option<String>,
}

impl Default for GaleraRecoverySpec {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            cluster_healthy_timeout: None,
            cluster_bootstrap_timeout: None,
            pod_recovery_timeout: None,
            pod_sync_timeout: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// Status of the GaleraCluster
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct GaleraClusterStatus {
    /// Kubernetes-style conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Progress of an in-flight recovery. Absent when no recovery is running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub galera_recovery: Option<RecoveryRecord>,
}

/// Persisted, resumable progress of one recovery attempt
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryRecord {
    /// Galera state reported by each pod's agent
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub states: BTreeMap<String, NodeState>,

    /// Sequence numbers certified by recovery mode
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub recovered: BTreeMap<String, RecoveredBootstrap>,

    /// Committed bootstrap attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap: Option<BootstrapAttempt>,

    /// Every pod has been restarted and synced after the bootstrap
    #[serde(default)]
    pub pods_restarted: bool,
}

/// Galera state of a single node (grastate.dat)
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeState {
    /// Cluster state UUID
    #[serde(default)]
    pub uuid: String,

    /// Last committed sequence number, -1 when unknown
    pub seqno: i64,

    /// The node certifies it holds the latest data
    #[serde(default)]
    pub safe_to_bootstrap: bool,
}

/// Position obtained by running the node in recovery mode
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecoveredBootstrap {
    /// Cluster state UUID, when the recovery procedure reported one
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,

    /// Recovered sequence number
    pub seqno: i64,
}

/// A committed bootstrap
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapAttempt {
    /// Pod bootstrapping the new cluster view
    pub pod: String,

    /// RFC 3339 timestamp of the moment the agent accepted the bootstrap
    pub started_at: String,
}

/// Kubernetes-style condition
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition: True, False, or Unknown
    pub status: String,

    /// Reason for the condition's last transition
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the condition transitioned
    pub last_transition_time: String,
}
