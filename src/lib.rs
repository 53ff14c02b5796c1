pub mod controller;
pub mod crd;
pub mod metrics;
pub mod resources;

pub use controller::{
    BackoffConfig, Context, Error, GaleraRecovery, RecoveryConfig, RecoveryOutcome, Result,
    error_policy, reconcile,
};
pub use crd::{GaleraCluster, RecoveryRecord};
pub use metrics::Metrics;

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::Controller;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;

use crate::resources::common::CLUSTER_LABEL;

/// Helper to create a namespaced or cluster-wide API based on scope.
fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Cluster a pod belongs to, from its cluster label
fn pod_cluster(pod: Pod) -> Option<ObjectRef<GaleraCluster>> {
    let ns = pod.namespace()?;
    let cluster = pod.labels().get(CLUSTER_LABEL)?;
    Some(ObjectRef::new(cluster).within(&ns))
}

/// Run the recovery controller (cluster-wide).
///
/// If metrics are provided, reconciliations and recoveries are recorded.
pub async fn run_controller(client: Client, metrics: Option<Arc<Metrics>>) {
    run_controller_scoped(client, metrics, None).await
}

/// Run the recovery controller with optional namespace scoping.
///
/// When `namespace` is `Some(ns)`, only watches resources in that namespace.
/// When `namespace` is `None`, watches resources cluster-wide.
pub async fn run_controller_scoped(
    client: Client,
    metrics: Option<Arc<Metrics>>,
    namespace: Option<&str>,
) {
    let scope_msg = namespace.unwrap_or("cluster-wide");
    tracing::info!(
        "Starting controller for GaleraCluster resources (scope: {})",
        scope_msg
    );

    let ctx = Arc::new(Context::new(client.clone(), metrics));

    let clusters: Api<GaleraCluster> = scoped_api(client.clone(), namespace);
    let pods: Api<Pod> = scoped_api(client.clone(), namespace);

    let watcher_config = WatcherConfig::default().any_semantic();

    // Pods are owned by the StatefulSet, so they are mapped back through the cluster label
    Controller::new(clusters, watcher_config.clone())
        .watches(
            pods,
            watcher_config.labels(CLUSTER_LABEL),
            pod_cluster,
        )
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled: {}", obj.name);
                }
                Err(e) => {
                    let is_not_found = matches!(
                        &e,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _) if err.is_not_found()
                    );
                    if is_not_found {
                        tracing::debug!("Object no longer exists (likely deleted): {:?}", e);
                    } else {
                        tracing::error!("Reconciliation error: {:?}", e);
                    }
                }
            }
        })
        .await;

    tracing::error!("Controller stream ended unexpectedly");
}
