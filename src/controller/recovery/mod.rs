//! Galera cluster recovery after quorum loss
//!
//! When every member of a Galera cluster has lost quorum, no node can resume
//! serving writes on its own. Recovery picks the node holding the most recent
//! data, makes it bootstrap a new cluster view, then cycles every pod so the
//! remaining members rejoin it:
//!
//! ```text
//! Idle -> CollectingState -> (Recovering) -> Bootstrapping -> RestartingPods -> Idle
//! ```
//!
//! Progress lives in a [`RecoveryRecord`] persisted through a [`StatusStore`]
//! after every step, so a crashed or failed reconciliation resumes where the
//! previous one stopped. A bootstrap that does not complete within
//! `clusterBootstrapTimeout` discards the record and starts over.

mod bootstrap;
mod collect;
mod record;
mod recover;
mod restart;
mod source;

use chrono::Utc;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use kube::runtime::events::EventType;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::controller::config::RecoveryConfig;
use crate::controller::error::{Error, Result};
use crate::controller::wait::poll_until_success;
use crate::crd::{GaleraCluster, RecoveryRecord};
use crate::resources::events::reasons;
use crate::resources::pods::is_pod_running;
use crate::resources::statefulset::pod_index;
use crate::resources::{AgentClientSet, EventSink, PodDirectory, ReplicationClient, StatusStore};

pub use record::RecoveryPhase;
pub use restart::restart_order;
pub use source::{BootstrapSource, SourceOrigin, bootstrap_source};

/// Why a recovery record was discarded
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResetReason {
    /// The bootstrap attempt exceeded `clusterBootstrapTimeout`
    BootstrapTimeout,
    /// The bootstrap pod no longer reports `safe_to_bootstrap`
    NotSafeToBootstrap,
}

impl ResetReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetReason::BootstrapTimeout => "bootstrap_timeout",
            ResetReason::NotSafeToBootstrap => "not_safe_to_bootstrap",
        }
    }
}

/// Result of one orchestrator invocation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The record only says every pod was restarted. Nothing was done.
    AlreadyRestarted,
    /// The cluster recovered and the record was cleared
    Completed,
    /// The record was discarded, recovery starts over
    Reset(ResetReason),
}

impl RecoveryOutcome {
    /// Whether this invocation finished a recovery
    pub fn is_completed(&self) -> bool {
        matches!(self, RecoveryOutcome::Completed)
    }
}

/// Bootstrap source, ignoring recovered seqnos until every pod has one
///
/// A record resumed after a failed recovery pass may hold the seqnos of some
/// pods only. The missing pods could be ahead of all of them.
fn complete_source(record: &RecoveryRecord, pods: &[String]) -> Option<BootstrapSource> {
    let source = bootstrap_source(record)?;
    if source.origin == SourceOrigin::Recovered
        && pods.iter().any(|pod| record.recovered(pod).is_none())
    {
        debug!(pod = %source.pod, "Ignoring partial recovery results");
        return None;
    }
    Some(source)
}

/// Recovery orchestrator for a single cluster
pub struct GaleraRecovery<'a, P, A, R, S, E> {
    cluster: &'a GaleraCluster,
    config: RecoveryConfig,
    pods: &'a P,
    agents: &'a A,
    replication: &'a R,
    store: &'a S,
    events: &'a E,
}

impl<'a, P, A, R, S, E> GaleraRecovery<'a, P, A, R, S, E>
where
    P: PodDirectory,
    A: AgentClientSet,
    R: ReplicationClient,
    S: StatusStore,
    E: EventSink,
{
    pub fn new(
        cluster: &'a GaleraCluster,
        config: RecoveryConfig,
        pods: &'a P,
        agents: &'a A,
        replication: &'a R,
        store: &'a S,
        events: &'a E,
    ) -> Self {
        Self {
            cluster,
            config,
            pods,
            agents,
            replication,
            store,
            events,
        }
    }

    /// Read the persisted record and drive it one step closer to completion
    pub async fn recover(&self) -> Result<RecoveryOutcome> {
        let mut record = self.store.read().await?.unwrap_or_default();
        self.run(&mut record).await
    }

    /// Whether every member runs and is synced
    ///
    /// `GaleraReady` may still be `False` after a recovery completed. Starting
    /// another one would cycle a healthy cluster.
    pub async fn is_cluster_synced(&self) -> Result<bool> {
        let pods = self.pods.list_pods().await?;
        let replicas = usize::try_from(self.cluster.spec.replicas).unwrap_or_default();
        if pods.len() < replicas {
            return Ok(false);
        }

        for pod in &pods {
            if !is_pod_running(pod) {
                return Ok(false);
            }
            if !self.replication.is_synced(pod_index(&pod.name_any())?).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Remove the persisted record
    pub async fn clear_record(&self) -> Result<()> {
        self.store.write(None).await
    }

    /// Drive `record` as far as possible
    ///
    /// `record` reflects every bit of progress made, including when an error
    /// is returned. It is persisted after each mutation.
    pub async fn run(&self, record: &mut RecoveryRecord) -> Result<RecoveryOutcome> {
        if record.pods_restarted && !record.is_bootstrapping() {
            debug!(cluster = %self.cluster.name_any(), "Pods already restarted, nothing to recover");
            return Ok(RecoveryOutcome::AlreadyRestarted);
        }

        if record.bootstrap_timed_out(Utc::now(), self.config.cluster_bootstrap_timeout) {
            warn!(
                pod = record.bootstrap_pod().unwrap_or_default(),
                timeout = ?self.config.cluster_bootstrap_timeout,
                "Galera cluster bootstrap timed out, resetting recovery"
            );
            self.events
                .publish(
                    EventType::Warning,
                    reasons::CLUSTER_BOOTSTRAP_TIMEOUT,
                    "Galera cluster bootstrap timed out".to_string(),
                )
                .await;
            record.reset();
            self.persist(record).await?;
            return Ok(RecoveryOutcome::Reset(ResetReason::BootstrapTimeout));
        }

        if record.pods_restarted {
            // A previous invocation restarted every pod but could not clear the record
            return self.complete(record).await;
        }

        if !record.is_bootstrapping() {
            info!(cluster = %self.cluster.name_any(), "Recovering cluster");
            self.recover_cluster(record).await?;
        }

        info!(cluster = %self.cluster.name_any(), "Restarting pods");
        if let Some(reason) = self
            .restart_pods(record)
            .await
            .map_err(|e| e.in_phase("restarting pods"))?
        {
            self.persist(record).await?;
            return Ok(RecoveryOutcome::Reset(reason));
        }
        self.persist(record).await?;

        self.complete(record).await
    }

    /// Collect, select and bootstrap
    async fn recover_cluster(&self, record: &mut RecoveryRecord) -> Result<()> {
        let pods: Vec<String> = self
            .pods
            .list_pods()
            .await?
            .iter()
            .map(|pod| pod.name_any())
            .collect();

        let collected = self.collect_states(&pods, record).await;
        self.persist_after(collected, record)
            .await
            .map_err(|e| e.in_phase("getting galera state"))?;

        if let Some(source) = complete_source(record, &pods) {
            self.bootstrap(&source, record)
                .await
                .map_err(|e| e.in_phase("bootstrapping"))?;
            return self.persist(record).await;
        }

        debug!("No pod is safe to bootstrap, running recovery mode");
        let recovered = self.recover_states(&pods, record).await;
        self.persist_after(recovered, record)
            .await
            .map_err(|e| e.in_phase("performing recovery"))?;

        let source = bootstrap_source(record).ok_or(Error::NoBootstrapSource)?;
        self.bootstrap(&source, record)
            .await
            .map_err(|e| e.in_phase("bootstrapping"))?;
        self.persist(record).await
    }

    async fn complete(&self, record: &mut RecoveryRecord) -> Result<RecoveryOutcome> {
        record.reset();
        self.persist(record).await?;

        info!(cluster = %self.cluster.name_any(), "Galera cluster recovered");
        self.events
            .publish(
                EventType::Normal,
                reasons::CLUSTER_RECOVERED,
                "Galera cluster recovered".to_string(),
            )
            .await;
        Ok(RecoveryOutcome::Completed)
    }

    /// Write the record, removing it from the status when empty
    async fn persist(&self, record: &RecoveryRecord) -> Result<()> {
        if record.is_empty() {
            self.store.write(None).await
        } else {
            self.store.write(Some(record)).await
        }
    }

    /// Persist partial progress of a phase, then report the phase result
    async fn persist_after(&self, phase: Result<()>, record: &RecoveryRecord) -> Result<()> {
        let persisted = self.persist(record).await;
        match (phase, persisted) {
            (Err(e), Err(persist_err)) => {
                warn!(error = %persist_err, "Failed to persist recovery progress");
                Err(e)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    /// Make sure `pod` is running, deleting it and waiting for its replacement otherwise
    async fn ensure_pod_running(&self, pod: &str, deadline: Instant) -> Result<()> {
        let current = self.get_pod(pod).await?;
        if is_pod_running(&current) {
            return Ok(());
        }

        info!(pod = pod, "Pod is not running, recreating it");
        self.pods.delete_pod(pod).await?;
        self.wait_for_pod_running(pod, current.metadata.uid.as_deref(), deadline)
            .await
    }

    /// Wait until `pod` runs. With `previous_uid` the pod must also have been recreated.
    async fn wait_for_pod_running(
        &self,
        pod: &str,
        previous_uid: Option<&str>,
        deadline: Instant,
    ) -> Result<()> {
        let this = self;
        poll_until_success(
            "pod to be running",
            deadline,
            self.config.poll_interval,
            move || async move {
                let current = this.get_pod(pod).await?;
                if previous_uid.is_some() && current.metadata.uid.as_deref() == previous_uid {
                    return Err(Error::TransientError(format!(
                        "pod '{}' has not been recreated yet",
                        pod
                    )));
                }
                if !is_pod_running(&current) {
                    return Err(Error::TransientError(format!(
                        "pod '{}' is not running",
                        pod
                    )));
                }
                Ok(())
            },
        )
        .await
    }

    async fn get_pod(&self, pod: &str) -> Result<Pod> {
        self.pods
            .get_pod(pod)
            .await?
            .ok_or_else(|| Error::NotFound(format!("pod '{}'", pod)))
    }
}
