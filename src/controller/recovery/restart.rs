//! Pod restarts after the bootstrap
//!
//! The bootstrap pod is restarted first so it comes back as the primary
//! component. Every other member then restarts and joins it through SST/IST,
//! one at a time, in ordinal order.

use kube::runtime::events::EventType;
use tokio::time::Instant;
use tracing::{info, warn};

use super::{GaleraRecovery, ResetReason};
use crate::controller::error::{Error, Result};
use crate::controller::wait::poll_until_success;
use crate::crd::{GaleraCluster, RecoveryRecord};
use crate::resources::events::reasons;
use crate::resources::statefulset::{pod_index, pod_names};
use crate::resources::{AgentClientSet, EventSink, PodDirectory, ReplicationClient, StatusStore};

/// Order in which pods are restarted: the bootstrap pod, then the rest by ordinal
pub fn restart_order(cluster: &GaleraCluster, bootstrap_pod: &str) -> Vec<String> {
    std::iter::once(bootstrap_pod.to_string())
        .chain(
            pod_names(cluster)
                .into_iter()
                .filter(|name| name != bootstrap_pod),
        )
        .collect()
}

impl<P, A, R, S, E> GaleraRecovery<'_, P, A, R, S, E>
where
    P: PodDirectory,
    A: AgentClientSet,
    R: ReplicationClient,
    S: StatusStore,
    E: EventSink,
{
    /// Restart every pod and wait for it to sync
    ///
    /// Returns the reason when the record had to be reset instead.
    pub(super) async fn restart_pods(
        &self,
        record: &mut RecoveryRecord,
    ) -> Result<Option<ResetReason>> {
        let bootstrap_pod = record
            .bootstrap_pod()
            .ok_or(Error::NotBootstrapped)?
            .to_string();
        pod_index(&bootstrap_pod)?;

        let state = self.agents.node_state(&bootstrap_pod).await?;
        if !state.safe_to_bootstrap {
            warn!(pod = %bootstrap_pod, "Pod is no longer safe to bootstrap, resetting recovery");
            self.events
                .publish(
                    EventType::Warning,
                    reasons::POD_NOT_SAFE_TO_BOOTSTRAP,
                    format!("Pod '{}' is no longer safe to bootstrap", bootstrap_pod),
                )
                .await;
            record.reset();
            return Ok(Some(ResetReason::NotSafeToBootstrap));
        }

        let deadline = Instant::now() + self.config.pod_sync_timeout;
        for pod in restart_order(self.cluster, &bootstrap_pod) {
            if pod == bootstrap_pod {
                info!(pod = %pod, "Restarting bootstrap pod");
            } else {
                info!(pod = %pod, "Restarting pod");
            }

            if let Err(e) = self.restart_pod(&pod, deadline).await {
                if matches!(e, Error::PollTimeout { .. }) {
                    self.events
                        .publish(
                            EventType::Warning,
                            reasons::POD_SYNC_TIMEOUT,
                            format!("Timed out waiting for pod '{}' to be synced", pod),
                        )
                        .await;
                }
                return Err(e);
            }

            self.events
                .publish(
                    EventType::Normal,
                    reasons::POD_SYNCED,
                    format!("Pod '{}' is synced", pod),
                )
                .await;
        }

        record.set_pods_restarted(true);
        Ok(None)
    }

    /// Delete `pod`, then wait for its replacement to run and sync
    async fn restart_pod(&self, pod: &str, deadline: Instant) -> Result<()> {
        let index = pod_index(pod)?;
        let interval = self.config.poll_interval;
        let this = self;

        let previous_uid = poll_until_success("pod to be deleted", deadline, interval, move || async move {
            let current = this.get_pod(pod).await?;
            this.pods.delete_pod(pod).await?;
            Ok(current.metadata.uid)
        })
        .await?;

        this.wait_for_pod_running(pod, previous_uid.as_deref(), deadline)
            .await?;

        poll_until_success("pod to be synced", deadline, interval, move || async move {
            if this.replication.is_synced(index).await? {
                Ok(())
            } else {
                Err(Error::TransientError(format!("pod '{}' is not synced", pod)))
            }
        })
        .await
    }
}
