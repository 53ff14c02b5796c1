//! Node state collection

use futures::future::join_all;
use kube::runtime::events::EventType;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::GaleraRecovery;
use crate::controller::error::{PodErrors, Result};
use crate::controller::wait::poll_until_success;
use crate::crd::{NodeState, RecoveryRecord};
use crate::resources::events::reasons;
use crate::resources::{AgentClientSet, EventSink, PodDirectory, ReplicationClient, StatusStore};

impl<P, A, R, S, E> GaleraRecovery<'_, P, A, R, S, E>
where
    P: PodDirectory,
    A: AgentClientSet,
    R: ReplicationClient,
    S: StatusStore,
    E: EventSink,
{
    /// Fetch the Galera state of every pod missing from `record`
    ///
    /// Pods are queried concurrently and every query runs to completion.
    /// Successful results are stored even when other pods fail.
    pub(super) async fn collect_states(
        &self,
        pods: &[String],
        record: &mut RecoveryRecord,
    ) -> Result<()> {
        let mut tasks = Vec::new();
        for pod in pods {
            if record.state(pod).is_some() {
                debug!(pod = %pod, "Skipping pod with known Galera state");
                continue;
            }
            let pod = pod.clone();
            tasks.push(async move {
                let result = self.fetch_state(&pod).await;
                (pod, result)
            });
        }

        let mut errors = PodErrors::new();
        for (pod, result) in join_all(tasks).await {
            match result {
                Ok(state) => record.set_state(pod, state),
                Err(e) => {
                    warn!(pod = %pod, error = %e, "Failed to get Galera state");
                    errors.push(pod, e);
                }
            }
        }
        errors.into_result()
    }

    async fn fetch_state(&self, pod: &str) -> Result<NodeState> {
        let deadline = Instant::now() + self.config.pod_recovery_timeout;
        let this = self;

        let state = poll_until_success(
            "galera state",
            deadline,
            self.config.poll_interval,
            move || async move {
                this.ensure_pod_running(pod, deadline).await?;
                this.agents.node_state(pod).await
            },
        )
        .await?;

        info!(
            pod = pod,
            seqno = state.seqno,
            safe_to_bootstrap = state.safe_to_bootstrap,
            "Fetched Galera state"
        );
        self.events
            .publish(
                EventType::Normal,
                reasons::POD_STATE_FETCHED,
                format!("Fetched Galera state from pod '{}'", pod),
            )
            .await;
        Ok(state)
    }
}
