//! Recovery mode
//!
//! A node that is not marked safe to bootstrap may still hold the latest data,
//! its `grastate.dat` just could not prove it (unclean shutdown). Recovery mode
//! restarts mysqld with `--wsrep-recover`, which reads the InnoDB logs and
//! reports the last committed position.

use futures::future::join_all;
use kube::runtime::events::EventType;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::GaleraRecovery;
use crate::controller::error::{PodErrors, Result};
use crate::controller::wait::poll_until_success;
use crate::crd::{RecoveredBootstrap, RecoveryRecord};
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
    /// Run recovery mode on every pod missing from `record.recovered`
    pub(super) async fn recover_states(
        &self,
        pods: &[String],
        record: &mut RecoveryRecord,
    ) -> Result<()> {
        let mut tasks = Vec::new();
        for pod in pods {
            if record.recovered(pod).is_some() {
                debug!(pod = %pod, "Skipping recovered pod");
                continue;
            }
            let pod = pod.clone();
            tasks.push(async move {
                let (recovered, result) = self.recover_pod(&pod).await;
                (pod, recovered, result)
            });
        }

        let mut errors = PodErrors::new();
        for (pod, recovered, result) in join_all(tasks).await {
            if let Some(recovered) = recovered {
                record.set_recovered(pod.clone(), recovered);
            }
            if let Err(e) = result {
                warn!(pod = %pod, error = %e, "Failed to recover pod");
                errors.push(pod, e);
            }
        }
        errors.into_result()
    }

    /// Enable, run and disable recovery mode in `pod`
    ///
    /// The recovered position is returned as soon as it is known, even if
    /// leaving recovery mode fails afterwards.
    async fn recover_pod(&self, pod: &str) -> (Option<RecoveredBootstrap>, Result<()>) {
        let deadline = Instant::now() + self.config.pod_recovery_timeout;
        let interval = self.config.poll_interval;
        let this = self;

        debug!(pod = pod, "Enabling recovery");
        if let Err(e) = poll_until_success("recovery to be enabled", deadline, interval, move || async move {
            this.ensure_pod_running(pod, deadline).await?;
            this.agents.enable_recovery(pod).await
        })
        .await
        {
            return (None, Err(e));
        }

        debug!(pod = pod, "Performing recovery");
        let recovered = match poll_until_success("recovery", deadline, interval, move || async move {
            this.ensure_pod_running(pod, deadline).await?;
            this.agents.start_recovery(pod).await
        })
        .await
        {
            Ok(recovered) => recovered,
            Err(e) => return (None, Err(e)),
        };

        info!(pod = pod, seqno = recovered.seqno, "Recovered Galera sequence in pod");
        self.events
            .publish(
                EventType::Normal,
                reasons::POD_RECOVERED,
                format!("Recovered Galera sequence in pod '{}'", pod),
            )
            .await;

        debug!(pod = pod, "Disabling recovery");
        let disabled = poll_until_success("recovery to be disabled", deadline, interval, move || async move {
            this.ensure_pod_running(pod, deadline).await?;
            this.agents.disable_recovery(pod).await
        })
        .await;

        (Some(recovered), disabled)
    }
}
