//! Bootstrap of a new cluster view

use chrono::Utc;
use kube::runtime::events::EventType;
use tokio::time::Instant;
use tracing::info;

use super::{BootstrapSource, GaleraRecovery};
use crate::controller::error::Result;
use crate::controller::wait::poll_until_success;
use crate::crd::RecoveryRecord;
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
    /// Make the source pod bootstrap the cluster and record the attempt
    pub(super) async fn bootstrap(
        &self,
        source: &BootstrapSource,
        record: &mut RecoveryRecord,
    ) -> Result<()> {
        let pod = source.pod.as_str();
        let bootstrap = &source.bootstrap;

        info!(
            pod = pod,
            seqno = bootstrap.seqno,
            uuid = %bootstrap.uuid,
            origin = %source.origin,
            "Bootstrapping cluster"
        );
        self.events
            .publish(
                EventType::Normal,
                reasons::CLUSTER_BOOTSTRAP,
                format!("Bootstrapping Galera cluster in pod '{}'", pod),
            )
            .await;

        let deadline = Instant::now() + self.config.bootstrap_enable_timeout;
        let this = self;
        poll_until_success(
            "bootstrap to be enabled",
            deadline,
            self.config.poll_interval,
            move || async move {
                this.ensure_pod_running(pod, deadline).await?;
                this.agents.enable_bootstrap(pod, bootstrap).await
            },
        )
        .await?;

        record.set_bootstrapping(pod, Utc::now());
        Ok(())
    }
}
