//! Reconciliation logic for GaleraCluster resources
//!
//! Recovery starts once the `GaleraReady` condition maintained by the workload
//! reconciler has been `False` for longer than `clusterHealthyTimeout`, and
//! keeps being driven on every reconciliation while a recovery record exists.
//! A cluster whose members all run and are synced is left alone, whatever the
//! condition says.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::ResourceExt;
use kube::runtime::controller::Action;
use tracing::{debug, error, info, instrument, warn};

use crate::controller::config::RecoveryConfig;
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::recovery::{GaleraRecovery, RecoveryOutcome, RecoveryPhase};
use crate::crd::GaleraCluster;
use crate::metrics::Metrics;
use crate::resources::{
    HttpAgentClientSet, KubeEventSink, KubePodDirectory, KubeStatusStore,
    PodReadinessReplicationClient,
};

/// Condition reporting whether the Galera cluster is healthy
pub const GALERA_READY_CONDITION: &str = "GaleraReady";

/// Requeue interval while the cluster is healthy
const HEALTHY_REQUEUE: Duration = Duration::from_secs(30);

/// Requeue interval while a recovery is in progress
const RECOVERY_REQUEUE: Duration = Duration::from_secs(5);

/// Why a reconciliation does or does not run recovery
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryTrigger {
    /// The cluster is healthy
    Healthy,
    /// Unhealthy, but not for long enough. Holds the remaining wait.
    Pending(Duration),
    /// A recovery record exists. Holds the phase it was left in.
    InProgress(RecoveryPhase),
    /// Unhealthy for longer than `clusterHealthyTimeout`
    Unhealthy,
}

/// How long `GaleraReady` has been `False`, `None` when the cluster is healthy
///
/// A transition time that cannot be parsed counts as "just now".
pub fn unhealthy_for(cluster: &GaleraCluster, now: DateTime<Utc>) -> Option<Duration> {
    let condition = cluster
        .status
        .as_ref()?
        .conditions
        .iter()
        .find(|c| c.type_ == GALERA_READY_CONDITION)?;
    if condition.status != "False" {
        return None;
    }

    match DateTime::parse_from_rfc3339(&condition.last_transition_time) {
        Ok(since) => Some(
            (now - since.with_timezone(&Utc))
                .to_std()
                .unwrap_or(Duration::ZERO),
        ),
        Err(e) => {
            warn!(
                time = %condition.last_transition_time,
                error = %e,
                "Unparsable GaleraReady transition time"
            );
            Some(Duration::ZERO)
        }
    }
}

/// Decide whether recovery must run for `cluster`
pub fn recovery_trigger(
    cluster: &GaleraCluster,
    config: &RecoveryConfig,
    now: DateTime<Utc>,
) -> RecoveryTrigger {
    let record = cluster
        .status
        .as_ref()
        .and_then(|s| s.galera_recovery.as_ref())
        .filter(|record| !record.is_empty());
    if let Some(record) = record {
        return RecoveryTrigger::InProgress(record.phase());
    }

    match unhealthy_for(cluster, now) {
        None => RecoveryTrigger::Healthy,
        Some(elapsed) if elapsed < config.cluster_healthy_timeout => {
            RecoveryTrigger::Pending(config.cluster_healthy_timeout - elapsed)
        }
        Some(_) => RecoveryTrigger::Unhealthy,
    }
}

fn object_key(cluster: &GaleraCluster) -> String {
    format!(
        "{}/{}",
        cluster.namespace().unwrap_or_default(),
        cluster.name_any()
    )
}

/// Main reconciliation function
#[instrument(skip(cluster, ctx), fields(name = %cluster.name_any(), namespace = cluster.namespace().unwrap_or_default()))]
pub async fn reconcile(cluster: Arc<GaleraCluster>, ctx: Arc<Context>) -> Result<Action> {
    let start = std::time::Instant::now();
    let ns = cluster
        .namespace()
        .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
    let name = cluster.name_any();

    let result = reconcile_recovery(&cluster, &ctx, &ns, &name).await;

    match &result {
        Ok(_) => {
            ctx.reset_failures(&object_key(&cluster));
            if let Some(metrics) = &ctx.metrics {
                metrics.record_reconcile(&ns, &name, start.elapsed().as_secs_f64());
            }
        }
        Err(e) => {
            error!("Galera recovery failed: {}", e);
            if let Some(metrics) = &ctx.metrics {
                metrics.record_error(&ns, &name);
            }
        }
    }
    result
}

async fn reconcile_recovery(
    cluster: &GaleraCluster,
    ctx: &Context,
    ns: &str,
    name: &str,
) -> Result<Action> {
    let config = RecoveryConfig::from_cluster(cluster)?;
    if !config.enabled {
        debug!("Galera recovery disabled");
        return Ok(Action::await_change());
    }

    let trigger = recovery_trigger(cluster, &config, Utc::now());
    match trigger {
        RecoveryTrigger::Healthy => return Ok(Action::requeue(HEALTHY_REQUEUE)),
        RecoveryTrigger::Pending(remaining) => {
            debug!(remaining = ?remaining, "Cluster unhealthy, waiting before recovery");
            return Ok(Action::requeue(remaining));
        }
        RecoveryTrigger::InProgress(phase) => info!(phase = %phase, "Resuming Galera recovery"),
        RecoveryTrigger::Unhealthy => info!(
            timeout = ?config.cluster_healthy_timeout,
            "Galera cluster unhealthy, starting recovery"
        ),
    }

    let pods = KubePodDirectory::new(ctx.client.clone(), cluster);
    let agents = HttpAgentClientSet::new(cluster);
    let replication = PodReadinessReplicationClient::new(ctx.client.clone(), cluster);
    let store = KubeStatusStore::new(ctx.client.clone(), cluster);
    let events = KubeEventSink::new(ctx.client.clone(), cluster);

    let recovery = GaleraRecovery::new(
        cluster,
        config,
        &pods,
        &agents,
        &replication,
        &store,
        &events,
    );

    if trigger == RecoveryTrigger::Unhealthy && recovery.is_cluster_synced().await? {
        info!("Every Galera member is running and synced, skipping recovery");
        return Ok(Action::requeue(HEALTHY_REQUEUE));
    }

    if let Some(metrics) = &ctx.metrics {
        metrics.set_recovery_in_progress(ns, name, true);
    }

    let outcome = recovery.recover().await?;
    if outcome == RecoveryOutcome::AlreadyRestarted {
        debug!("Clearing leftover recovery record");
        recovery.clear_record().await?;
    }

    Ok(outcome_action(ctx.metrics.as_deref(), ns, name, outcome))
}

fn outcome_action(
    metrics: Option<&Metrics>,
    ns: &str,
    name: &str,
    outcome: RecoveryOutcome,
) -> Action {
    match outcome {
        RecoveryOutcome::Reset(reason) => {
            warn!(reason = reason.as_str(), "Galera recovery reset");
            if let Some(metrics) = metrics {
                metrics.record_reset(ns, name, reason.as_str());
            }
            Action::requeue(RECOVERY_REQUEUE)
        }
        RecoveryOutcome::Completed => {
            info!("Galera recovery completed");
            if let Some(metrics) = metrics {
                metrics.record_recovery_completed(ns, name);
                metrics.set_recovery_in_progress(ns, name, false);
            }
            Action::requeue(HEALTHY_REQUEUE)
        }
        RecoveryOutcome::AlreadyRestarted => {
            if let Some(metrics) = metrics {
                metrics.set_recovery_in_progress(ns, name, false);
            }
            Action::requeue(HEALTHY_REQUEUE)
        }
    }
}

/// Error policy for the controller with exponential backoff
pub fn error_policy(cluster: Arc<GaleraCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = cluster.name_any();
    let attempt = ctx.record_failure(&object_key(&cluster));
    let delay = ctx.backoff.delay_for_error(error, attempt);

    if error.is_retryable() {
        warn!(
            "Retryable error for {} (attempt {}): {}, requeuing in {:?}",
            name,
            attempt + 1,
            error,
            delay
        );
    } else {
        error!(
            "Non-retryable error for {}: {}, requeuing in {:?} for manual intervention",
            name, error, delay
        );
    }

    Action::requeue(delay)
}
