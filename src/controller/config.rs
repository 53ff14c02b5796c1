//! Recovery configuration resolved from the GaleraCluster spec

use std::time::Duration;

use crate::controller::error::{Error, Result};
use crate::crd::GaleraCluster;

/// Default time the cluster must stay unhealthy before recovery starts
pub const DEFAULT_CLUSTER_HEALTHY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum age of a bootstrap attempt
pub const DEFAULT_CLUSTER_BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default per-pod timeout for state collection and recovery mode
pub const DEFAULT_POD_RECOVERY_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// Default timeout for restarting and syncing every pod
pub const DEFAULT_POD_SYNC_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Timeout for the agent to accept a bootstrap request
pub const BOOTSTRAP_ENABLE_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// Interval between attempts of a polled operation
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound for every configurable timeout
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Effective recovery settings for one cluster
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryConfig {
    pub enabled: bool,
    pub cluster_healthy_timeout: Duration,
    pub cluster_bootstrap_timeout: Duration,
    pub pod_recovery_timeout: Duration,
    pub pod_sync_timeout: Duration,
    pub bootstrap_enable_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cluster_healthy_timeout: DEFAULT_CLUSTER_HEALTHY_TIMEOUT,
            cluster_bootstrap_timeout: DEFAULT_CLUSTER_BOOTSTRAP_TIMEOUT,
            pod_recovery_timeout: DEFAULT_POD_RECOVERY_TIMEOUT,
            pod_sync_timeout: DEFAULT_POD_SYNC_TIMEOUT,
            bootstrap_enable_timeout: BOOTSTRAP_ENABLE_TIMEOUT,
            poll_interval: POLL_INTERVAL,
        }
    }
}

impl RecoveryConfig {
    /// Create config from cluster spec
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` if one of the durations cannot be parsed
    /// or exceeds [`MAX_TIMEOUT`].
    pub fn from_cluster(cluster: &GaleraCluster) -> Result<Self> {
        let spec = &cluster.spec.galera.recovery;
        let defaults = Self::default();

        Ok(Self {
            enabled: spec.enabled,
            cluster_healthy_timeout: duration_or(
                "clusterHealthyTimeout",
                spec.cluster_healthy_timeout.as_deref(),
                defaults.cluster_healthy_timeout,
            )?,
            cluster_bootstrap_timeout: duration_or(
                "clusterBootstrapTimeout",
                spec.cluster_bootstrap_timeout.as_deref(),
                defaults.cluster_bootstrap_timeout,
            )?,
            pod_recovery_timeout: duration_or(
                "podRecoveryTimeout",
                spec.pod_recovery_timeout.as_deref(),
                defaults.pod_recovery_timeout,
            )?,
            pod_sync_timeout: duration_or(
                "podSyncTimeout",
                spec.pod_sync_timeout.as_deref(),
                defaults.pod_sync_timeout,
            )?,
            ..defaults
        })
    }
}

fn duration_or(field: &str, value: Option<&str>, default: Duration) -> Result<Duration> {
    let Some(raw) = value else {
        return Ok(default);
    };
    let duration = parse_duration(raw).ok_or_else(|| {
        Error::InvalidConfig(format!("{} has an invalid duration: '{}'", field, raw))
    })?;
    if duration > MAX_TIMEOUT {
        return Err(Error::InvalidConfig(format!(
            "{} must not exceed {}h: '{}'",
            field,
            MAX_TIMEOUT.as_secs() / 3600,
            raw
        )));
    }
    Ok(duration)
}

/// Parse a duration such as "90s", "5m" or "1h". Bare numbers are seconds.
pub fn parse_duration(duration: &str) -> Option<Duration> {
    let duration = duration.trim();
    if duration.is_empty() {
        return None;
    }

    let (num_str, multiplier) = if let Some(n) = duration.strip_suffix('s') {
        (n, 1)
    } else if let Some(n) = duration.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = duration.strip_suffix('h') {
        (n, 3600)
    } else {
        (duration, 1)
    };

    let secs = num_str.trim().parse::<u64>().ok()?;
    if secs == 0 {
        return None;
    }
    secs.checked_mul(multiplier).map(Duration::from_secs)
}
