//! Recovery configuration and triggering

use std::time::Duration;

use chrono::Utc;
use galera_operator::controller::{
    RecoveryConfig, RecoveryPhase, RecoveryTrigger, recovery_trigger,
};
use galera_operator::crd::GaleraRecoverySpec;

use crate::common::*;

#[test]
fn test_defaults() {
    let cluster = create_test_cluster("galera", "default", 3);
    let config = RecoveryConfig::from_cluster(&cluster).unwrap();

    assert!(config.enabled);
    assert_eq!(config.cluster_healthy_timeout, Duration::from_secs(30));
    assert_eq!(config.cluster_bootstrap_timeout, Duration::from_secs(600));
    assert_eq!(config.pod_recovery_timeout, Duration::from_secs(180));
    assert_eq!(config.pod_sync_timeout, Duration::from_secs(300));
    assert_eq!(config.bootstrap_enable_timeout, Duration::from_secs(180));
}

#[test]
fn test_overrides() {
    let cluster = GaleraClusterBuilder::new("galera", "default")
        .with_recovery(GaleraRecoverySpec {
            enabled: false,
            cluster_healthy_timeout: Some("1m".to_string()),
            cluster_bootstrap_timeout: Some("1h".to_string()),
            pod_recovery_timeout: Some("90".to_string()),
            pod_sync_timeout: Some("10m".to_string()),
        })
        .build();
    let config = RecoveryConfig::from_cluster(&cluster).unwrap();

    assert!(!config.enabled);
    assert_eq!(config.cluster_healthy_timeout, Duration::from_secs(60));
    assert_eq!(config.cluster_bootstrap_timeout, Duration::from_secs(3600));
    assert_eq!(config.pod_recovery_timeout, Duration::from_secs(90));
    assert_eq!(config.pod_sync_timeout, Duration::from_secs(600));
}

#[test]
fn test_invalid_duration_is_rejected() {
    let cluster = GaleraClusterBuilder::new("galera", "default")
        .with_recovery(GaleraRecoverySpec {
            pod_sync_timeout: Some("soon".to_string()),
            ..Default::default()
        })
        .build();

    let err = RecoveryConfig::from_cluster(&cluster).unwrap_err();
    assert!(err.to_string().contains("podSyncTimeout"));
    assert!(!err.is_retryable());
}

#[test]
fn test_oversized_duration_is_rejected() {
    for raw in ["10000000000000000h", "9223372036854775807s", "25h"] {
        let cluster = GaleraClusterBuilder::new("galera", "default")
            .with_recovery(GaleraRecoverySpec {
                pod_recovery_timeout: Some(raw.to_string()),
                ..Default::default()
            })
            .build();

        let err = RecoveryConfig::from_cluster(&cluster).unwrap_err();
        assert!(err.to_string().contains("podRecoveryTimeout"), "{raw}: {err}");
    }
}

#[test]
fn test_trigger_uses_configured_healthy_timeout() {
    let now = Utc::now();
    let cluster = GaleraClusterBuilder::new("galera", "default")
        .with_recovery(GaleraRecoverySpec {
            cluster_healthy_timeout: Some("2m".to_string()),
            ..Default::default()
        })
        .with_galera_ready("False", now - chrono::Duration::seconds(90))
        .build();
    let config = RecoveryConfig::from_cluster(&cluster).unwrap();

    assert_eq!(
        recovery_trigger(&cluster, &config, now),
        RecoveryTrigger::Pending(Duration::from_secs(30))
    );
    assert_eq!(
        recovery_trigger(&cluster, &config, now + chrono::Duration::seconds(31)),
        RecoveryTrigger::Unhealthy
    );
}

#[test]
fn test_trigger_resumes_persisted_recovery() {
    let cluster = GaleraClusterBuilder::new("galera", "default")
        .with_galera_ready("True", Utc::now())
        .with_record(record_with(&[("galera-0", 3, false)], &[]))
        .build();

    assert_eq!(
        recovery_trigger(&cluster, &RecoveryConfig::default(), Utc::now()),
        RecoveryTrigger::InProgress(RecoveryPhase::CollectingState)
    );
}
