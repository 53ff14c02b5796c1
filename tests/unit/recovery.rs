//! Recovery orchestrator against in-memory collaborators
//!
//! Tests run with paused time: polling deadlines elapse as soon as every task
//! is waiting on a timer.

use galera_operator::controller::error::Error;
use std::time::Duration;

use galera_operator::controller::{RecoveryOutcome, ResetReason};
use galera_operator::crd::RecoveryRecord;
use galera_operator::resources::events::reasons;

use crate::common::*;

fn harness() -> Harness {
    Harness::new(create_test_cluster("galera", "default", 3))
}

/// Pod names failing inside a phase error
fn failed_pods(err: &Error) -> Vec<String> {
    match err {
        Error::PhaseError { source, .. } => failed_pods(source),
        Error::PodErrors(errors) => errors.pods().into_iter().map(String::from).collect(),
        other => panic!("expected pod errors, got {other}"),
    }
}

mod idempotence_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_restarted_record_without_bootstrap_is_a_no_op() {
        let h = harness();
        let mut record = RecoveryRecord::default();
        record.set_pods_restarted(true);
        let before = record.clone();

        let outcome = h.recovery().run(&mut record).await.unwrap();

        assert_eq!(outcome, RecoveryOutcome::AlreadyRestarted);
        assert!(!outcome.is_completed());
        assert_eq!(record, before);
        assert_eq!(h.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leftover_restarted_record_can_be_cleared() {
        let mut record = RecoveryRecord::default();
        record.set_pods_restarted(true);
        let h = harness().with_record(record);

        let recovery = h.recovery();
        assert_eq!(
            recovery.recover().await.unwrap(),
            RecoveryOutcome::AlreadyRestarted
        );
        recovery.clear_record().await.unwrap();

        assert!(h.store.current().is_none());
        assert!(h.events.reasons().is_empty());
        assert_eq!(h.agents.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarted_record_with_bootstrap_is_cleared() {
        let mut record = bootstrapping_record("galera-0", chrono::Duration::seconds(30));
        record.set_pods_restarted(true);
        let h = harness().with_record(record);

        let outcome = h.recovery().recover().await.unwrap();

        assert!(outcome.is_completed());
        assert!(h.store.current().is_none());
        assert!(h.pods.deleted().is_empty());
        assert_eq!(h.agents.total_calls(), 0);
    }
}

mod collection_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_known_states_are_not_fetched_again() {
        let h = harness().with_record(record_with(
            &[("galera-0", 5, false), ("galera-1", 6, false)],
            &[],
        ));
        h.agents.set_state("galera-2", node_state(7, true));

        let outcome = h.recovery().recover().await.unwrap();

        assert!(outcome.is_completed());
        assert_eq!(h.agents.count("node_state", "galera-0"), 0);
        assert_eq!(h.agents.count("node_state", "galera-1"), 0);
        // Once while collecting, once before restarting pods
        assert_eq!(h.agents.count("node_state", "galera-2"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_success_is_persisted() {
        let h = harness();
        h.agents.set_state("galera-0", node_state(5, false));
        h.agents.set_state("galera-2", node_state(6, false));
        h.agents.set_unreachable("galera-1");

        let err = h.recovery().recover().await.unwrap_err();

        assert_eq!(failed_pods(&err), vec!["galera-1"]);
        let record = h.store.current().unwrap();
        assert_eq!(record.states.len(), 2);
        assert_eq!(record.state("galera-0").map(|s| s.seqno), Some(5));
        assert_eq!(record.state("galera-2").map(|s| s.seqno), Some(6));
        assert!(record.bootstrap.is_none());
        assert!(h.agents.count("node_state", "galera-1") > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_pod_completes_despite_failing_sibling() {
        let h = harness();
        h.agents.set_state("galera-0", node_state(5, false));
        h.agents.set_state("galera-1", node_state(6, false));
        h.agents.set_delay("galera-1", Duration::from_secs(15));
        h.agents.set_unreachable("galera-2");
        h.agents.set_delay("galera-2", Duration::from_millis(10));
        let started = tokio::time::Instant::now();

        let err = h.recovery().recover().await.unwrap_err();

        assert_eq!(failed_pods(&err), vec!["galera-2"]);
        assert!(started.elapsed() >= Duration::from_secs(15));
        // Answered on the first attempt, after galera-2 had already failed several times
        assert_eq!(h.agents.count("node_state", "galera-1"), 1);
        assert!(h.agents.count("node_state", "galera-2") > 1);
        let record = h.store.current().unwrap();
        assert_eq!(record.state("galera-1").map(|s| s.seqno), Some(6));
        assert_eq!(record.states.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_failing_pod_is_reported() {
        let h = harness();
        h.agents.set_state("galera-1", node_state(5, false));
        h.agents.set_unreachable("galera-0");
        h.agents.set_unreachable("galera-2");

        let err = h.recovery().recover().await.unwrap_err();

        let mut pods = failed_pods(&err);
        pods.sort();
        assert_eq!(pods, vec!["galera-0", "galera-2"]);
        assert!(err.is_retryable());
        assert_eq!(h.store.current().unwrap().states.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pod_not_running_is_recreated_before_fetching() {
        let h = harness();
        h.pods.set_phase("galera-0", "Failed");
        h.agents.set_state("galera-0", node_state(3, false));
        h.agents.set_state("galera-1", node_state(4, true));
        h.agents.set_state("galera-2", node_state(2, false));

        h.recovery().recover().await.unwrap();

        let deleted = h.pods.deleted();
        // Recreated while collecting, then cycled by the restart sequence
        assert_eq!(deleted[0], "galera-0");
        assert_eq!(&deleted[1..], ["galera-1", "galera-0", "galera-2"]);
    }
}

mod recovery_mode_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_recovery_mode_runs_when_no_pod_is_safe() {
        let h = harness();
        for (pod, seqno) in [("galera-0", 5), ("galera-1", 9), ("galera-2", 3)] {
            h.agents.set_state(pod, node_state(-1, false));
            h.agents.set_recovered(pod, seqno);
        }

        let outcome = h.recovery().recover().await.unwrap();

        assert!(outcome.is_completed());
        for pod in ["galera-0", "galera-1", "galera-2"] {
            assert_eq!(h.agents.count("enable_recovery", pod), 1);
            assert_eq!(h.agents.count("start_recovery", pod), 1);
            assert_eq!(h.agents.count("disable_recovery", pod), 1);
        }

        let bootstraps = h.agents.bootstraps();
        assert_eq!(bootstraps.len(), 1);
        assert_eq!(bootstraps[0].0, "galera-1");
        assert_eq!(bootstraps[0].1.seqno, 9);
        assert_eq!(
            bootstraps[0].1.uuid,
            "6f3f2d4a-1c2b-11ee-9a4f-0242ac120002"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovered_pods_are_kept_on_failure() {
        let h = harness();
        for pod in ["galera-0", "galera-1", "galera-2"] {
            h.agents.set_state(pod, node_state(-1, false));
        }
        h.agents.set_recovered("galera-0", 5);
        h.agents.set_recovered("galera-1", 6);

        let err = h.recovery().recover().await.unwrap_err();

        assert_eq!(failed_pods(&err), vec!["galera-2"]);
        let record = h.store.current().unwrap();
        assert_eq!(record.recovered.len(), 2);
        assert!(record.recovered("galera-2").is_none());
        assert!(record.bootstrap.is_none());
        assert!(h.agents.bootstraps().is_empty());

        // Next reconciliation only recovers the missing pod
        h.agents.set_recovered("galera-2", 4);
        h.recovery().recover().await.unwrap();
        assert_eq!(h.agents.count("start_recovery", "galera-0"), 1);
        assert_eq!(h.agents.count("start_recovery", "galera-1"), 1);
        assert_eq!(h.agents.bootstraps()[0].0, "galera-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovered_seqno_survives_failed_disable() {
        let h = harness();
        for (pod, seqno) in [("galera-0", 5), ("galera-1", 6), ("galera-2", 8)] {
            h.agents.set_state(pod, node_state(-1, false));
            h.agents.set_recovered(pod, seqno);
        }
        h.agents.set_failing("disable_recovery", "galera-2");

        let err = h.recovery().recover().await.unwrap_err();

        assert_eq!(failed_pods(&err), vec!["galera-2"]);
        let record = h.store.current().unwrap();
        assert_eq!(record.recovered("galera-2").map(|r| r.seqno), Some(8));
        assert!(record.bootstrap.is_none());

        // Recovery mode is not repeated, galera-2 holds the latest data
        h.agents.clear_failing();
        h.recovery().recover().await.unwrap();
        assert_eq!(h.agents.count("start_recovery", "galera-2"), 1);
        assert_eq!(h.agents.bootstraps()[0].0, "galera-2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_pods_means_no_bootstrap_source() {
        let h = harness();
        for pod in ["galera-0", "galera-1", "galera-2"] {
            h.pods.remove(pod);
        }

        let err = h.recovery().recover().await.unwrap_err();
        assert!(matches!(err, Error::NoBootstrapSource));
    }
}

mod bootstrap_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_full_recovery_from_safe_state() {
        let h = harness();
        h.agents.set_state("galera-0", node_state(5, false));
        h.agents.set_state("galera-1", node_state(7, true));
        h.agents.set_state("galera-2", node_state(6, false));

        let outcome = h.recovery().recover().await.unwrap();

        assert!(outcome.is_completed());
        assert!(h.store.current().is_none());
        assert_eq!(h.agents.count("enable_recovery", "galera-0"), 0);

        let bootstraps = h.agents.bootstraps();
        assert_eq!(bootstraps.len(), 1);
        assert_eq!(bootstraps[0].0, "galera-1");
        assert_eq!(bootstraps[0].1.seqno, 7);

        let published = h.events.reasons();
        assert!(published.iter().any(|r| r == reasons::CLUSTER_BOOTSTRAP));
        assert_eq!(
            published.last().map(String::as_str),
            Some(reasons::CLUSTER_RECOVERED)
        );
        assert!(h.events.warnings().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_failure_is_not_recorded() {
        // galera-0 reported a safe state before its pod disappeared
        let h = harness().with_record(record_with(&[("galera-0", 5, true)], &[]));
        h.pods.remove("galera-0");
        h.agents.set_state("galera-1", node_state(4, false));
        h.agents.set_state("galera-2", node_state(4, false));

        let err = h.recovery().recover().await.unwrap_err();

        match &err {
            Error::PhaseError { phase, source } => {
                assert_eq!(*phase, "bootstrapping");
                assert!(matches!(**source, Error::PollTimeout { .. }));
            }
            other => panic!("expected a phase error, got {other}"),
        }
        let record = h.store.current().unwrap();
        assert!(record.bootstrap.is_none());
        assert_eq!(record.states.len(), 3);
        assert!(h.agents.bootstraps().is_empty());
    }
}

mod timeout_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_bootstrap_resets_everything() {
        let mut record = bootstrapping_record("galera-1", chrono::Duration::minutes(11));
        record.set_state("galera-0", node_state(3, false));
        record.set_recovered("galera-2", recovered(4));
        let h = harness().with_record(record);

        let outcome = h.recovery().recover().await.unwrap();

        assert_eq!(outcome, RecoveryOutcome::Reset(ResetReason::BootstrapTimeout));
        assert!(h.store.current().is_none());
        assert_eq!(h.agents.total_calls(), 0);
        assert!(h.pods.deleted().is_empty());
        assert_eq!(h.events.warnings(), vec![reasons::CLUSTER_BOOTSTRAP_TIMEOUT]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_bootstrap_resumes_restarts() {
        let h = harness().with_record(bootstrapping_record(
            "galera-1",
            chrono::Duration::minutes(2),
        ));
        h.agents.set_state("galera-1", node_state(10, true));

        let outcome = h.recovery().recover().await.unwrap();

        assert!(outcome.is_completed());
        assert_eq!(h.pods.list_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(h.agents.bootstraps().is_empty());
        assert_eq!(h.pods.deleted(), vec!["galera-1", "galera-0", "galera-2"]);
    }
}

mod restart_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_pod_restarts_first() {
        let h = harness().with_record(bootstrapping_record(
            "galera-2",
            chrono::Duration::seconds(5),
        ));
        h.agents.set_state("galera-2", node_state(10, true));
        let old_uid = h.pods.uid("galera-2");

        h.recovery().recover().await.unwrap();

        assert_eq!(h.pods.deleted(), vec!["galera-2", "galera-0", "galera-1"]);
        assert_eq!(h.replication.checked(), vec![2, 0, 1]);
        assert_ne!(h.pods.uid("galera-2"), old_uid);
        assert_eq!(
            h.events
                .reasons()
                .iter()
                .filter(|r| *r == reasons::POD_SYNCED)
                .count(),
            3
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_pod_no_longer_safe_resets() {
        let h = harness().with_record(bootstrapping_record(
            "galera-0",
            chrono::Duration::seconds(5),
        ));
        h.agents.set_state("galera-0", node_state(10, false));

        let outcome = h.recovery().recover().await.unwrap();

        assert_eq!(outcome, RecoveryOutcome::Reset(ResetReason::NotSafeToBootstrap));
        assert!(h.store.current().is_none());
        assert!(h.pods.deleted().is_empty());
        assert_eq!(h.events.warnings(), vec![reasons::POD_NOT_SAFE_TO_BOOTSTRAP]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_timeout_keeps_bootstrap() {
        let h = harness().with_record(bootstrapping_record(
            "galera-0",
            chrono::Duration::seconds(5),
        ));
        h.agents.set_state("galera-0", node_state(10, true));
        h.replication.set_lagging(1);

        let err = h.recovery().recover().await.unwrap_err();

        match &err {
            Error::PhaseError { phase, source } => {
                assert_eq!(*phase, "restarting pods");
                assert!(matches!(**source, Error::PollTimeout { .. }));
            }
            other => panic!("expected a phase error, got {other}"),
        }
        let record = h.store.current().unwrap();
        assert_eq!(record.bootstrap_pod(), Some("galera-0"));
        assert!(!record.pods_restarted);
        // galera-2 is never reached
        assert_eq!(h.pods.deleted(), vec!["galera-0", "galera-1"]);
        assert_eq!(h.events.warnings(), vec![reasons::POD_SYNC_TIMEOUT]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_bootstrap_agent_fails() {
        let h = harness().with_record(bootstrapping_record(
            "galera-0",
            chrono::Duration::seconds(5),
        ));
        h.agents.set_unreachable("galera-0");

        let err = h.recovery().recover().await.unwrap_err();

        assert!(err.is_retryable());
        assert!(h.store.current().unwrap().is_bootstrapping());
        assert!(h.pods.deleted().is_empty());
    }
}

mod health_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_running_synced_cluster_needs_no_recovery() {
        let h = harness();

        assert!(h.recovery().is_cluster_synced().await.unwrap());
        assert_eq!(h.replication.checked(), vec![0, 1, 2]);
        assert_eq!(h.agents.total_calls(), 0);
        assert!(h.pods.deleted().is_empty());
        assert_eq!(h.store.writes.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lagging_member_needs_recovery() {
        let h = harness();
        h.replication.set_lagging(1);

        assert!(!h.recovery().is_cluster_synced().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_or_stopped_member_needs_recovery() {
        let h = harness();
        h.pods.set_phase("galera-0", "Pending");
        assert!(!h.recovery().is_cluster_synced().await.unwrap());

        let h = harness();
        h.pods.remove("galera-2");
        assert!(!h.recovery().is_cluster_synced().await.unwrap());
    }
}
