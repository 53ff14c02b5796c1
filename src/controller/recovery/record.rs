//! Accessors and phase derivation for the persisted recovery record

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use crate::crd::{BootstrapAttempt, NodeState, RecoveredBootstrap, RecoveryRecord};

/// Phase of a recovery, derived from what the record holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecoveryPhase {
    /// No recovery in progress
    Idle,
    /// Node states are being fetched
    CollectingState,
    /// No node is safe to bootstrap, sequence numbers are being recovered
    Recovering,
    /// A bootstrap source is known but no bootstrap has been committed
    Bootstrapping,
    /// Bootstrap committed, pods are being restarted
    RestartingPods,
    /// Every pod has been restarted, the record is about to be cleared
    Completed,
}

impl RecoveryPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryPhase::Idle => "Idle",
            RecoveryPhase::CollectingState => "CollectingState",
            RecoveryPhase::Recovering => "Recovering",
            RecoveryPhase::Bootstrapping => "Bootstrapping",
            RecoveryPhase::RestartingPods => "RestartingPods",
            RecoveryPhase::Completed => "Completed",
        }
    }
}

impl fmt::Display for RecoveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RecoveryRecord {
    /// True when nothing has been recorded. An empty record is persisted as absent.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
            && self.recovered.is_empty()
            && self.bootstrap.is_none()
            && !self.pods_restarted
    }

    /// Drop all progress
    pub fn reset(&mut self) {
        *self = RecoveryRecord::default();
    }

    pub fn state(&self, pod: &str) -> Option<&NodeState> {
        self.states.get(pod)
    }

    pub fn set_state(&mut self, pod: impl Into<String>, state: NodeState) {
        self.states.insert(pod.into(), state);
    }

    pub fn recovered(&self, pod: &str) -> Option<&RecoveredBootstrap> {
        self.recovered.get(pod)
    }

    pub fn set_recovered(&mut self, pod: impl Into<String>, recovered: RecoveredBootstrap) {
        self.recovered.insert(pod.into(), recovered);
    }

    /// Pod a bootstrap has been committed for
    pub fn bootstrap_pod(&self) -> Option<&str> {
        self.bootstrap.as_ref().map(|b| b.pod.as_str())
    }

    pub fn is_bootstrapping(&self) -> bool {
        self.bootstrap.is_some()
    }

    /// Record that `pod` accepted the bootstrap at `now`
    pub fn set_bootstrapping(&mut self, pod: impl Into<String>, now: DateTime<Utc>) {
        self.bootstrap = Some(BootstrapAttempt {
            pod: pod.into(),
            started_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        });
    }

    pub fn set_pods_restarted(&mut self, restarted: bool) {
        self.pods_restarted = restarted;
    }

    /// Whether the committed bootstrap is older than `timeout`
    ///
    /// A start time that cannot be parsed counts as timed out, so a corrupted
    /// record is discarded rather than blocking recovery forever.
    pub fn bootstrap_timed_out(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        let Some(attempt) = &self.bootstrap else {
            return false;
        };

        match DateTime::parse_from_rfc3339(&attempt.started_at) {
            Ok(started) => match (now - started.with_timezone(&Utc)).to_std() {
                Ok(age) => age > timeout,
                // Started in the future
                Err(_) => false,
            },
            Err(e) => {
                warn!(
                    pod = %attempt.pod,
                    started_at = %attempt.started_at,
                    error = %e,
                    "Unparsable bootstrap start time"
                );
                true
            }
        }
    }

    /// Phase of the recovery this record describes
    pub fn phase(&self) -> RecoveryPhase {
        if self.pods_restarted {
            return RecoveryPhase::Completed;
        }
        if self.bootstrap.is_some() {
            return RecoveryPhase::RestartingPods;
        }
        if !self.recovered.is_empty() {
            return RecoveryPhase::Recovering;
        }
        if self.states.values().any(|s| s.safe_to_bootstrap) {
            return RecoveryPhase::Bootstrapping;
        }
        if !self.states.is_empty() {
            return RecoveryPhase::CollectingState;
        }
        RecoveryPhase::Idle
    }
}
