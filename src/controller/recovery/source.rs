//! Bootstrap source selection
//!
//! Choosing the wrong node discards committed transactions, so the choice is a
//! pure function of the recovery record:
//!
//! 1. A node whose `grastate.dat` is marked `safe_to_bootstrap`, highest seqno first.
//! 2. Otherwise the node with the highest seqno certified by recovery mode.
//!
//! Ties go to the lowest ordinal.

use std::cmp::Ordering;
use std::fmt;

use crate::crd::RecoveryRecord;
use crate::resources::Bootstrap;
use crate::resources::statefulset::compare_pod_names;

/// Where the chosen sequence number came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceOrigin {
    /// `grastate.dat` of a node marked safe to bootstrap
    State,
    /// Recovery mode
    Recovered,
}

impl fmt::Display for SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceOrigin::State => f.write_str("state"),
            SourceOrigin::Recovered => f.write_str("recovered"),
        }
    }
}

/// Node chosen to bootstrap the new cluster view
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapSource {
    pub pod: String,
    pub bootstrap: Bootstrap,
    pub origin: SourceOrigin,
}

/// Higher seqno wins, then the lower ordinal
fn better(a: (&str, i64), b: (&str, i64)) -> Ordering {
    a.1.cmp(&b.1).then_with(|| compare_pod_names(b.0, a.0))
}

/// Select the bootstrap source, `None` when no node qualifies yet
pub fn bootstrap_source(record: &RecoveryRecord) -> Option<BootstrapSource> {
    let safe = record
        .states
        .iter()
        .filter(|(_, state)| state.safe_to_bootstrap)
        .max_by(|(a, sa), (b, sb)| better((a.as_str(), sa.seqno), (b.as_str(), sb.seqno)));

    if let Some((pod, state)) = safe {
        return Some(BootstrapSource {
            pod: pod.clone(),
            bootstrap: Bootstrap {
                uuid: state.uuid.clone(),
                seqno: state.seqno,
            },
            origin: SourceOrigin::State,
        });
    }

    let (pod, recovered) = record
        .recovered
        .iter()
        .max_by(|(a, ra), (b, rb)| better((a.as_str(), ra.seqno), (b.as_str(), rb.seqno)))?;

    // Older agents only report the seqno; the uuid is the cluster's
    let uuid = if recovered.uuid.is_empty() {
        record
            .states
            .get(pod)
            .map(|s| s.uuid.clone())
            .unwrap_or_default()
    } else {
        recovered.uuid.clone()
    };

    Some(BootstrapSource {
        pod: pod.clone(),
        bootstrap: Bootstrap {
            uuid,
            seqno: recovered.seqno,
        },
        origin: SourceOrigin::Recovered,
    })
}
