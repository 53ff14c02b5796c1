//! Prometheus metrics for the recovery controller
//!
//! The registry is encoded with [`Metrics::encode`]; serving it over HTTP is
//! left to the embedding binary.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

/// Labels identifying a cluster
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ClusterLabels {
    pub namespace: String,
    pub name: String,
}

impl ClusterLabels {
    fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl prometheus_client::encoding::EncodeLabelSet for ClusterLabels {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder<'_>,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("name", self.name.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for recovery resets
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ResetLabels {
    pub namespace: String,
    pub name: String,
    pub reason: String,
}

impl prometheus_client::encoding::EncodeLabelSet for ResetLabels {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder<'_>,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("name", self.name.as_str()).encode(encoder.encode_label())?;
        ("reason", self.reason.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics state
pub struct Metrics {
    /// Total reconciliations counter
    pub reconciliations_total: Family<ClusterLabels, Counter>,
    /// Failed reconciliations counter
    pub reconciliation_errors_total: Family<ClusterLabels, Counter>,
    /// Reconciliation duration histogram
    pub reconcile_duration_seconds: Family<ClusterLabels, Histogram>,
    /// Recovery records discarded, by reason
    pub recovery_resets_total: Family<ResetLabels, Counter>,
    /// Recoveries that brought the cluster back
    pub recoveries_completed_total: Family<ClusterLabels, Counter>,
    /// 1 while a recovery is in progress
    pub recovery_in_progress: Family<ClusterLabels, Gauge>,

    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let reconciliations_total = Family::<ClusterLabels, Counter>::default();
        registry.register(
            "galera_operator_reconciliations",
            "Total number of reconciliations",
            reconciliations_total.clone(),
        );

        let reconciliation_errors_total = Family::<ClusterLabels, Counter>::default();
        registry.register(
            "galera_operator_reconciliation_errors",
            "Total number of reconciliation errors",
            reconciliation_errors_total.clone(),
        );

        // Recovery waits on pods, so buckets reach well past a minute
        let reconcile_duration_seconds =
            Family::<ClusterLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.01, 2.0, 16))
            });
        registry.register(
            "galera_operator_reconcile_duration_seconds",
            "Duration of reconciliation in seconds",
            reconcile_duration_seconds.clone(),
        );

        let recovery_resets_total = Family::<ResetLabels, Counter>::default();
        registry.register(
            "galera_operator_recovery_resets",
            "Number of recovery attempts discarded and started over",
            recovery_resets_total.clone(),
        );

        let recoveries_completed_total = Family::<ClusterLabels, Counter>::default();
        registry.register(
            "galera_operator_recoveries_completed",
            "Number of completed Galera cluster recoveries",
            recoveries_completed_total.clone(),
        );

        let recovery_in_progress = Family::<ClusterLabels, Gauge>::default();
        registry.register(
            "galera_operator_recovery_in_progress",
            "Whether a Galera cluster recovery is in progress",
            recovery_in_progress.clone(),
        );

        Self {
            reconciliations_total,
            reconciliation_errors_total,
            reconcile_duration_seconds,
            recovery_resets_total,
            recoveries_completed_total,
            recovery_in_progress,
            registry,
        }
    }

    /// Record a successful reconciliation
    pub fn record_reconcile(&self, namespace: &str, name: &str, duration_secs: f64) {
        let labels = ClusterLabels::new(namespace, name);
        self.reconciliations_total.get_or_create(&labels).inc();
        self.reconcile_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record a failed reconciliation
    pub fn record_error(&self, namespace: &str, name: &str) {
        let labels = ClusterLabels::new(namespace, name);
        self.reconciliation_errors_total
            .get_or_create(&labels)
            .inc();
    }

    pub fn record_reset(&self, namespace: &str, name: &str, reason: &str) {
        let labels = ResetLabels {
            namespace: namespace.to_string(),
            name: name.to_string(),
            reason: reason.to_string(),
        };
        self.recovery_resets_total.get_or_create(&labels).inc();
    }

    pub fn record_recovery_completed(&self, namespace: &str, name: &str) {
        let labels = ClusterLabels::new(namespace, name);
        self.recoveries_completed_total.get_or_create(&labels).inc();
    }

    pub fn set_recovery_in_progress(&self, namespace: &str, name: &str, in_progress: bool) {
        let labels = ClusterLabels::new(namespace, name);
        self.recovery_in_progress
            .get_or_create(&labels)
            .set(i64::from(in_progress));
    }

    /// Encode metrics to Prometheus text format
    ///
    /// Returns an empty string if encoding fails.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = encode(&mut buffer, &self.registry) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        buffer
    }
}
