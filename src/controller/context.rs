use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use kube::Client;

use crate::controller::error::BackoffConfig;
use crate::metrics::Metrics;

/// Shared context for the controller
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Metrics, when the embedding binary exposes them
    pub metrics: Option<Arc<Metrics>>,
    /// Requeue delays after failed reconciliations
    pub backoff: BackoffConfig,
    /// Consecutive failures per cluster, keyed by `namespace/name`
    failures: Arc<Mutex<HashMap<String, u32>>>,
}

impl Context {
    pub fn new(client: Client, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            client,
            metrics,
            backoff: BackoffConfig::default(),
            failures: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count a failed reconciliation and return the number of failures before it
    pub fn record_failure(&self, key: &str) -> u32 {
        let Ok(mut failures) = self.failures.lock() else {
            return 0;
        };
        let count = failures.entry(key.to_string()).or_insert(0);
        let previous = *count;
        *count = count.saturating_add(1);
        previous
    }

    pub fn reset_failures(&self, key: &str) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.remove(key);
        }
    }
}
