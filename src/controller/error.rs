//! Error types for the GaleraCluster controller

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::resources::agent::AgentError;

/// Error variants are named with the `Error` suffix for clarity (e.g., `KubeError`, `AgentError`).
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Agent error: {0}")]
    AgentError(#[from] AgentError),

    #[error("Missing object key: {0}")]
    MissingObjectKey(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid pod name: {0}")]
    InvalidPodName(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Timed out after {timeout:?} waiting for {operation}: {last_error}")]
    PollTimeout {
        operation: String,
        timeout: Duration,
        last_error: String,
    },

    #[error("{0}")]
    PodErrors(PodErrors),

    #[error("Unable to restart pods: cluster has not been bootstrapped")]
    NotBootstrapped,

    #[error("No bootstrap source available")]
    NoBootstrapSource,

    #[error("Error {phase}: {source}")]
    PhaseError {
        phase: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("Transient error (will retry): {0}")]
    TransientError(String),
}

impl Error {
    /// Wrap an error with the recovery phase it occurred in
    pub fn in_phase(self, phase: &'static str) -> Self {
        Error::PhaseError {
            phase,
            source: Box::new(self),
        }
    }

    /// Check if this error indicates a resource was not found
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::KubeError(e) => matches!(e, kube::Error::Api(api_err) if api_err.code == 404),
            Error::PhaseError { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::KubeError(e) => match e {
                kube::Error::Api(api_err) => {
                    // 4xx errors (except 409 Conflict, 429 TooManyRequests) are usually not retryable
                    let code = api_err.code;
                    if (400..500).contains(&code) {
                        return code == 409 || code == 429;
                    }
                    true
                }
                _ => true,
            },
            Error::PhaseError { source, .. } => source.is_retryable(),
            Error::PodErrors(errors) => errors.iter().any(|(_, e)| e.is_retryable()),
            // Configuration errors need user intervention
            Error::InvalidConfig(_) => false,
            Error::InvalidPodName(_) => false,
            Error::SerializationError(_) => false,
            Error::MissingObjectKey(_) => false,
            // Everything recovery related is resolved by running recovery again
            Error::AgentError(_)
            | Error::NotFound(_)
            | Error::PollTimeout { .. }
            | Error::NotBootstrapped
            | Error::NoBootstrapSource
            | Error::TransientError(_) => true,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures of concurrent per-pod tasks, attributed to the pod they happened in
#[derive(Debug, Default)]
pub struct PodErrors {
    errors: Vec<(String, Error)>,
}

impl PodErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pod: impl Into<String>, error: Error) {
        self.errors.push((pod.into(), error));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Error)> {
        self.errors.iter()
    }

    /// Names of the pods that failed, in the order they were recorded
    pub fn pods(&self) -> Vec<&str> {
        self.errors.iter().map(|(pod, _)| pod.as_str()).collect()
    }

    /// `Ok(())` when nothing failed, otherwise the aggregated error
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::PodErrors(self))
        }
    }
}

impl fmt::Display for PodErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} pod(s) failed: ", self.errors.len())?;
        for (i, (pod, error)) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "pod '{}': {}", pod, error)?;
        }
        Ok(())
    }
}

/// Exponential backoff configuration
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Initial delay for first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Calculate the backoff delay for a given retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);

        let jitter_range = base_delay_secs * self.jitter;
        let jitter = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
        let delay_with_jitter = (base_delay_secs + jitter).max(0.0);

        let capped_delay = delay_with_jitter.min(self.max_delay.as_secs_f64());

        Duration::from_secs_f64(capped_delay)
    }

    /// Get the delay for an error, with different handling for retryable vs non-retryable
    pub fn delay_for_error(&self, error: &Error, attempt: u32) -> Duration {
        if error.is_retryable() {
            self.delay_for_attempt(attempt)
        } else {
            // Non-retryable errors wait for manual intervention
            self.max_delay
        }
    }
}
