pub mod config;
pub mod context;
pub mod error;
pub mod reconciler;
pub mod recovery;
pub mod wait;

pub use config::{RecoveryConfig, parse_duration};
pub use context::Context;
pub use error::{BackoffConfig, Error, PodErrors, Result};
pub use reconciler::{
    GALERA_READY_CONDITION, RecoveryTrigger, error_policy, reconcile, recovery_trigger,
    unhealthy_for,
};
pub use recovery::{
    BootstrapSource, GaleraRecovery, RecoveryOutcome, RecoveryPhase, ResetReason, SourceOrigin,
    bootstrap_source, restart_order,
};
pub use wait::poll_until_success;
