//! Bounded polling of fallible operations
//!
//! Every network call made during recovery (pod agent or Kubernetes API) is
//! retried by these helpers until it succeeds or its deadline passes. Deadlines
//! are absolute so that nested operations share the budget of their parent.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::debug;

use crate::controller::error::{Error, Result};

/// Poll `operation` every `interval` until it succeeds or `deadline` is reached.
///
/// An attempt still running when the deadline passes is dropped. The returned
/// timeout error carries the last error observed, if any.
pub async fn poll_until_success<T, F, Fut>(
    name: &str,
    deadline: Instant,
    interval: Duration,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let mut attempts: u32 = 0;
    let mut last_error: Option<Error> = None;

    while Instant::now() < deadline {
        attempts += 1;
        match timeout_at(deadline, operation()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                debug!(operation = name, attempt = attempts, error = %e, "Operation failed, retrying");
                last_error = Some(e);
            }
            Err(_) => break,
        }

        let next = Instant::now() + interval;
        sleep_until(next.min(deadline)).await;
    }

    Err(Error::PollTimeout {
        operation: name.to_string(),
        timeout: deadline.saturating_duration_since(started),
        last_error: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "operation did not complete".to_string()),
    })
}
