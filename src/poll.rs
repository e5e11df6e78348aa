//! Bounded polling for eventually-consistent cluster state
//!
//! One generic loop backs every wait in the engine: check, sleep a fixed
//! interval, re-check, until the condition yields a value or the budget is
//! exhausted. Transient errors from the check are absorbed and retried
//! here, and only here; fatal errors abort the wait immediately.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::{Error, Result};

/// Poll until the check yields a value or the budget elapses.
///
/// The check returns `Ok(Some(value))` when the condition is met,
/// `Ok(None)` to keep polling, or `Err`. Retryable errors (see
/// [`Error::is_retryable`]) are logged and retried on the next interval;
/// any other error propagates immediately.
///
/// The elapsed budget is evaluated before each attempt, so the loop
/// terminates deterministically and never blocks past
/// `budget + one check + one interval`.
pub async fn poll_until<T, F, Fut>(
    budget: Duration,
    interval: Duration,
    operation: &str,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let start = Instant::now();

    loop {
        if start.elapsed() > budget {
            return Err(Error::timed_out(operation, start.elapsed()));
        }

        match check().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {
                trace!(operation = %operation, "condition not yet met, polling");
            }
            Err(e) if e.is_retryable() => {
                warn!(operation = %operation, error = %e, "transient failure during poll, retrying");
            }
            Err(e) => return Err(e),
        }

        tokio::time::sleep(interval).await;
    }
}
