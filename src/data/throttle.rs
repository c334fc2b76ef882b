//! Rate limiting and retry for upstream calls.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::config::RetryPolicy;
use crate::error::{ErrorKind, PipelineError};

/// Enforces a minimum spacing between consecutive upstream calls.
///
/// Shared by all workers of a run, so the spacing holds across threads and
/// across retries.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// Block until the next call is allowed, then claim the slot.
    pub fn wait(&self) {
        // The guard is held while sleeping so waiters queue up behind each other.
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                thread::sleep(self.min_interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

/// Run `op` under the rate limiter, retrying `Upstream` failures per `policy`.
///
/// Other error kinds are returned immediately.
pub fn call_with_retry<T>(
    policy: &RetryPolicy,
    limiter: &RateLimiter,
    label: &str,
    mut op: impl FnMut() -> Result<T, PipelineError>,
) -> Result<T, PipelineError> {
    let mut attempt = 1;
    loop {
        limiter.wait();
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.kind == ErrorKind::Upstream && attempt < policy.max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "upstream call failed, retrying"
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
