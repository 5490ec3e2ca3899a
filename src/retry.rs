//! Bounded retry with exponential backoff.
//!
//! Used around the transcription engine and the detector's stream reopening.
//! The policy carries no knowledge of the operation; callers supply a
//! predicate deciding which errors are worth retrying.

use std::time::Duration;

/// Retry tuning: attempts = `max_retries + 1`, delays grow by
/// `backoff_factor` and are capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries, for fail-fast call sites.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn next_delay(&self, current: Duration) -> Duration {
        let scaled = current.mul_f64(self.backoff_factor.max(1.0));
        scaled.min(self.max_delay)
    }
}

/// Run `op` until it succeeds, the retry budget is exhausted, or a
/// non-retryable error occurs. Sleeps between attempts.
pub fn with_retry<T, E, F>(
    policy: &RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
{
    let mut attempt: u32 = 0;
    let mut delay = policy.initial_delay.min(policy.max_delay);
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_retries && is_retryable(&err) => {
                attempt += 1;
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                delay = policy.next_delay(delay);
            }
            Err(err) => return Err(err),
        }
    }
}
