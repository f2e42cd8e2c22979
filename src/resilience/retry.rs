//! Retry with exponential backoff and jitter.

use crate::{
    Error,
    Result,
};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Server exception codes judged likely to succeed on retry:
/// TIMEOUT_EXCEEDED, TOO_SLOW, SOCKET_TIMEOUT, NETWORK_ERROR,
/// TABLE_IS_READ_ONLY, TOO_MANY_SIMULTANEOUS_QUERIES.
pub const RETRYABLE_SERVER_CODES: [i32; 6] =
    [159, 164, 209, 210, 242, 252];

/// Whether an error is transient under the default policy. Cancellation
/// and open circuits are always terminal.
pub fn is_transient(error: &Error) -> bool {
    match error {
        Error::Io(_)
        | Error::Timeout(_)
        | Error::Connection(_)
        | Error::ConnectionBroken(_)
        | Error::ShortRead { .. } => true,
        Error::Server { code, .. } => {
            RETRYABLE_SERVER_CODES.contains(code)
        }
        Error::Aggregate(errors) => errors.iter().any(is_transient),
        _ => false,
    }
}

type Predicate = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Exponential-backoff retry policy.
///
/// The delay before attempt `k` (1-based) is
/// `min(base_delay × multiplier^(k-1), max_delay)` stretched by a
/// uniform jitter in `[1.0, 1.25]`.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts, first call included.
    pub max_retries: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Backoff multiplier per attempt.
    pub backoff_multiplier: f64,
    /// Upper bound on any single delay, before jitter.
    pub max_delay: Duration,
    predicate: Option<Predicate>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            predicate: None,
        }
    }
}

impl RetryPolicy {
    /// The default policy: 3 attempts, 100ms base, 2.0 multiplier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the total attempt count.
    pub fn max_retries(mut self, attempts: u32) -> Self {
        self.max_retries = attempts.max(1);
        self
    }

    /// Set the base delay.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the delay ceiling.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Replace the transience predicate.
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    fn is_retryable(&self, error: &Error) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(error),
            None => is_transient(error),
        }
    }

    /// The backoff delay before the `attempt`-th retry (1-based), before
    /// jitter: `min(base_delay × multiplier^(attempt-1), max_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor =
            self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = self.base_delay.mul_f64(factor);
        delay.min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let jitter: f64 = rand::thread_rng().gen_range(0.0..=0.25);
        delay.mul_f64(1.0 + jitter)
    }

    /// Run `operation` under this policy. Cancellation aborts
    /// immediately, including during a backoff sleep, and is never
    /// counted as a failure.
    pub async fn execute<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut failures: Vec<Error> = Vec::new();

        for attempt in 1..=self.max_retries.max(1) {
            if attempt > 1 {
                // Attempt k waits the (k-1)-th retry delay
                let delay =
                    self.jittered(self.delay_for_attempt(attempt - 1));
                debug!(attempt, ?delay, "retrying after backoff");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            match operation().await {
                Ok(value) => return Ok(value),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(error) => {
                    let terminal = !self.is_retryable(&error);
                    failures.push(error);
                    if terminal {
                        break;
                    }
                }
            }
        }

        if failures.len() == 1 {
            Err(failures.pop().unwrap())
        } else {
            Err(Error::Aggregate(failures))
        }
    }
}
