//! Call pacing and retry policy for external providers.

use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

use crate::error::{Error, Result};

/// Enforces a minimum interval between consecutive calls through it.
///
/// Share one `Throttle` per upstream provider; concurrent callers queue on
/// the internal lock and are released one interval apart.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self { Self { min_interval, last: Mutex::new(None) } }

    /// Wait until the interval since the previous call has elapsed.
    pub async fn acquire(&self) {
        if self.min_interval.is_zero() { return; }
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready = prev + self.min_interval;
            if ready > Instant::now() { tokio::time::sleep_until(ready).await; }
        }
        *last = Some(Instant::now());
    }
}

/// Exponential backoff for retryable failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay: Duration::from_millis(500), max_delay: Duration::from_secs(30) }
    }
}

impl RetryPolicy {
    pub fn with_retries(max_retries: u32) -> Self { Self { max_retries, ..Self::default() } }

    /// Delay before retry number `attempt` (1-based). A provider-supplied
    /// retry-after wins over the computed backoff.
    pub fn delay_for(&self, attempt: u32, err: &Error) -> Duration {
        if let Error::RateLimited { retry_after_ms } = err {
            return Duration::from_millis(*retry_after_ms).min(self.max_delay);
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Longest total sleep between attempts when every retry waits the cap.
    pub fn max_total_delay(&self) -> Duration { self.max_delay.saturating_mul(self.max_retries) }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.delay_for(attempt, &e);
                    warn!(what, attempt, delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), error = %e, "retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy { max_retries: 5, base_delay: Duration::from_millis(100), max_delay: Duration::from_millis(350) };
        let e = Error::Timeout(1);
        assert_eq!(p.delay_for(1, &e), Duration::from_millis(100));
        assert_eq!(p.delay_for(2, &e), Duration::from_millis(200));
        assert_eq!(p.delay_for(3, &e), Duration::from_millis(350));
        assert_eq!(p.delay_for(1, &Error::RateLimited { retry_after_ms: 250 }), Duration::from_millis(250));
        assert_eq!(p.max_total_delay(), Duration::from_millis(1750));
    }

    #[tokio::test(start_paused = true)]
    async fn run_retries_then_gives_up() {
        let calls = AtomicU32::new(0);
        let p = RetryPolicy::with_retries(2);
        let out: Result<()> = p
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Timeout(10))
            })
            .await;
        assert!(matches!(out, Err(Error::Timeout(10))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn run_does_not_retry_fatal_errors() {
        let calls = AtomicU32::new(0);
        let out: Result<()> = RetryPolicy::with_retries(3)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Generation("bad request".into()))
            })
            .await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_spaces_calls() {
        let t = Throttle::new(Duration::from_millis(500));
        let start = Instant::now();
        t.acquire().await;
        t.acquire().await;
        t.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }
}
