//! Bounded retry with exponential backoff for remote calls

use crate::error::{Error, PredictError, Result};
use std::future::Future;
use std::time::Duration;

/// Default number of attempts for ordinary remote steps
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default number of attempts for the generation step
pub const DEFAULT_CRITICAL_ATTEMPTS: u32 = 5;

/// Default base delay for exponential backoff (1 second)
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// How often and how patiently a remote step is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Optional ceiling for a single delay; unset keeps every delay growing
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    /// Policy for the expensive generation step
    pub fn critical() -> Self {
        Self {
            max_attempts: DEFAULT_CRITICAL_ATTEMPTS,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Cap each delay; attempts past the cap wait equally long
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self.base_delay.saturating_mul(factor);
        match self.max_delay {
            Some(max_delay) => delay.min(max_delay),
            None => delay,
        }
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` is reached
///
/// Waiting between attempts suspends the task; the thread is never blocked.
/// After the last failed attempt the final error is returned as
/// [`Error::RemoteOperationFailed`].
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation_id: &str,
    step: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, PredictError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        tracing::debug!("{}: attempt {}/{}", step, attempt, max_attempts);

        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!("{} succeeded on attempt {}", step, attempt);
                }
                return Ok(value);
            }
            Err(e) if attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    "{} attempt {}/{} failed: {}; retrying in {:?}",
                    step,
                    attempt,
                    max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!("{} failed after {} attempts: {}", step, attempt, e);
                return Err(Error::RemoteOperationFailed {
                    operation_id: operation_id.to_string(),
                    step: step.to_string(),
                    attempts: attempt,
                    source: e,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[test]
    fn test_default_policies() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
        assert!(RetryPolicy::critical().max_attempts > policy.max_attempts);
    }

    #[test]
    fn test_backoff_delay_calculation() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_after(4), Duration::from_millis(8000));

        assert_eq!(policy.delay_after(7), Duration::from_millis(64000));

        let capped = policy.with_max_delay(Duration::from_secs(30));
        assert_eq!(capped.delay_after(10), Duration::from_millis(30000));
        assert_eq!(capped.delay_after(64), Duration::from_millis(30000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_keep_growing_with_high_ceiling() {
        let calls = Arc::new(AtomicU32::new(0));
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let policy = RetryPolicy::critical().with_max_attempts(8);

        let result = retry(&policy, "op-4", "generate", || {
            let calls = calls.clone();
            let stamps = stamps.clone();
            async move {
                stamps.lock().unwrap().push(Instant::now());
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 7 {
                    Err(PredictError::TimeoutError(600))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 8);

        let stamps = stamps.lock().unwrap();
        let gaps: Vec<Duration> = stamps.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(gaps.len(), 7);
        assert!(gaps.windows(2).all(|w| w[1] > w[0]), "gaps: {:?}", gaps);
        assert!(gaps[6] >= Duration::from_secs(64));
    }

    #[test]
    fn test_max_attempts_never_zero() {
        let policy = RetryPolicy::default().with_max_attempts(0);
        assert_eq!(policy.max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let policy = RetryPolicy::default().with_max_attempts(5);

        let result = retry(&policy, "op-1", "generate", || {
            let calls = calls.clone();
            let stamps = stamps.clone();
            async move {
                stamps.lock().unwrap().push(Instant::now());
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 3 {
                    Err(PredictError::ConnectionError("reset".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        let stamps = stamps.lock().unwrap();
        let gaps: Vec<Duration> = stamps.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(gaps.len(), 3);
        assert!(gaps.windows(2).all(|w| w[1] > w[0]), "gaps: {:?}", gaps);
        assert!(gaps[0] >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_surfaces_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();

        let result: Result<()> = retry(&policy, "op-2", "preprocess", || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(PredictError::ServerError {
                    status: 503,
                    message: format!("busy {}", n),
                })
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(Error::RemoteOperationFailed {
                operation_id,
                step,
                attempts,
                source,
            }) => {
                assert_eq!(operation_id, "op-2");
                assert_eq!(step, "preprocess");
                assert_eq!(attempts, 3);
                assert!(source.to_string().contains("busy 2"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_does_not_sleep() {
        let start = Instant::now();
        let value = retry(&RetryPolicy::critical(), "op-3", "validate", || async {
            Ok::<_, PredictError>("ok")
        })
        .await
        .unwrap();

        assert_eq!(value, "ok");
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
