//! Generic retry-with-backoff combinator.
//!
//! The sleeper and the error classifier are injected so tests can observe the
//! computed delays without waiting on a real clock.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::RngExt;
use reqwest::Response;

use crate::error::AiError;

/// Backoff parameters: `base_delay * 2^(attempt-1)` capped at `max_delay`,
/// plus uniform jitter in `[jitter_min, jitter_max]`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(8),
            jitter_min: Duration::from_millis(50),
            jitter_max: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter_min = Duration::ZERO;
        self.jitter_max = Duration::ZERO;
        self
    }

    /// Exponential part of the delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay)
    }

    /// Full delay before retry number `attempt`. A server hint replaces the
    /// computed backoff.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint,
            None => self.backoff_for(attempt) + self.jitter(),
        }
    }

    fn jitter(&self) -> Duration {
        let min = self.jitter_min.as_millis() as u64;
        let max = self.jitter_max.as_millis() as u64;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

/// Classifier verdict for a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { after: Option<Duration> },
    GiveUp,
}

impl RetryDecision {
    /// Default classification for agent errors.
    pub fn for_ai_error(error: &AiError) -> Self {
        if error.is_retryable() {
            RetryDecision::Retry {
                after: error.retry_after(),
            }
        } else {
            RetryDecision::GiveUp
        }
    }
}

/// Clock abstraction for backoff waits.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Run `operation` until it succeeds, the classifier gives up, or
/// `policy.max_attempts` attempts have been made. The operation receives the
/// 1-based attempt number. The last error is returned on exhaustion.
pub async fn retry_with_backoff<T, E, Op, Fut, Classify>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    classify: Classify,
    mut operation: Op,
) -> Result<T, E>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Classify: Fn(&E) -> RetryDecision,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let error = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        let RetryDecision::Retry { after } = classify(&error) else {
            return Err(error);
        };
        if attempt >= max_attempts {
            tracing::warn!(attempt, error = %error, "Giving up after final attempt");
            return Err(error);
        }

        let delay = policy.delay_for(attempt, after);
        tracing::warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying after transient failure"
        );
        sleeper.sleep(delay).await;
        attempt += 1;
    }
}

pub(crate) fn parse_retry_after(response: &Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

pub(crate) async fn response_to_error(response: Response, provider: &str) -> AiError {
    let status = response.status().as_u16();
    let retry_after = parse_retry_after(&response);
    let body = response.text().await.unwrap_or_default();

    const MAX_ERROR_BODY: usize = 512;
    let message = if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated]", &body[..cut])
    } else {
        body
    };

    AiError::LlmHttp {
        provider: provider.to_string(),
        status,
        message,
        retry_after_secs: retry_after,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Default)]
    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    fn http(status: u16) -> AiError {
        AiError::LlmHttp {
            provider: "test".to_string(),
            status,
            message: "boom".to_string(),
            retry_after_secs: None,
        }
    }

    #[test]
    fn test_backoff_progression() {
        let policy = RetryPolicy::default().without_jitter();
        assert_eq!(policy.delay_for(1, None), Duration::from_millis(400));
        assert_eq!(policy.delay_for(2, None), Duration::from_millis(800));
        assert_eq!(policy.delay_for(3, None), Duration::from_millis(1600));
        assert_eq!(policy.delay_for(6, None), Duration::from_secs(8));
        assert_eq!(policy.delay_for(40, None), Duration::from_secs(8));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::default();
        for _ in 0..200 {
            let delay = policy.delay_for(1, None);
            assert!(delay >= Duration::from_millis(450));
            assert!(delay <= Duration::from_millis(650));
        }
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default().without_jitter();

        let result = retry_with_backoff(&policy, &sleeper, RetryDecision::for_ai_error, |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err(http(503)) } else { Ok("done") } }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *sleeper.slept.lock().unwrap(),
            vec![Duration::from_millis(400), Duration::from_millis(800)]
        );
    }

    #[tokio::test]
    async fn test_non_transient_error_propagates_immediately() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);

        let result: Result<(), AiError> = retry_with_backoff(
            &RetryPolicy::default(),
            &sleeper,
            RetryDecision::for_ai_error,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(http(401)) }
            },
        )
        .await;

        assert!(matches!(result, Err(AiError::LlmHttp { status: 401, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.slept.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default().with_max_attempts(4).without_jitter();

        let result: Result<(), AiError> =
            retry_with_backoff(&policy, &sleeper, RetryDecision::for_ai_error, |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Err(AiError::LlmHttp {
                        provider: "test".to_string(),
                        status: 429,
                        message: format!("attempt {attempt}"),
                        retry_after_secs: None,
                    })
                }
            })
            .await;

        match result {
            Err(AiError::LlmHttp { message, .. }) => assert_eq!(message, "attempt 4"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(sleeper.slept.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_retry_after_hint_overrides_backoff() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);

        let result = retry_with_backoff(
            &RetryPolicy::default(),
            &sleeper,
            |_: &AiError| RetryDecision::Retry {
                after: Some(Duration::from_secs(2)),
            },
            |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { if n == 0 { Err(http(429)) } else { Ok(n) } }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(*sleeper.slept.lock().unwrap(), vec![Duration::from_secs(2)]);
    }
}
