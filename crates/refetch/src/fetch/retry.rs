use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

use super::FetchError;

type RetryPredicate = Arc<dyn Fn(&FetchError, usize) -> bool + Send + Sync>;

/// Pure retry configuration, shared by value across concurrent requests.
///
/// The backoff grows exponentially from [`base`](Self::with_backoff), is
/// capped at a maximum delay, and carries additive jitter so that many
/// coordinators failing at once do not retry in lockstep.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    per_attempt_timeout: Duration,
    backoff_base: Duration,
    backoff_max: Duration,
    jitter: f64,
    should_retry: RetryPredicate,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("per_attempt_timeout", &self.per_attempt_timeout)
            .field("backoff_base", &self.backoff_base)
            .field("backoff_max", &self.backoff_max)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            // A value of zero would disable fetching entirely.
            max_attempts: config.max_attempts.max(1),
            per_attempt_timeout: config.per_attempt_timeout,
            backoff_base: config.backoff_base,
            backoff_max: config.backoff_max,
            jitter: f64::from(config.backoff_jitter_percent) / 100.0,
            should_retry: Arc::new(default_should_retry),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_per_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.per_attempt_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    /// Sets the additive jitter as a fraction of the computed delay.
    ///
    /// `0.0` makes the backoff fully deterministic.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.max(0.0);
        self
    }

    /// Replaces the retry predicate.
    ///
    /// The predicate receives the error of the failed attempt and the
    /// zero-based attempt index, and returns whether another attempt should
    /// be made. It is never consulted for cancellations.
    pub fn with_should_retry<F>(mut self, should_retry: F) -> Self
    where
        F: Fn(&FetchError, usize) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(should_retry);
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn per_attempt_timeout(&self) -> Duration {
        self.per_attempt_timeout
    }

    pub fn should_retry(&self, error: &FetchError, attempt: usize) -> bool {
        (self.should_retry)(error, attempt)
    }

    /// The delay to sleep after the given zero-based attempt failed.
    ///
    /// `base * 2^attempt`, capped at the maximum delay, plus a uniformly
    /// drawn jitter of up to `jitter * delay` on top. Jitter is additive, so
    /// the deterministic floor always holds.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        let delay = self
            .backoff_base
            .saturating_mul(factor)
            .min(self.backoff_max);

        if self.jitter <= 0.0 {
            return delay;
        }

        let jitter = delay.mul_f64(rand::thread_rng().gen_range(0.0..self.jitter));
        delay.saturating_add(jitter)
    }
}

/// The default retry predicate.
///
/// Connectivity failures and 5xx responses are worth retrying; client errors,
/// undecodable payloads, and internal failures are not going to change on a
/// second attempt.
fn default_should_retry(error: &FetchError, _attempt: usize) -> bool {
    match error {
        FetchError::Unavailable(_) => true,
        FetchError::Status { code, .. } => (500..600).contains(code),
        FetchError::Cancelled | FetchError::Decoding(_) | FetchError::Custom { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn test_backoff_growth_and_cap() {
        let policy = RetryPolicy::default()
            .with_backoff(Duration::from_millis(100), Duration::from_secs(2))
            .with_jitter(0.0);

        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        // Capped from here on, even for absurd attempt indices.
        assert_eq!(policy.backoff(5), Duration::from_secs(2));
        assert_eq!(policy.backoff(64), Duration::from_secs(2));
    }

    #[test]
    fn test_jitter_is_additive_and_bounded() {
        let policy = RetryPolicy::default()
            .with_backoff(Duration::from_millis(100), Duration::from_secs(10))
            .with_jitter(0.5);

        for _ in 0..100 {
            let delay = policy.backoff(1);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay < Duration::from_millis(300));
        }
    }

    #[test]
    fn test_max_attempts_clamped() {
        let policy = RetryPolicy::default().with_max_attempts(0);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_default_predicate() {
        let policy = RetryPolicy::default();

        assert!(policy.should_retry(&FetchError::Unavailable("no route".into()), 0));
        assert!(policy.should_retry(
            &FetchError::Status {
                code: 503,
                body: Bytes::new()
            },
            0
        ));
        assert!(!policy.should_retry(
            &FetchError::Status {
                code: 404,
                body: Bytes::new()
            },
            0
        ));
        assert!(!policy.should_retry(&FetchError::Decoding("bad png".into()), 0));
        assert!(!policy.should_retry(&FetchError::Cancelled, 0));
    }
}
