//! Retry logic with exponential backoff for transient errors.

use crate::types::RetryInformation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::thread;
use std::time::Duration;

/// Classification of an error for the retry policy
pub trait Retryable {
    /// Whether another attempt may succeed
    fn is_retryable(&self) -> bool;
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            multiplier,
        }
    }

    /// Delay after the given failed attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = delay.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    /// Create a config that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Execute an operation with retry logic
///
/// Retryable errors are retried with exponential backoff until
/// `max_attempts` is reached. Every failed attempt that is followed by
/// another one is recorded in `info`; the error of the final attempt is
/// returned to the caller. Non-retryable errors are returned immediately.
pub fn with_retry<T, E, F>(
    config: &RetryConfig,
    info: &mut RetryInformation,
    mut operation: F,
) -> Result<T, E>
where
    E: Retryable + fmt::Display,
    F: FnMut() -> Result<T, E>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_retryable() || attempt + 1 >= max_attempts {
                    return Err(e);
                }

                let delay = config.delay_for_attempt(attempt);
                log::warn!(
                    "Attempt {}/{} failed: {}. Retrying in {}ms",
                    attempt + 1,
                    max_attempts,
                    e,
                    delay.as_millis()
                );
                info.record(&e);

                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Debug)]
    enum TestError {
        Transient(u32),
        Permanent,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Transient(n) => write!(f, "HTTP 503 on attempt {n}"),
                Self::Permanent => f.write_str("HTTP 409"),
            }
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, Self::Transient(_))
        }
    }

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5), 1.0)
    }

    #[test]
    fn test_delay_for_attempt() {
        let config = RetryConfig::new(5, Duration::from_secs(1), Duration::from_secs(5), 2.0);
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_with_retry_success_first_try() {
        let mut info = RetryInformation::default();
        let result = with_retry(&RetryConfig::no_retry(), &mut info, || Ok::<_, TestError>(42));
        assert_eq!(result.unwrap(), 42);
        assert!(info.is_empty());
    }

    #[test]
    fn test_with_retry_non_retryable_error() {
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();
        let mut info = RetryInformation::default();

        let result: Result<(), TestError> = with_retry(&fast(3), &mut info, || {
            attempts_clone.set(attempts_clone.get() + 1);
            Err(TestError::Permanent)
        });

        assert!(matches!(result, Err(TestError::Permanent)));
        assert_eq!(attempts.get(), 1);
        assert!(info.errors.is_empty());
    }

    #[test]
    fn test_with_retry_eventual_success() {
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();
        let mut info = RetryInformation::default();

        let result = with_retry(&fast(3), &mut info, || {
            let current = attempts_clone.get();
            attempts_clone.set(current + 1);
            if current < 2 {
                Err(TestError::Transient(current + 1))
            } else {
                Ok(42)
            }
        });

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.get(), 3);
        assert_eq!(info.retries_count, 2);
    }

    #[test]
    fn test_retry_exhaustion_records_each_retry() {
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();
        let mut info = RetryInformation::default();

        let result: Result<(), TestError> = with_retry(&fast(3), &mut info, || {
            attempts_clone.set(attempts_clone.get() + 1);
            Err(TestError::Transient(attempts_clone.get()))
        });

        assert_eq!(attempts.get(), 3);
        match result {
            Err(TestError::Transient(n)) => assert_eq!(n, 3),
            other => panic!("expected last transient error, got {other:?}"),
        }
        assert_eq!(info.retries_count, 2);
        assert_eq!(info.errors.len(), 2);
        assert!(info.errors[0].ends_with("HTTP 503 on attempt 1"));
        assert!(info.errors[1].ends_with("HTTP 503 on attempt 2"));
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();
        let mut info = RetryInformation::default();

        let _: Result<(), TestError> = with_retry(&fast(0), &mut info, || {
            attempts_clone.set(attempts_clone.get() + 1);
            Err(TestError::Transient(1))
        });
        assert_eq!(attempts.get(), 1);
    }
}
