//! Shared retry policy with exponential backoff.
//!
//! One policy object is applied to every remote call by the session manager's
//! `call` wrapper, instead of ad-hoc retry loops at each call site. Transient
//! failures (network errors, 5xx, rate limiting) back off and retry up to the
//! attempt ceiling; fatal failures abort immediately.

use rand::Rng;
use std::time::Duration;

/// Classification of a failed attempt.
#[derive(Debug)]
pub enum Retry<E> {
    /// Worth another attempt after backoff.
    Transient(E),
    /// Do not retry.
    Fatal(E),
}

/// Why a retried operation ultimately failed.
#[derive(Debug)]
pub enum RetryFailure<E> {
    Fatal(E),
    Exhausted { attempts: u32, last: E },
}

/// Exponential backoff schedule with an attempt ceiling.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy with no sleeping, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before the given retry (attempt is 1-based; attempt 1 is the
    /// first retry). Doubles per attempt, capped, with 50-100% jitter.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exp = self.base_delay.saturating_mul(1u32 << (attempt - 1).min(16));
        let capped = exp.min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.5..=1.0);
        capped.mul_f64(jitter)
    }

    /// Run `op` until it succeeds, fails fatally, or the attempt ceiling is
    /// reached. The closure receives the 0-based attempt index.
    pub fn run<T, E>(
        &self,
        mut op: impl FnMut(u32) -> Result<T, Retry<E>>,
    ) -> Result<T, RetryFailure<E>> {
        let attempts = self.max_attempts.max(1);
        let mut last = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                std::thread::sleep(self.backoff_delay(attempt));
            }
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(Retry::Fatal(e)) => return Err(RetryFailure::Fatal(e)),
                Err(Retry::Transient(e)) => last = Some(e),
            }
        }

        Err(RetryFailure::Exhausted {
            attempts,
            last: last.expect("at least one attempt ran"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succeeds_first_try() {
        let policy = RetryPolicy::immediate(4);
        let result: Result<i32, RetryFailure<String>> = policy.run(|_| Ok(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn retries_transient_then_succeeds() {
        let policy = RetryPolicy::immediate(4);
        let mut calls = 0;
        let result: Result<i32, RetryFailure<String>> = policy.run(|_| {
            calls += 1;
            if calls < 3 {
                Err(Retry::Transient("flaky".to_string()))
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 3);
    }

    #[test]
    fn fatal_stops_immediately() {
        let policy = RetryPolicy::immediate(4);
        let mut calls = 0;
        let result: Result<(), RetryFailure<String>> = policy.run(|_| {
            calls += 1;
            Err(Retry::Fatal("bad request".to_string()))
        });
        assert!(matches!(result, Err(RetryFailure::Fatal(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn exhausts_after_ceiling() {
        let policy = RetryPolicy::immediate(3);
        let mut calls = 0;
        let result: Result<(), RetryFailure<String>> = policy.run(|_| {
            calls += 1;
            Err(Retry::Transient("still down".to_string()))
        });
        assert_eq!(calls, 3);
        match result {
            Err(RetryFailure::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last, "still down");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn backoff_delay_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
        };
        for attempt in 1..10 {
            assert!(policy.backoff_delay(attempt) <= Duration::from_millis(400));
        }
    }
}
