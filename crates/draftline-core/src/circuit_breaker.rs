//! Circuit breaker registry keyed by operation name.
//!
//! One registry instance serves the whole process: sources record under
//! `source:{name}`, pipeline stages under `stage:{name}`. A breaker
//! opens after a run of failures inside a rolling window and rejects
//! calls until the window ages out. Successes close the breaker but
//! only walk the failure count down one step at a time, so a single
//! lucky call does not erase a failure streak.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::AppError;

/// Configuration shared by every breaker in a registry.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the breaker open.
    pub failure_threshold: u32,
    /// Failures older than this no longer count, and an open breaker
    /// whose last failure has aged out resets to closed.
    pub failure_window: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            failure_window: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct BreakerState {
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    open: bool,
}

impl BreakerState {
    fn window_expired(&self, window: Duration, now: Instant) -> bool {
        match self.last_failure_at {
            Some(at) => now.duration_since(at) >= window,
            None => true,
        }
    }

    fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.last_failure_at = None;
        self.open = false;
    }
}

/// Point-in-time view of one breaker, for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub consecutive_failures: u32,
    pub open: bool,
}

/// Registry of named circuit breakers. Cloning shares state.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Arc<Mutex<HashMap<String, BreakerState>>>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Acquires the registry lock, recovering from poison if necessary.
    fn lock_inner(&self) -> MutexGuard<'_, HashMap<String, BreakerState>> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("circuit breaker recovered from poisoned mutex");
            poisoned.into_inner()
        })
    }

    /// Whether the named breaker currently rejects calls. A breaker
    /// whose failure window has fully elapsed resets here, on read.
    pub fn is_open(&self, operation: &str) -> bool {
        let now = Instant::now();
        let mut inner = self.lock_inner();
        let Some(state) = inner.get_mut(operation) else {
            return false;
        };
        if state.window_expired(self.config.failure_window, now) {
            state.reset();
            return false;
        }
        state.open
    }

    /// Gate for callers: `Ok` when the operation may proceed, otherwise
    /// `BreakerOpen` carrying the time until the window resets.
    pub fn guard(&self, operation: &str) -> Result<(), AppError> {
        let now = Instant::now();
        let mut inner = self.lock_inner();
        let Some(state) = inner.get_mut(operation) else {
            return Ok(());
        };
        if state.window_expired(self.config.failure_window, now) {
            state.reset();
            return Ok(());
        }
        if !state.open {
            return Ok(());
        }
        let retry_after = match state.last_failure_at {
            Some(at) => (at + self.config.failure_window).saturating_duration_since(now),
            None => Duration::ZERO,
        };
        Err(AppError::BreakerOpen {
            operation: operation.to_string(),
            retry_after,
        })
    }

    /// Closes the breaker and walks the failure count down one step.
    pub fn record_success(&self, operation: &str) {
        let mut inner = self.lock_inner();
        let state = inner.entry(operation.to_string()).or_default();
        state.consecutive_failures = state.consecutive_failures.saturating_sub(1);
        if state.open {
            tracing::info!(operation, "circuit breaker closed after success");
        }
        state.open = false;
    }

    pub fn record_failure(&self, operation: &str) {
        let now = Instant::now();
        let mut inner = self.lock_inner();
        let state = inner.entry(operation.to_string()).or_default();
        if state.window_expired(self.config.failure_window, now) {
            state.reset();
        }
        state.consecutive_failures += 1;
        state.last_failure_at = Some(now);
        if state.consecutive_failures >= self.config.failure_threshold && !state.open {
            state.open = true;
            tracing::warn!(
                operation,
                failures = state.consecutive_failures,
                "circuit breaker opened"
            );
        }
    }

    pub fn snapshot(&self, operation: &str) -> BreakerSnapshot {
        let mut inner = self.lock_inner();
        let state = inner.entry(operation.to_string()).or_default();
        BreakerSnapshot {
            consecutive_failures: state.consecutive_failures,
            open: state.open,
        }
    }

    /// Snapshot of every breaker the registry has seen.
    pub fn stats(&self) -> HashMap<String, BreakerSnapshot> {
        let inner = self.lock_inner();
        inner
            .iter()
            .map(|(name, state)| {
                (
                    name.clone(),
                    BreakerSnapshot {
                        consecutive_failures: state.consecutive_failures,
                        open: state.open,
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, window: Duration) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: threshold,
            failure_window: window,
        })
    }

    #[test]
    fn closed_until_threshold_reached() {
        let breaker = breaker(3, Duration::from_secs(300));
        breaker.record_failure("fetch");
        breaker.record_failure("fetch");
        assert!(!breaker.is_open("fetch"));
        breaker.record_failure("fetch");
        assert!(breaker.is_open("fetch"));
    }

    #[test]
    fn guard_rejects_with_retry_after_when_open() {
        let breaker = breaker(1, Duration::from_secs(300));
        breaker.record_failure("fetch");
        match breaker.guard("fetch") {
            Err(AppError::BreakerOpen {
                operation,
                retry_after,
            }) => {
                assert_eq!(operation, "fetch");
                assert!(retry_after > Duration::from_secs(290));
            }
            other => panic!("expected BreakerOpen, got {other:?}"),
        }
    }

    #[test]
    fn unknown_operation_is_closed() {
        let breaker = breaker(3, Duration::from_secs(300));
        assert!(!breaker.is_open("never-seen"));
        assert!(breaker.guard("never-seen").is_ok());
    }

    #[test]
    fn success_closes_and_decrements_gradually() {
        let breaker = breaker(2, Duration::from_secs(300));
        breaker.record_failure("fetch");
        breaker.record_failure("fetch");
        assert!(breaker.is_open("fetch"));

        breaker.record_success("fetch");
        assert!(!breaker.is_open("fetch"));
        // One failure remains on the books, so a single new failure
        // trips the breaker again.
        assert_eq!(breaker.snapshot("fetch").consecutive_failures, 1);
        breaker.record_failure("fetch");
        assert!(breaker.is_open("fetch"));
    }

    #[test]
    fn window_expiry_resets_open_breaker() {
        let breaker = breaker(1, Duration::from_millis(50));
        breaker.record_failure("fetch");
        assert!(breaker.is_open("fetch"));
        std::thread::sleep(Duration::from_millis(80));
        assert!(!breaker.is_open("fetch"));
        assert_eq!(breaker.snapshot("fetch").consecutive_failures, 0);
    }

    #[test]
    fn stale_failures_do_not_accumulate_across_windows() {
        let breaker = breaker(2, Duration::from_millis(50));
        breaker.record_failure("fetch");
        std::thread::sleep(Duration::from_millis(80));
        // The old failure aged out, so this starts a fresh streak.
        breaker.record_failure("fetch");
        assert!(!breaker.is_open("fetch"));
    }

    #[test]
    fn operations_are_tracked_independently_and_reported() {
        let breaker = breaker(1, Duration::from_secs(300));
        breaker.record_failure("stage:collect");
        breaker.record_success("stage:publish");

        assert!(breaker.is_open("stage:collect"));
        assert!(!breaker.is_open("stage:publish"));

        let stats = breaker.stats();
        assert!(stats["stage:collect"].open);
        assert!(!stats["stage:publish"].open);
    }
}
