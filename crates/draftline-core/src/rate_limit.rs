//! Per-source rate limiting over two rolling fixed windows.
//!
//! Admission is wait-only: [`RateLimiter::acquire`] never fails, it
//! sleeps until both the per-minute and per-hour windows have headroom.
//! The lock is dropped before every sleep so concurrent callers are not
//! serialized behind a waiter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::models::RateLimitConfig;

#[derive(Debug)]
struct Window {
    started: Instant,
    length: Duration,
    limit: u32,
    used: u32,
}

impl Window {
    fn new(limit: u32, length: Duration, now: Instant) -> Self {
        Self {
            started: now,
            length,
            // A zero limit would block forever.
            limit: limit.max(1),
            used: 0,
        }
    }

    /// Reset the window once its full length has elapsed.
    fn roll(&mut self, now: Instant) {
        if now.duration_since(self.started) >= self.length {
            self.started = now;
            self.used = 0;
        }
    }

    fn saturated(&self) -> bool {
        self.used >= self.limit
    }

    fn resets_at(&self) -> Instant {
        self.started + self.length
    }
}

#[derive(Debug)]
struct Windows {
    minute: Window,
    hour: Window,
}

/// Usage counters reported by [`RateLimiter::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterSnapshot {
    pub minute_used: u32,
    pub minute_limit: u32,
    pub hour_used: u32,
    pub hour_limit: u32,
}

/// Dual-window rate limiter for a single upstream source.
/// Cloning shares the underlying windows.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    name: String,
    inner: Arc<Mutex<Windows>>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, config: RateLimitConfig) -> Self {
        Self::with_windows(
            name,
            config,
            Duration::from_secs(60),
            Duration::from_secs(3600),
        )
    }

    /// Constructor with injectable window lengths, used by tests to
    /// exercise rollover without minute-scale sleeps.
    pub fn with_windows(
        name: impl Into<String>,
        config: RateLimitConfig,
        minute_length: Duration,
        hour_length: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(Windows {
                minute: Window::new(config.per_minute, minute_length, now),
                hour: Window::new(config.per_hour, hour_length, now),
            })),
        }
    }

    /// Waits until both windows have headroom, then reserves one slot
    /// in each. Saturation is re-checked after every sleep because the
    /// earliest reset may free only one of the two windows.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut inner = self.inner.lock().await;
                let now = Instant::now();
                inner.minute.roll(now);
                inner.hour.roll(now);

                if !inner.minute.saturated() && !inner.hour.saturated() {
                    inner.minute.used += 1;
                    inner.hour.used += 1;
                    return;
                }

                let mut earliest: Option<Instant> = None;
                for window in [&inner.minute, &inner.hour] {
                    if window.saturated() {
                        let at = window.resets_at();
                        earliest = Some(match earliest {
                            Some(current) if current <= at => current,
                            _ => at,
                        });
                    }
                }
                match earliest {
                    Some(at) => at.saturating_duration_since(now),
                    None => continue,
                }
            };

            tracing::debug!(
                source = %self.name,
                wait_ms = wait.as_millis() as u64,
                "rate limit window saturated, waiting"
            );
            tokio::time::sleep(wait).await;
        }
    }

    pub async fn snapshot(&self) -> RateLimiterSnapshot {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        inner.minute.roll(now);
        inner.hour.roll(now);
        RateLimiterSnapshot {
            minute_used: inner.minute.used,
            minute_limit: inner.minute.limit,
            hour_used: inner.hour.used,
            hour_limit: inner.hour.limit,
        }
    }
}
