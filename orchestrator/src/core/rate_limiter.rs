//! Per-provider sliding-window rate limiter
//!
//! Enforces requests-per-minute, requests-per-hour, and max-concurrency
//! ceilings, plus an externally triggered backoff period for remote
//! rate-limit signals. Each provider owns exactly one limiter, so a single
//! mutex per limiter is enough; there is no cross-provider lock ordering.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use shared::ProviderConfig;

/// Sliding-window rate limiter state, mutated only inside the limiter's
/// critical section
#[derive(Debug)]
struct LimiterState {
    minute_window: VecDeque<Instant>,
    hour_window: VecDeque<Instant>,
    in_flight: u32,
    backoff_until: Option<Instant>,
}

#[derive(Debug)]
pub struct RateLimiter {
    requests_per_minute: u32,
    requests_per_hour: u32,
    max_concurrency: u32,
    minute_span: Duration,
    hour_span: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(config: &ProviderConfig) -> Self {
        Self::with_windows(config, Duration::from_secs(60), Duration::from_secs(3600))
    }

    /// Construct with custom window spans. Test hook: lets window expiry be
    /// observed without waiting a full minute.
    pub fn with_windows(config: &ProviderConfig, minute_span: Duration, hour_span: Duration) -> Self {
        Self {
            requests_per_minute: config.requests_per_minute,
            requests_per_hour: config.requests_per_hour,
            max_concurrency: config.max_concurrency,
            minute_span,
            hour_span,
            state: Mutex::new(LimiterState {
                minute_window: VecDeque::new(),
                hour_window: VecDeque::new(),
                in_flight: 0,
                backoff_until: None,
            }),
        }
    }

    /// Non-blocking attempt to reserve one request slot. On success the
    /// returned guard holds the concurrency slot and releases it exactly
    /// once when dropped, on every exit path.
    pub fn try_acquire(self: &Arc<Self>) -> Option<RateLimitSlot> {
        let now = Instant::now();
        let mut state = self.state.lock().expect("rate limiter lock poisoned");

        if let Some(until) = state.backoff_until {
            if now < until {
                return None;
            }
            state.backoff_until = None;
        }

        Self::prune(&mut state.minute_window, now, self.minute_span);
        Self::prune(&mut state.hour_window, now, self.hour_span);

        if state.minute_window.len() >= self.requests_per_minute as usize {
            return None;
        }
        if state.hour_window.len() >= self.requests_per_hour as usize {
            return None;
        }
        if state.in_flight >= self.max_concurrency {
            return None;
        }

        state.minute_window.push_back(now);
        state.hour_window.push_back(now);
        state.in_flight += 1;

        Some(RateLimitSlot { limiter: Arc::clone(self) })
    }

    /// Refuse new acquisitions until `duration` from now. Requests already
    /// in flight are unaffected.
    pub fn set_backoff(&self, duration: Duration) {
        let mut state = self.state.lock().expect("rate limiter lock poisoned");
        state.backoff_until = Some(Instant::now() + duration);
    }

    pub fn in_flight(&self) -> u32 {
        self.state.lock().expect("rate limiter lock poisoned").in_flight
    }

    pub fn is_backing_off(&self) -> bool {
        let state = self.state.lock().expect("rate limiter lock poisoned");
        matches!(state.backoff_until, Some(until) if Instant::now() < until)
    }

    fn release(&self) {
        let mut state = self.state.lock().expect("rate limiter lock poisoned");
        state.in_flight = state.in_flight.saturating_sub(1);
    }

    /// Drop entries older than the window span. Entries whose age cannot be
    /// computed (timestamp ahead of `now`) are dropped rather than trusted.
    fn prune(window: &mut VecDeque<Instant>, now: Instant, span: Duration) {
        window.retain(|issued| matches!(now.checked_duration_since(*issued), Some(age) if age < span));
    }
}

/// Scoped acquisition guard. Holding the guard holds the concurrency slot;
/// dropping it releases the slot, including on panic or early return.
#[derive(Debug)]
pub struct RateLimitSlot {
    limiter: Arc<RateLimiter>,
}

impl Drop for RateLimitSlot {
    fn drop(&mut self) {
        self.limiter.release();
    }
}
