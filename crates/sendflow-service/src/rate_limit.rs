//! Global token bucket rate limiter.
//!
//! Capacity equals the configured per-second rate; tokens refill
//! continuously at that rate and are clamped to capacity, so a long idle
//! period cannot build up more than one second of burst.

use std::sync::Mutex;
use std::time::Instant;
use tokio::time::Duration;

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket consulted by the drain loop before every dispatch
pub struct TokenBucket {
    capacity: f64,
    rate_per_second: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(rate_per_second: u32) -> Self {
        let capacity = rate_per_second as f64;
        Self {
            capacity,
            rate_per_second: capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token, suspending for exactly the time needed to accrue it
    pub async fn acquire(&self) {
        loop {
            match self.try_take() {
                None => return,
                Some(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Take one token without waiting
    pub fn try_acquire(&self) -> bool {
        self.try_take().is_none()
    }

    /// Tokens currently available
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock().unwrap();
        self.refill(&mut state);
        state.tokens
    }

    /// `None` when a token was taken; otherwise the time until one accrues
    fn try_take(&self) -> Option<Duration> {
        let mut state = self.state.lock().unwrap();
        self.refill(&mut state);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - state.tokens;
            Some(Duration::from_secs_f64(deficit / self.rate_per_second))
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate_per_second).min(self.capacity);
        state.last_refill = now;
    }
}
