//! Token-bucket rate limiting for outgoing requests.

use parking_lot::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Rate-limit parameters: steady requests per second plus burst capacity.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Steady-state requests per second.
    pub rate: f64,
    /// Maximum burst capacity in tokens.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { rate: 50.0, burst: 100 }
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A blocking token bucket shared by all request paths of one session.
///
/// `acquire` takes one token, sleeping until the refill makes one
/// available. Lifecycle methods and notifications skip the bucket entirely;
/// that exemption lives in the session, not here.
pub struct RateLimiter {
    state: Mutex<BucketState>,
    rate: f64,
    burst: f64,
}

impl RateLimiter {
    /// Create a bucket that starts full.
    pub fn new(config: RateLimitConfig) -> Self {
        let rate = config.rate.max(0.001);
        let burst = f64::from(config.burst.max(1));
        Self {
            state: Mutex::new(BucketState { tokens: burst, last_refill: Instant::now() }),
            rate,
            burst,
        }
    }

    /// Block until a token is available, then take it.
    pub fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock();
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                // Sleep exactly long enough for the missing fraction.
                Duration::from_secs_f64((1.0 - state.tokens) / self.rate)
            };
            thread::sleep(wait);
        }
    }

    /// Tokens currently available (for diagnostics).
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
        state.last_refill = now;
        state.tokens
    }
}
