//! Token bucket.

use std::sync::{Mutex, MutexGuard};

use tokio::time::{Duration, Instant};

use crate::config::DEFAULT_REQUESTS_PER_SECOND;

struct BucketState {
    /// May go negative: tokens taken on credit by callers currently sleeping
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket rate limiter.
///
/// The bucket starts full at `requests_per_second` tokens and accrues
/// `elapsed × requests_per_second` tokens on every attempt, capped at capacity.
///
/// A caller that finds less than one token takes its token on credit and sleeps exactly
/// until accrual would have produced it. Waiters therefore queue behind each other
/// instead of all waking at the same instant, and the long-run rate never exceeds the
/// refill rate. Token count and refill timestamp are only touched under the lock, which
/// is never held across an await.
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a full bucket. A rate of 0 falls back to the default rate.
    pub fn new(requests_per_second: u32) -> Self {
        let rps = if requests_per_second == 0 {
            log::warn!(
                "Rate of 0 requests/second is not allowed, using default of {}",
                DEFAULT_REQUESTS_PER_SECOND
            );
            DEFAULT_REQUESTS_PER_SECOND
        } else {
            requests_per_second
        };
        let capacity = f64::from(rps);
        TokenBucket {
            rate: capacity,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        // Poisoning cannot leave the state inconsistent: each update is a single assignment
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
        state.last_refill = now;
    }

    /// Waits until a token is available and consumes it.
    pub async fn take(&self) {
        let wait = {
            let mut state = self.lock();
            self.refill(&mut state, Instant::now());
            state.tokens -= 1.0;
            if state.tokens >= 0.0 {
                return;
            }
            Duration::from_secs_f64(-state.tokens / self.rate)
        };

        tokio::time::sleep(wait).await;

        let mut state = self.lock();
        self.refill(&mut state, Instant::now());
    }

    /// Tokens currently available (negative while callers wait on credit).
    pub fn available(&self) -> f64 {
        let mut state = self.lock();
        self.refill(&mut state, Instant::now());
        state.tokens
    }

    /// Bucket capacity, equal to the refill rate.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Tokens added per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }
}
