//! Submission pacing using a token bucket.
//!
//! The scheduler consults a [`PacingGate`] before each batch submission,
//! which throttles outbound submission rate independently of how fast the
//! workers complete. A burst of one and a refill of one token per
//! interval yields the fixed-interval behaviour: the first submission
//! passes immediately, each subsequent one waits out the remainder of the
//! interval.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Token bucket over the tokio clock (so paused-clock tests behave).
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    interval: Duration,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(interval: Duration, burst: u32) -> Self {
        let capacity = f64::from(burst);
        Self {
            tokens: capacity,
            capacity,
            interval,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);

        if self.interval.is_zero() {
            self.tokens = self.capacity;
        } else {
            let refilled = elapsed.as_secs_f64() / self.interval.as_secs_f64();
            self.tokens = (self.tokens + refilled).min(self.capacity);
        }
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn time_until_available(&mut self) -> Duration {
        self.refill();

        if self.tokens >= 1.0 || self.interval.is_zero() {
            return Duration::ZERO;
        }

        Duration::from_secs_f64((1.0 - self.tokens) * self.interval.as_secs_f64())
    }
}

/// Rate gate for batch submissions.
#[derive(Debug)]
pub struct PacingGate {
    bucket: Mutex<TokenBucket>,
}

impl PacingGate {
    /// A gate releasing one submission per `interval`. A zero interval
    /// disables pacing entirely.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(interval, 1)),
        }
    }

    /// Wait until the next submission may proceed.
    pub async fn ready(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock();
                if bucket.try_consume() {
                    return;
                }
                bucket.time_until_available()
            };

            tokio::time::sleep(wait).await;
        }
    }
}
