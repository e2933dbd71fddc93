//! Global request pacing
//!
//! One limiter is shared by every worker. It keeps a single "next eligible"
//! instant so releases are spaced at least `min_interval` apart no matter how
//! many threads call [`RateLimiter::wait`], and adds a random jitter after the
//! paced sleep so the resulting request pattern is not perfectly periodic.

use rand::Rng;
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Shared pacing for outbound fetches
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    jitter: Duration,
    next_eligible: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter
    ///
    /// # Arguments
    ///
    /// * `min_interval` - Minimum spacing between releases across all callers
    /// * `jitter` - Upper bound of the random extra delay after each release
    pub fn new(min_interval: Duration, jitter: Duration) -> Self {
        Self {
            min_interval,
            jitter,
            next_eligible: Mutex::new(None),
        }
    }

    /// Blocks until the caller may issue its next fetch
    pub fn wait(&self) {
        let delay = self.reserve(Instant::now());
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        // Outside the lock so jitter never serializes callers
        let jitter = self.sample_jitter();
        if !jitter.is_zero() {
            thread::sleep(jitter);
        }
    }

    /// Claims the next release slot and returns how long to sleep until it
    fn reserve(&self, now: Instant) -> Duration {
        let mut next = self
            .next_eligible
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let start = match *next {
            Some(eligible) if eligible > now => eligible,
            _ => now,
        };
        *next = Some(start + self.min_interval);

        start - now
    }

    fn sample_jitter(&self) -> Duration {
        let bound = u64::try_from(self.jitter.as_nanos()).unwrap_or(u64::MAX);
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(rand::rng().random_range(0..bound))
    }
}
