//! Per-process minimum-interval rate limiter, shared by a single client.
//!
//! Guarded by a mutex so concurrent callers serialise correctly even
//! though in practice only the queue worker ever dispatches (§4.1).

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

const MIN_RATE: f64 = 0.25;

struct RateLimiterState {
    rate: f64,
    last_dispatch_at: Option<Instant>,
}

pub struct RateLimiter {
    state: Mutex<RateLimiterState>,
}

impl RateLimiter {
    pub fn new(rate: f64) -> Self {
        RateLimiter {
            state: Mutex::new(RateLimiterState {
                rate,
                last_dispatch_at: None,
            }),
        }
    }

    /// `0` disables limiting. Updates take effect on the next dispatch.
    pub fn set_rate(&self, rate: f64) {
        self.state.lock().rate = rate;
    }

    pub fn rate(&self) -> f64 {
        self.state.lock().rate
    }

    /// §4.1 `adapt_rate_limit`: halve the current rate, floor at 0.25 req/s.
    pub fn adapt_rate_limit(&self, _retry_after: u64) {
        let mut state = self.state.lock();
        state.rate = (state.rate / 2.0).max(MIN_RATE);
    }

    /// Wait until `now >= last_dispatch_at + 1/rate`, then record `now` as
    /// the new `last_dispatch_at`. No lock is held across the sleep: the
    /// wait duration is computed and released before `.await`.
    pub async fn wait_turn(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock();
                if state.rate <= 0.0 {
                    state.last_dispatch_at = Some(Instant::now());
                    return;
                }
                let interval = Duration::from_secs_f64(1.0 / state.rate);
                let now = Instant::now();
                match state.last_dispatch_at {
                    None => {
                        state.last_dispatch_at = Some(now);
                        return;
                    }
                    Some(last) => {
                        let ready_at = last + interval;
                        if now >= ready_at {
                            state.last_dispatch_at = Some(now);
                            return;
                        }
                        ready_at - now
                    }
                }
            };
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant as StdInstant;

    #[tokio::test]
    async fn serialises_n_calls_at_rate() {
        let limiter = RateLimiter::new(10.0); // 10 req/s => 100ms apart
        let start = StdInstant::now();
        for _ in 0..4 {
            limiter.wait_turn().await;
        }
        let elapsed = start.elapsed();
        // (n-1)/r = 3/10 = 0.3s, allow 10% slack either side plus scheduler jitter
        assert!(elapsed.as_secs_f64() >= 0.27, "elapsed={elapsed:?}");
    }

    #[tokio::test]
    async fn zero_rate_disables_limiting() {
        let limiter = RateLimiter::new(0.0);
        let start = StdInstant::now();
        for _ in 0..50 {
            limiter.wait_turn().await;
        }
        assert!(start.elapsed().as_millis() < 50);
    }

    #[test]
    fn adapt_rate_limit_halves_with_floor() {
        let limiter = RateLimiter::new(2.0);
        limiter.adapt_rate_limit(30);
        assert_eq!(limiter.rate(), 1.0);
        limiter.adapt_rate_limit(30);
        assert_eq!(limiter.rate(), 0.5);
        limiter.adapt_rate_limit(30);
        assert_eq!(limiter.rate(), 0.25);
        limiter.adapt_rate_limit(30);
        assert_eq!(limiter.rate(), 0.25, "floor at 0.25 req/s");
    }
}
