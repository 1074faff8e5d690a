//! Per-host rate limiter: minimum inter-request interval plus jitter.
//!
//! `acquire` serializes a single host's requests through that host's own
//! lock; other hosts proceed concurrently — each host gets its own
//! `tokio::sync::Mutex`, lazily created in a `DashMap`, so the sleep for
//! host A never blocks host B's `acquire`. The robots `Crawl-delay` is
//! *not* folded in here: it is additive to this wait, applied as a
//! separate sleep by the caller after `acquire` returns (see
//! `Orchestrator::fetch_url`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::Mutex;

pub struct RateLimiter {
    requests_per_second: f64,
    min_delay: Duration,
    jitter: Duration,
    last_request_at: DashMap<String, Arc<Mutex<Option<Instant>>>>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64, min_delay: Duration, jitter: Duration) -> Self {
        Self {
            requests_per_second,
            min_delay,
            jitter,
            last_request_at: DashMap::new(),
        }
    }

    fn interval(&self) -> Duration {
        let from_rps = if self.requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / self.requests_per_second)
        } else {
            Duration::ZERO
        };
        from_rps.max(self.min_delay)
    }

    fn slot_for(&self, host: &str) -> Arc<Mutex<Option<Instant>>> {
        self.last_request_at
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Wait until this host's minimum interval (plus jitter) has elapsed
    /// since its last request, then record `now` as the new last-request
    /// time. Only acquires `host`'s own lock, held across the sleep; a
    /// different host's `acquire` never blocks on it.
    pub async fn acquire(&self, host: &str) {
        let slot = self.slot_for(host);
        let mut last_request_at = slot.lock().await;

        let now = Instant::now();
        let interval = self.interval();
        let wait = last_request_at
            .map(|last| interval.saturating_sub(now.duration_since(last)))
            .unwrap_or(Duration::ZERO);

        let jittered_wait = if self.jitter > Duration::ZERO {
            let extra = rand::thread_rng().gen_range(0.0..self.jitter.as_secs_f64());
            wait + Duration::from_secs_f64(extra)
        } else {
            wait
        };

        if jittered_wait > Duration::ZERO {
            tokio::time::sleep(jittered_wait).await;
        }

        *last_request_at = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn consecutive_requests_respect_interval() {
        let limiter = RateLimiter::new(2.0, Duration::ZERO, Duration::ZERO);

        let t1 = Instant::now();
        limiter.acquire("example.com").await;
        limiter.acquire("example.com").await;
        let elapsed = t1.elapsed();

        assert!(elapsed >= Duration::from_millis(480), "elapsed={elapsed:?}");
    }

    #[tokio::test]
    async fn different_hosts_do_not_serialize() {
        let limiter = RateLimiter::new(1.0, Duration::ZERO, Duration::ZERO);
        limiter.acquire("a.example").await;

        let t1 = Instant::now();
        limiter.acquire("b.example").await;
        assert!(t1.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn min_delay_is_a_floor() {
        let limiter = RateLimiter::new(1000.0, Duration::from_millis(200), Duration::ZERO);
        let t1 = Instant::now();
        limiter.acquire("example.com").await;
        limiter.acquire("example.com").await;
        assert!(t1.elapsed() >= Duration::from_millis(190));
    }

    /// Regression: a *second* request to host A, sleeping out its pacing
    /// interval, must not block a concurrent first request to host B.
    /// (The old implementation held one global lock across the sleep, so
    /// this would have taken >=1s instead of completing promptly.)
    #[tokio::test]
    async fn a_sleeping_host_does_not_block_another_host_mid_sleep() {
        let limiter = StdArc::new(RateLimiter::new(1.0, Duration::ZERO, Duration::ZERO));

        limiter.acquire("a.example").await;

        let a_limiter = limiter.clone();
        let a_second_call = tokio::spawn(async move {
            a_limiter.acquire("a.example").await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;

        let t1 = Instant::now();
        limiter.acquire("b.example").await;
        assert!(t1.elapsed() < Duration::from_millis(50));

        a_second_call.await.unwrap();
    }
}
