//! Per-host circuit breaker: a sliding-window error count that quarantines
//! a host once it crosses `max_errors`, for `reset_timeout`.
//!
//! While blocked, fetches for that host short-circuit to failure without
//! counting as a new error and without hitting the network.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;

struct HostState {
    errors: VecDeque<Instant>,
    unblock_at: Option<Instant>,
}

impl HostState {
    fn new() -> Self {
        Self {
            errors: VecDeque::new(),
            unblock_at: None,
        }
    }
}

pub struct CircuitBreaker {
    max_errors: usize,
    window: Duration,
    reset_timeout: Duration,
    hosts: DashMap<String, HostState>,
}

impl CircuitBreaker {
    pub fn new(max_errors: usize, window: Duration, reset_timeout: Duration) -> Self {
        Self {
            max_errors,
            window,
            reset_timeout,
            hosts: DashMap::new(),
        }
    }

    /// Record a transient/network failure for `host`, opening the breaker
    /// if the sliding window now holds `max_errors` or more.
    pub fn record_error(&self, host: &str) {
        let now = Instant::now();
        let mut state = self.hosts.entry(host.to_string()).or_insert_with(HostState::new);

        state.errors.push_back(now);
        while let Some(&front) = state.errors.front() {
            if now.duration_since(front) > self.window {
                state.errors.pop_front();
            } else {
                break;
            }
        }

        if state.errors.len() >= self.max_errors {
            state.unblock_at = Some(now + self.reset_timeout);
        }
    }

    /// Whether `host` is currently quarantined. Clears expired quarantines
    /// (and their error history) as a side effect, re-admitting traffic.
    pub fn is_blocked(&self, host: &str) -> bool {
        let Some(mut state) = self.hosts.get_mut(host) else {
            return false;
        };

        match state.unblock_at {
            Some(unblock_at) if Instant::now() < unblock_at => true,
            Some(_) => {
                state.unblock_at = None;
                state.errors.clear();
                false
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_max_errors_in_window() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60), Duration::from_millis(50));
        assert!(!breaker.is_blocked("h"));
        breaker.record_error("h");
        breaker.record_error("h");
        assert!(!breaker.is_blocked("h"));
        breaker.record_error("h");
        assert!(breaker.is_blocked("h"));
    }

    #[test]
    fn reopens_traffic_after_reset_timeout() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60), Duration::from_millis(10));
        breaker.record_error("h");
        assert!(breaker.is_blocked("h"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(!breaker.is_blocked("h"));
    }

    #[test]
    fn errors_outside_window_do_not_count() {
        let breaker = CircuitBreaker::new(2, Duration::from_millis(10), Duration::from_secs(60));
        breaker.record_error("h");
        std::thread::sleep(Duration::from_millis(20));
        breaker.record_error("h");
        assert!(!breaker.is_blocked("h"));
    }
}
