//! Stats counters and the progress reporter.
//!
//! Mirrors `stats = {"errors": {}, "success_retries": 0, "retry_times": [],
//! "permanent_failed_urls": {}}` from the Python original, plus the
//! periodic progress line the crawler logs while running.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use dashmap::DashMap;
use url::Url;

use crate::error::ErrorKind;
use crate::state::CrawlerState;

#[derive(Default)]
pub struct Stats {
    errors: DashMap<ErrorKind, u64>,
    success_retries: AtomicU64,
    retry_times: Mutex<Vec<Duration>>,
    permanent_failed_urls: DashMap<Url, String>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_error(&self, kind: ErrorKind) {
        *self.errors.entry(kind).or_insert(0) += 1;
    }

    /// Records a retry about to happen after `delay`. Called synchronously
    /// from the (non-async) `on_retry` callback, so this stays a plain
    /// `std::sync::Mutex` rather than a `tokio::sync` lock.
    pub fn record_retry_delay(&self, attempt: u32, delay: Duration) {
        if attempt > 1 {
            self.success_retries.fetch_add(1, Ordering::Relaxed);
        }
        self.retry_times.lock().unwrap().push(delay);
    }

    pub fn record_permanent_failure(&self, url: Url, reason: String) {
        self.permanent_failed_urls.insert(url, reason);
    }

    pub fn error_counts(&self) -> HashMap<ErrorKind, u64> {
        self.errors.iter().map(|e| (*e.key(), *e.value())).collect()
    }

    pub fn error_count(&self, kind: ErrorKind) -> u64 {
        self.errors.get(&kind).map(|v| *v).unwrap_or(0)
    }

    pub fn success_retries(&self) -> u64 {
        self.success_retries.load(Ordering::Relaxed)
    }

    pub fn permanent_failed_count(&self) -> usize {
        self.permanent_failed_urls.len()
    }
}

/// Samples `state`/`stats` at `interval` and logs a progress line.
/// Terminates once the frontier has been observed empty across two
/// consecutive samples, covering the race where a worker is about to
/// enqueue a freshly-discovered link.
pub async fn run_progress_reporter(
    state: &CrawlerState,
    stats: &Stats,
    frontier_size: impl Fn() -> usize,
    interval: Duration,
) {
    let mut prev_processed = 0usize;
    let mut consecutive_empty = 0u8;

    loop {
        tokio::time::sleep(interval).await;

        let processed = state.processed_count().await;
        let failed = state.failed_count().await;
        let blocked = state.blocked_count().await;
        let in_queue = frontier_size();
        let avg = state.average_request_time().await;
        let speed = (processed.saturating_sub(prev_processed)) as f64 / interval.as_secs_f64();
        prev_processed = processed;

        tracing::info!(
            processed,
            in_queue,
            failed,
            blocked,
            pages_per_sec = speed,
            avg_request_secs = avg.as_secs_f64(),
            retries = stats.success_retries(),
            "crawl progress",
        );

        if in_queue == 0 {
            consecutive_empty += 1;
            if consecutive_empty >= 2 {
                break;
            }
        } else {
            consecutive_empty = 0;
        }
    }
}
