//! Process-scoped crawl state, mutated concurrently by many workers.
//!
//! Each aggregate gets its own lock: fine-grained beats one coarse lock
//! here since workers touch different
//! aggregates at different pipeline stages.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use indexmap::IndexMap;
use tokio::sync::RwLock;
use url::Url;

use crate::parser::PageRecord;

#[derive(Default)]
pub struct CrawlerState {
    visited: RwLock<HashSet<Url>>,
    processed: RwLock<IndexMap<Url, PageRecord>>,
    failed: RwLock<HashMap<Url, String>>,
    blocked_by_robots: RwLock<HashSet<Url>>,
    request_times: RwLock<Vec<Duration>>,
}

impl CrawlerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `url` into `visited`, returning whether it was newly
    /// inserted (i.e. this worker committed to processing it). Must be
    /// called before fetching, so two workers racing on the same URL
    /// cannot both proceed.
    pub async fn commit_visit(&self, url: &Url) -> bool {
        self.visited.write().await.insert(url.clone())
    }

    pub async fn visited_count(&self) -> usize {
        self.visited.read().await.len()
    }

    pub async fn record_processed(&self, record: PageRecord) {
        self.processed.write().await.insert(record.url.clone(), record);
    }

    pub async fn record_failed(&self, url: Url, reason: String) {
        self.failed.write().await.insert(url, reason);
    }

    pub async fn record_blocked(&self, url: Url) {
        self.blocked_by_robots.write().await.insert(url);
    }

    pub async fn record_request_time(&self, elapsed: Duration) {
        self.request_times.write().await.push(elapsed);
    }

    pub async fn processed_count(&self) -> usize {
        self.processed.read().await.len()
    }

    pub async fn failed_count(&self) -> usize {
        self.failed.read().await.len()
    }

    pub async fn blocked_count(&self) -> usize {
        self.blocked_by_robots.read().await.len()
    }

    pub async fn average_request_time(&self) -> Duration {
        let times = self.request_times.read().await;
        if times.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = times.iter().sum();
        total / times.len() as u32
    }

    pub async fn processed(&self) -> IndexMap<Url, PageRecord> {
        self.processed.read().await.clone()
    }

    pub async fn failed(&self) -> HashMap<Url, String> {
        self.failed.read().await.clone()
    }

    pub async fn blocked_by_robots(&self) -> HashSet<Url> {
        self.blocked_by_robots.read().await.clone()
    }

    pub async fn is_processed_or_failed_exclusive(&self, url: &Url) -> bool {
        let processed = self.processed.read().await.contains_key(url);
        let failed = self.failed.read().await.contains_key(url);
        !(processed && failed)
    }
}
