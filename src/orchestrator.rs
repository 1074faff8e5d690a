//! Worker pool and orchestrator: wires the frontier, limiters, robots
//! cache, retry strategy, circuit breaker, fetcher, parser, state and
//! sink together into one crawl.
//!
//! Grounded directly in `AsyncCrawler` (`crawler/async_crawler.py`):
//! `fetch_url` becomes [`Orchestrator::fetch_url`], `_process_url`
//! becomes [`Orchestrator::process_url`], and `crawl`'s worker-pool +
//! progress-task shape becomes [`Orchestrator::run`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use url::Url;

use crate::circuit_breaker::CircuitBreaker;
use crate::config::CrawlerSettings;
use crate::error::{ErrorKind, FetchError};
use crate::fetcher::Fetcher;
use crate::frontier::Frontier;
use crate::limiter::ConcurrencyLimiter;
use crate::parser::{self, PageRecord};
use crate::rate_limiter::RateLimiter;
use crate::retry::{RetryPolicy, RetryStrategy};
use crate::robots::RobotsCache;
use crate::sink::PageSink;
use crate::state::CrawlerState;
use crate::stats::{run_progress_reporter, Stats};
use crate::url_filter::UrlFilter;

const GLOBAL_CONCURRENCY_LIMIT: usize = 20;
const PER_DOMAIN_CONCURRENCY_LIMIT: usize = 5;
const CIRCUIT_BREAKER_MAX_ERRORS: usize = 5;
const CIRCUIT_BREAKER_WINDOW: Duration = Duration::from_secs(60);
const CIRCUIT_BREAKER_RESET: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const TOTAL_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const POOL_MAX_IDLE_PER_HOST: usize = 10;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_USER_AGENT: &str = "AsyncCrawler/1.0";

fn default_retry_table() -> std::collections::HashMap<ErrorKind, RetryPolicy> {
    let mut table = std::collections::HashMap::new();
    table.insert(
        ErrorKind::Transient,
        RetryPolicy {
            max_retries: 3,
            backoff_factor: 2.0,
        },
    );
    table.insert(
        ErrorKind::Network,
        RetryPolicy {
            max_retries: 2,
            backoff_factor: 1.5,
        },
    );
    table
}

/// Everything one crawl run needs, built once from [`CrawlerSettings`].
pub struct Orchestrator {
    settings: CrawlerSettings,
    frontier: Frontier,
    state: CrawlerState,
    stats: Stats,
    url_filter: UrlFilter,
    concurrency: ConcurrencyLimiter,
    rate_limiter: RateLimiter,
    robots: RobotsCache,
    retry: RetryStrategy,
    circuit_breaker: CircuitBreaker,
    fetcher: Fetcher,
    sink: Arc<dyn PageSink>,
}

/// Final counts reported once a crawl run completes.
pub struct CrawlSummary {
    pub processed: usize,
    pub failed: usize,
    pub blocked_by_robots: usize,
}

impl Orchestrator {
    pub fn new(settings: CrawlerSettings, sink: Arc<dyn PageSink>) -> Result<Self, crate::error::CrawlerError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build()?;

        let url_filter = UrlFilter::new(
            settings.allowed_domains.clone(),
            settings.include_patterns.clone(),
            settings.exclude_patterns.clone(),
        );

        Ok(Self {
            concurrency: ConcurrencyLimiter::new(GLOBAL_CONCURRENCY_LIMIT, PER_DOMAIN_CONCURRENCY_LIMIT),
            rate_limiter: RateLimiter::new(settings.rate_limit, Duration::ZERO, Duration::ZERO),
            robots: RobotsCache::new(client.clone(), DEFAULT_USER_AGENT.to_string()),
            retry: RetryStrategy::new(default_retry_table()),
            circuit_breaker: CircuitBreaker::new(
                CIRCUIT_BREAKER_MAX_ERRORS,
                CIRCUIT_BREAKER_WINDOW,
                CIRCUIT_BREAKER_RESET,
            ),
            fetcher: Fetcher::new(client, DEFAULT_USER_AGENT.to_string(), TOTAL_REQUEST_TIMEOUT),
            frontier: Frontier::new(),
            state: CrawlerState::new(),
            stats: Stats::new(),
            sink,
            url_filter,
            settings,
        })
    }

    /// Fetch `url`, routed through the circuit breaker, robots policy,
    /// rate limiter, concurrency limiter and retry strategy, in that
    /// order, matching `fetch_url`'s gate sequence.
    async fn fetch_url(&self, url: &Url) -> Result<crate::fetcher::FetchOutcome, FetchError> {
        let host = url.host_str().unwrap_or("").to_string();

        if self.circuit_breaker.is_blocked(&host) {
            return Err(FetchError::ShortCircuit(format!(
                "domain {host} temporarily blocked by circuit breaker"
            )));
        }

        let mut crawl_delay = Duration::ZERO;
        if self.settings.respect_robots {
            if !self.robots.allowed(url).await {
                self.state.record_blocked(url.clone()).await;
                return Err(FetchError::ShortCircuit("blocked by robots.txt".to_string()));
            }
            crawl_delay = self.robots.crawl_delay(url).await;
        }

        self.rate_limiter.acquire(&host).await;
        if crawl_delay > Duration::ZERO {
            tokio::time::sleep(crawl_delay).await;
        }

        let _permit = self.concurrency.acquire(&host).await;

        let stats = &self.stats;
        let url_str = url.as_str();
        let on_retry = move |err: &FetchError, attempt: u32, kind: ErrorKind, delay: Option<Duration>, target: &str| {
            stats.record_error(kind);
            if let Some(delay) = delay {
                stats.record_retry_delay(attempt, delay);
            }
            tracing::warn!(attempt, kind = %kind, url = target, ?delay, error = %err, "retrying");
        };

        let result = self
            .retry
            .execute(url_str, &on_retry, || self.fetcher.do_request(url_str))
            .await;

        match &result {
            Ok(outcome) => self.state.record_request_time(outcome.elapsed).await,
            Err(err) => {
                if let Some(kind) = err.kind() {
                    self.stats.record_error(kind);
                }
                // Only a retry-budget exhaustion (transient/network) opens
                // the breaker; permanent failures and short-circuits
                // (circuit-open, robots-deny) never count as a new error.
                if matches!(err.kind(), Some(ErrorKind::Transient) | Some(ErrorKind::Network)) {
                    self.circuit_breaker.record_error(&host);
                }
            }
        }

        result
    }

    /// Fetch, parse and record one URL, enqueuing any links it yields.
    /// Mirrors `_process_url` + the link-traversal half of `crawl`'s
    /// `worker()`.
    async fn process_url(&self, url: Url, depth: usize) {
        if !self.state.commit_visit(&url).await {
            return;
        }

        let outcome = match self.fetch_url(&url).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.state.record_failed(url.clone(), err.to_string()).await;
                if let FetchError::Permanent { .. } = &err {
                    self.stats.record_permanent_failure(url.clone(), err.to_string());
                }
                tracing::error!(url = %url, error = %err, "fetch failed");
                return;
            }
        };

        let record: PageRecord = parser::parse(
            &outcome.body,
            url.clone(),
            outcome.status,
            outcome.content_type,
            Utc::now(),
        );

        if depth + 1 <= self.settings.max_depth {
            for link in &record.links {
                if let Some(filtered) = self.url_filter.normalize_and_filter(&url, link.as_str()) {
                    self.frontier.add(filtered, depth + 1);
                }
            }
        }

        if let Err(err) = self.sink.save(&record).await {
            tracing::error!(url = %url, error = %err, "sink write failed");
        }
        self.state.record_processed(record).await;
        tracing::info!(url = %url, "processed");
    }

    /// Run the full crawl: seed the frontier, spawn `max_concurrent`
    /// workers plus the progress reporter, and drain until the frontier
    /// is exhausted or `max_pages` pages have been visited. Matches the
    /// worker-pool/`gather` shape of `crawl`.
    pub async fn run(self) -> CrawlSummary {
        let this = Arc::new(self);

        for raw in &this.settings.start_urls {
            let Ok(url) = Url::parse(raw) else {
                tracing::warn!(url = raw, "ignoring unparsable seed URL");
                continue;
            };
            if this.url_filter.is_allowed(&url) {
                this.frontier.add(url, 0);
            }
        }

        let max_pages = this.settings.max_pages;
        let mut workers = Vec::with_capacity(this.settings.max_concurrent);
        for _ in 0..this.settings.max_concurrent {
            let worker = this.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    if worker.state.visited_count().await >= max_pages {
                        break;
                    }
                    let Some(item) = worker.frontier.next() else {
                        break;
                    };
                    worker.process_url(item.url, item.depth).await;
                }
            }));
        }

        let reporter_state = this.clone();
        let reporter = tokio::spawn(async move {
            run_progress_reporter(
                &reporter_state.state,
                &reporter_state.stats,
                || reporter_state.frontier.size(),
                PROGRESS_INTERVAL,
            )
            .await;
        });

        for worker in workers {
            let _ = worker.await;
        }
        let _ = reporter.await;

        if let Err(err) = this.sink.close().await {
            tracing::error!(error = %err, "failed to close sink cleanly");
        }

        CrawlSummary {
            processed: this.state.processed_count().await,
            failed: this.state.failed_count().await,
            blocked_by_robots: this.state.blocked_count().await,
        }
    }
}
