//! robots.txt policy cache.
//!
//! Fetched at most once per host via a short-lived request independent of
//! the main fetch path's retries and rate limiting; robots fetch is a
//! bootstrap step. A network error or non-200 response is treated as
//! allow-all with delay 0, matching `robots_parser.py`'s except-and-allow
//! behavior. Concurrent first callers for the same host coalesce onto one
//! fetch via a per-host `OnceCell`.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use reqwest::Client;
use robotstxt::DefaultMatcher;
use tokio::sync::OnceCell;

struct RobotsEntry {
    content: String,
    crawl_delay: Option<Duration>,
}

pub struct RobotsCache {
    client: Client,
    user_agent: String,
    entries: DashMap<String, Arc<OnceCell<RobotsEntry>>>,
}

impl RobotsCache {
    pub fn new(client: Client, user_agent: String) -> Self {
        Self {
            client,
            user_agent,
            entries: DashMap::new(),
        }
    }

    fn cell_for(&self, host: &str) -> Arc<OnceCell<RobotsEntry>> {
        self.entries
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    async fn entry_for(&self, scheme: &str, host: &str) -> Arc<OnceCell<RobotsEntry>> {
        let cell = self.cell_for(host);
        // get_or_try_init isn't used: a fetch failure resolves to an
        // allow-all entry, it never needs retrying.
        cell.get_or_init(|| async { self.fetch(scheme, host).await })
            .await;
        cell
    }

    async fn fetch(&self, scheme: &str, host: &str) -> RobotsEntry {
        let robots_url = format!("{scheme}://{host}/robots.txt");
        let fetched = self
            .client
            .get(&robots_url)
            .header("User-Agent", self.user_agent.as_str())
            .timeout(Duration::from_secs(10))
            .send()
            .await;

        let content = match fetched {
            Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
            _ => String::new(),
        };

        let crawl_delay = content
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                if !line.to_ascii_lowercase().starts_with("crawl-delay") {
                    return None;
                }
                line.split(':').nth(1)?.trim().parse::<f64>().ok()
            })
            .next()
            .map(Duration::from_secs_f64);

        RobotsEntry {
            content,
            crawl_delay,
        }
    }

    /// Whether `user_agent` may fetch `url` per the cached robots.txt for
    /// its host. An unparseable/missing robots.txt allows everything.
    pub async fn allowed(&self, url: &url::Url) -> bool {
        let Some(host) = url.host_str() else {
            return true;
        };
        let cell = self.entry_for(url.scheme(), host).await;
        let entry = cell.get().expect("just initialized");
        if entry.content.is_empty() {
            return true;
        }
        DefaultMatcher::default().one_agent_allowed_by_robots(
            &entry.content,
            &self.user_agent,
            url.as_str(),
        )
    }

    /// The `Crawl-delay` directive for `url`'s host, or zero.
    pub async fn crawl_delay(&self, url: &url::Url) -> Duration {
        let Some(host) = url.host_str() else {
            return Duration::ZERO;
        };
        let cell = self.entry_for(url.scheme(), host).await;
        cell.get().expect("just initialized").crawl_delay.unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> Client {
        Client::builder().build().unwrap()
    }

    #[tokio::test]
    async fn disallowed_path_is_blocked() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "User-agent: *\nDisallow: /private\n",
            ))
            .mount(&server)
            .await;

        let cache = RobotsCache::new(client(), "TestBot".into());
        let base = url::Url::parse(&server.uri()).unwrap();
        let allowed_url = base.join("/public").unwrap();
        let denied_url = base.join("/private").unwrap();

        assert!(cache.allowed(&allowed_url).await);
        assert!(!cache.allowed(&denied_url).await);
    }

    #[tokio::test]
    async fn missing_robots_txt_allows_all() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let cache = RobotsCache::new(client(), "TestBot".into());
        let url = url::Url::parse(&server.uri()).unwrap().join("/anything").unwrap();
        assert!(cache.allowed(&url).await);
        assert_eq!(cache.crawl_delay(&url).await, Duration::ZERO);
    }

    #[tokio::test]
    async fn crawl_delay_is_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "User-agent: *\nCrawl-delay: 3\n",
            ))
            .mount(&server)
            .await;

        let cache = RobotsCache::new(client(), "TestBot".into());
        let url = url::Url::parse(&server.uri()).unwrap().join("/x").unwrap();
        assert_eq!(cache.crawl_delay(&url).await, Duration::from_secs(3));
    }
}
