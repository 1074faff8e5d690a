//! HTTP fetcher: issues one GET, classifies the response, reads the body
//! safely. Owns no retry policy of its own: `RetryStrategy` wraps this
//! function from the orchestrator.

use std::time::{Duration, Instant};

use reqwest::Client;

use crate::error::FetchError;

pub struct FetchOutcome {
    pub body: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub elapsed: Duration,
}

pub struct Fetcher {
    client: Client,
    user_agent: String,
    total_timeout: Duration,
}

impl Fetcher {
    pub fn new(client: Client, user_agent: String, total_timeout: Duration) -> Self {
        Self {
            client,
            user_agent,
            total_timeout,
        }
    }

    pub async fn do_request(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        let start = Instant::now();

        let response = tokio::time::timeout(
            self.total_timeout,
            self.client
                .get(url)
                .header("User-Agent", self.user_agent.as_str())
                .send(),
        )
        .await
        .map_err(|_| FetchError::transient(None, "Timeout"))?
        .map_err(classify_transport_error)?;

        let status = response.status().as_u16();

        match status {
            200..=299 => {}
            401 | 403 | 404 => {
                return Err(FetchError::permanent(Some(status), format!("HTTP {status}")))
            }
            429 | 500 | 503 => {
                return Err(FetchError::transient(Some(status), format!("HTTP {status}")))
            }
            400..=499 => {
                return Err(FetchError::permanent(Some(status), format!("HTTP {status}")))
            }
            _ if status >= 500 => {
                return Err(FetchError::transient(Some(status), format!("HTTP {status}")))
            }
            _ => {}
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::transient(None, format!("body read failed: {e}")))?;
        let body = String::from_utf8_lossy(&bytes).into_owned();

        Ok(FetchOutcome {
            body,
            status,
            content_type,
            elapsed: start.elapsed(),
        })
    }
}

fn classify_transport_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::transient(None, "Timeout")
    } else if err.is_connect() {
        FetchError::Network(format!("connect failed: {err}"))
    } else {
        FetchError::transient(None, format!("client error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> Fetcher {
        Fetcher::new(
            Client::new(),
            "TestBot".into(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn success_reads_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let outcome = fetcher()
            .do_request(&format!("{}/ok", server.uri()))
            .await
            .unwrap();
        assert_eq!(outcome.body, "hello");
        assert_eq!(outcome.status, 200);
    }

    #[tokio::test]
    async fn classifies_404_as_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetcher()
            .do_request(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Permanent { status: Some(404), .. }));
    }

    #[tokio::test]
    async fn classifies_503_as_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = fetcher()
            .do_request(&format!("{}/busy", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transient { status: Some(503), .. }));
    }

    #[tokio::test]
    async fn classifies_429_as_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = fetcher()
            .do_request(&format!("{}/limited", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transient { status: Some(429), .. }));
    }
}
