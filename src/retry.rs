//! Retry strategy: per-error-kind attempt budgets with exponential backoff
//! and jitter.
//!
//! Counters are per-kind, not global per call. Two different transient
//! kinds in the same call chain each get their own retry budget, mirroring
//! `RetryStrategy.execute_with_retry`'s `attempt_counts` dict keyed by
//! exception type.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::{ErrorKind, FetchError};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_factor: f64,
}

/// Observability callback: `(error, attempt, kind, delay, url)`.
pub type OnRetry = dyn Fn(&FetchError, u32, ErrorKind, Option<Duration>, &str) + Send + Sync;

pub struct RetryStrategy {
    table: HashMap<ErrorKind, RetryPolicy>,
}

impl RetryStrategy {
    pub fn new(table: HashMap<ErrorKind, RetryPolicy>) -> Self {
        Self { table }
    }

    /// Run `op` until it succeeds, a registered kind exhausts its budget,
    /// or an unregistered/non-retryable kind is hit (propagated
    /// immediately).
    pub async fn execute<F, Fut, T>(
        &self,
        url: &str,
        on_retry: &OnRetry,
        mut op: F,
    ) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempts: HashMap<ErrorKind, u32> = HashMap::new();

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let Some(kind) = err.kind() else {
                        // Short-circuit failures (circuit breaker, robots)
                        // are never retried.
                        return Err(err);
                    };
                    let Some(policy) = self.table.get(&kind) else {
                        return Err(err);
                    };

                    let attempt = attempts.entry(kind).or_insert(0);
                    *attempt += 1;

                    if *attempt > policy.max_retries {
                        on_retry(&err, *attempt, kind, None, url);
                        return Err(err);
                    }

                    let backoff = policy.backoff_factor.powi(*attempt as i32 - 1);
                    let jitter = rand::thread_rng().gen_range(0.0..0.5);
                    let delay = Duration::from_secs_f64(backoff + jitter);

                    on_retry(&err, *attempt, kind, Some(delay), url);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
