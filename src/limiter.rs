//! Two-level concurrency limiter: a global counting semaphore plus a
//! lazily-created per-host counting semaphore.
//!
//! Acquisition order is global then per-host; the guard releases in
//! reverse (per-host first) on every exit path, including cancellation,
//! because the permits are `OwnedSemaphorePermit`s dropped in field order.
//! Acquiring the cheap per-host resource *after* the global one avoids
//! holding a per-host permit while blocked on the global one.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct ConcurrencyLimiter {
    global: Arc<Semaphore>,
    per_domain_limit: usize,
    domain_semaphores: DashMap<String, Arc<Semaphore>>,
}

/// Held permits for one in-flight fetch. Dropping releases per-host then
/// global, in that order, regardless of how the drop is triggered.
pub struct LimiterGuard {
    _domain_permit: OwnedSemaphorePermit,
    _global_permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    pub fn new(global_limit: usize, per_domain_limit: usize) -> Self {
        Self {
            global: Arc::new(Semaphore::new(global_limit)),
            per_domain_limit,
            domain_semaphores: DashMap::new(),
        }
    }

    fn domain_semaphore(&self, host: &str) -> Arc<Semaphore> {
        self.domain_semaphores
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_domain_limit)))
            .clone()
    }

    /// Acquire global then per-host permits. Both are released (in reverse
    /// order) when the returned guard is dropped.
    pub async fn acquire(&self, host: &str) -> LimiterGuard {
        let global_permit = self
            .global
            .clone()
            .acquire_owned()
            .await
            .expect("global semaphore never closed");

        let domain_sem = self.domain_semaphore(host);
        let domain_permit = domain_sem
            .acquire_owned()
            .await
            .expect("per-domain semaphore never closed");

        LimiterGuard {
            _domain_permit: domain_permit,
            _global_permit: global_permit,
        }
    }

    /// Current global permit availability, for invariant checks/tests.
    pub fn global_available(&self) -> usize {
        self.global.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn global_then_domain_ordering_releases_both() {
        let limiter = ConcurrencyLimiter::new(2, 1);
        let initial = limiter.global_available();

        {
            let _g1 = limiter.acquire("a.example").await;
            let _g2 = limiter.acquire("b.example").await;
            assert_eq!(limiter.global_available(), initial - 2);
        }

        assert_eq!(limiter.global_available(), initial);
    }

    #[tokio::test]
    async fn per_domain_limit_serializes_same_host() {
        let limiter = Arc::new(ConcurrencyLimiter::new(10, 1));
        let l2 = limiter.clone();

        let g1 = limiter.acquire("a.example").await;
        let handle = tokio::spawn(async move {
            let _g2 = l2.acquire("a.example").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        drop(g1);
        handle.await.unwrap();
    }
}
