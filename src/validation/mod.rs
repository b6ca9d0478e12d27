//! Stream validation.
//!
//! The [`Validator`] is the only writer of the [`ValidationCache`]. Callers
//! either submit a probe and watch for its result, or ask for a set of URLs
//! to be made fresh within a deadline via [`Validator::ensure_fresh`].

pub mod cache;
pub mod manifest;
pub mod pool;
pub mod prober;
pub mod sweep;

use chrono::Utc;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ValidationConfig;
use crate::models::ValidationRecord;

pub use cache::{CacheStats, ValidationCache};
pub use pool::{PoolStats, ProbePriority, ProbeReceiver};
pub use prober::{HttpStreamProber, StreamProber};
pub use sweep::{RevalidationSweeper, SweepReport, SweepScope, SweepStatus};

use pool::ProbePool;

/// Pool sizing for a [`Validator`]
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub pool_width: usize,
    pub probe_timeout: Duration,
}

impl From<&ValidationConfig> for PoolSettings {
    fn from(config: &ValidationConfig) -> Self {
        Self {
            pool_width: config.pool_width,
            probe_timeout: config.probe_timeout,
        }
    }
}

pub struct Validator {
    cache: Arc<ValidationCache>,
    pool: ProbePool,
}

impl Validator {
    /// Create a validator and start its probe pool. Must be called from
    /// within a tokio runtime.
    pub fn new(
        cache: Arc<ValidationCache>,
        prober: Arc<dyn StreamProber>,
        settings: PoolSettings,
    ) -> Arc<Self> {
        let pool = ProbePool::start(
            cache.clone(),
            prober,
            settings.pool_width,
            settings.probe_timeout,
        );
        Arc::new(Self { cache, pool })
    }

    pub fn cache(&self) -> &Arc<ValidationCache> {
        &self.cache
    }

    /// Queue a probe of `url`. Creates an `unknown` record for URLs never seen
    /// before. The receiver yields the record once the probe completes.
    pub fn submit(&self, url: &str, priority: ProbePriority) -> ProbeReceiver {
        self.pool.submit(url, priority)
    }

    /// Bring the records for `urls` up to date, waiting at most `timeout`.
    ///
    /// Fresh cache entries are returned as they are. Every other URL gets an
    /// interactive probe; URLs whose probe has not finished by the deadline
    /// (or by cancellation) are absent from the result. Their probes keep
    /// running and still update the cache. After cancellation no further
    /// probes are submitted.
    pub async fn ensure_fresh(
        &self,
        urls: &[String],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> HashMap<String, ValidationRecord> {
        let deadline = tokio::time::Instant::now() + timeout;
        let now = Utc::now();
        let mut results = HashMap::with_capacity(urls.len());
        let mut pending = FuturesUnordered::new();

        for url in urls {
            if results.contains_key(url) {
                continue;
            }
            if let Some(record) = self.cache.fresh(url, now) {
                results.insert(url.clone(), record);
                continue;
            }
            if cancel.is_cancelled() {
                debug!(url, "Request cancelled; not submitting further probes");
                break;
            }
            let mut receiver = self.submit(url, ProbePriority::Interactive);
            let url = url.clone();
            pending.push(async move {
                let record = match receiver.wait_for(Option::is_some).await {
                    Ok(value) => value.clone(),
                    Err(_) => None,
                };
                (url, record)
            });
        }

        let expired = tokio::time::sleep_until(deadline);
        tokio::pin!(expired);
        let outstanding = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break pending.len(),
                _ = &mut expired => break pending.len(),
                next = pending.next() => match next {
                    Some((url, Some(record))) => {
                        results.insert(url, record);
                    }
                    Some((_, None)) => {}
                    None => break 0,
                },
            }
        };
        if outstanding > 0 {
            debug!(outstanding, "Returning before all probes completed");
        }
        results
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Stop starting new probes. Used on shutdown.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}
