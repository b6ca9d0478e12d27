//! Periodic catalog refresh.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::CatalogSource;
use crate::services::CatalogService;
use crate::utils::jitter::jittered;

/// Re-ingests the playlist on a fixed interval and reloads the catalog.
/// A failed refresh keeps the previous snapshot and waits for the next tick.
pub struct CatalogRefresher {
    service: Arc<CatalogService>,
    source: Arc<dyn CatalogSource>,
    interval: Duration,
}

impl CatalogRefresher {
    pub fn new(
        service: Arc<CatalogService>,
        source: Arc<dyn CatalogSource>,
        interval: Duration,
    ) -> Self {
        Self {
            service,
            source,
            interval,
        }
    }

    /// Refresh once right now
    pub async fn refresh(&self) -> bool {
        match self.service.reload_from(self.source.as_ref()).await {
            Ok(summary) => {
                info!(
                    version = summary.version,
                    loaded = summary.loaded,
                    dropped = summary.dropped,
                    evicted = summary.evicted,
                    "Catalog refreshed from {}",
                    self.source.describe()
                );
                true
            }
            Err(e) => {
                error!("Catalog refresh failed: {}", e);
                false
            }
        }
    }

    /// Refresh every interval (plus jitter) until cancelled. The first
    /// refresh happens one interval from now.
    pub async fn run(&self, cancellation_token: CancellationToken) {
        if self.interval.is_zero() {
            info!("Catalog refresh disabled (interval is zero)");
            return;
        }
        let first = tokio::time::Instant::now() + jittered(self.interval, 5);
        let mut ticker = interval_at(first, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval = ?self.interval, "Catalog refresher started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh().await;
                }
                _ = cancellation_token.cancelled() => {
                    info!("Catalog refresher received cancellation signal");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::errors::{IngestionResult, ProbeFailure};
    use crate::ingestor::CatalogBatch;
    use crate::models::{ChannelRecord, StreamKind};
    use crate::validation::StreamProber;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Idle;

    #[async_trait]
    impl StreamProber for Idle {
        async fn probe(&self, _url: &str) -> Result<StreamKind, ProbeFailure> {
            Ok(StreamKind::MediaPlaylist { segments: 1 })
        }
    }

    /// Serves one more channel on every fetch
    struct GrowingSource {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl CatalogSource for GrowingSource {
        async fn fetch(&self) -> IngestionResult<CatalogBatch> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            let records = (0..n)
                .map(|i| ChannelRecord {
                    url: format!("http://tv.test/{i}"),
                    name: format!("Channel {i}"),
                    language: Some("eng".to_string()),
                    country: Some("us".to_string()),
                    ..Default::default()
                })
                .collect();
            Ok(CatalogBatch {
                records,
                directory: Default::default(),
            })
        }

        fn describe(&self) -> String {
            "growing".to_string()
        }
    }

    #[tokio::test]
    async fn test_periodic_refresh_reloads_catalog() {
        let service = CatalogService::new(&Config::default(), Arc::new(Idle), CancellationToken::new());
        let source = Arc::new(GrowingSource {
            fetches: AtomicUsize::new(0),
        });
        let refresher = Arc::new(CatalogRefresher::new(
            service.clone(),
            source.clone(),
            Duration::from_millis(40),
        ));

        assert!(refresher.refresh().await);
        assert_eq!(service.catalog_info().channels, 1);

        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let refresher = refresher.clone();
            let cancel = cancel.clone();
            async move { refresher.run(cancel).await }
        });
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
        task.await.unwrap();

        assert!(source.fetches.load(Ordering::SeqCst) >= 2);
        assert_eq!(
            service.catalog_info().channels,
            source.fetches.load(Ordering::SeqCst)
        );
    }
}
