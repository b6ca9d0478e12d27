//! Background revalidation.
//!
//! The sweeper walks the catalog in batches and submits background probes
//! through the same [`Validator::submit`] path interactive queries use, so
//! interactive work always wins free pool slots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::time::{MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{ProbePriority, Validator};
use crate::catalog::CatalogStore;
use crate::config::ValidationConfig;
use crate::errors::{AppError, AppResult};
use crate::utils::jitter::jittered;

/// Which catalog URLs a sweep covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepScope {
    /// URLs whose record is missing or older than the cache TTL
    Stale,
    /// Every URL, fresh or not
    All,
}

/// Progress of the current (or last) sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<SweepScope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub total: usize,
    pub probed: usize,
    pub working: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scope: SweepScope,
    pub total: usize,
    pub working: usize,
    pub failed: usize,
    /// Probes that never reported back (shutdown mid-sweep)
    pub unresolved: usize,
    pub duration_ms: u64,
}

pub struct RevalidationSweeper {
    store: Arc<CatalogStore>,
    validator: Arc<Validator>,
    interval: Duration,
    batch_size: usize,
    running: AtomicBool,
    status: RwLock<SweepStatus>,
}

/// Clears the running flag when a sweep ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RevalidationSweeper {
    pub fn new(
        store: Arc<CatalogStore>,
        validator: Arc<Validator>,
        config: &ValidationConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            validator,
            interval: config.sweep_interval,
            batch_size: config.sweep_batch_size.max(1),
            running: AtomicBool::new(false),
            status: RwLock::new(SweepStatus::default()),
        })
    }

    pub fn status(&self) -> SweepStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn update_status<F: FnOnce(&mut SweepStatus)>(&self, apply: F) {
        apply(&mut self.status.write().unwrap_or_else(PoisonError::into_inner));
    }

    /// Periodically revalidate stale URLs until cancelled
    pub async fn run(&self, cancellation_token: CancellationToken) {
        if self.interval.is_zero() {
            info!("Revalidation sweeper disabled (interval is zero)");
            return;
        }
        let first = tokio::time::Instant::now() + jittered(self.interval, 10);
        let mut ticker = interval_at(first, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval = ?self.interval, batch_size = self.batch_size, "Revalidation sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once(SweepScope::Stale, &cancellation_token).await {
                        Ok(report) => debug!(?report, "Scheduled sweep finished"),
                        Err(AppError::OperationInProgress { .. }) => {
                            debug!("Skipping scheduled sweep; another sweep is running");
                        }
                        Err(e) => error!("Scheduled sweep failed: {}", e),
                    }
                }
                _ = cancellation_token.cancelled() => {
                    info!("Revalidation sweeper received cancellation signal");
                    break;
                }
            }
        }
    }

    /// Start a sweep in the background. Fails if one is already running.
    /// The returned status already covers the new sweep.
    pub fn trigger(
        self: &Arc<Self>,
        scope: SweepScope,
        cancellation_token: CancellationToken,
    ) -> AppResult<SweepStatus> {
        self.claim()?;
        let urls = self.begin(scope);
        let status = self.status();
        let sweeper = self.clone();
        tokio::spawn(async move {
            let report = sweeper.sweep_claimed(scope, urls, &cancellation_token).await;
            debug!(?report, "Triggered sweep finished");
        });
        Ok(status)
    }

    /// Run one sweep to completion.
    ///
    /// URLs are submitted `batch_size` at a time; the next batch is only
    /// submitted once every probe of the current one has reported.
    pub async fn sweep_once(
        &self,
        scope: SweepScope,
        cancellation_token: &CancellationToken,
    ) -> AppResult<SweepReport> {
        self.claim()?;
        let urls = self.begin(scope);
        Ok(self.sweep_claimed(scope, urls, cancellation_token).await)
    }

    fn claim(&self) -> AppResult<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(AppError::operation_in_progress("validation sweep", "catalog"));
        }
        Ok(())
    }

    /// Pick the URLs for `scope` and reset the published status
    fn begin(&self, scope: SweepScope) -> Vec<String> {
        let urls: Vec<String> = {
            let snapshot = self.store.snapshot();
            match scope {
                SweepScope::All => snapshot.urls().map(str::to_string).collect(),
                SweepScope::Stale => self.validator.cache().stale_urls(snapshot.urls(), Utc::now()),
            }
        };
        self.update_status(|status| {
            *status = SweepStatus {
                running: true,
                scope: Some(scope),
                started_at: Some(Utc::now()),
                total: urls.len(),
                ..SweepStatus::default()
            };
        });
        urls
    }

    /// Probe `urls`. The caller must hold the running flag.
    async fn sweep_claimed(
        &self,
        scope: SweepScope,
        urls: Vec<String>,
        cancellation_token: &CancellationToken,
    ) -> SweepReport {
        let _running = RunningGuard(&self.running);
        let started = Instant::now();
        let total = urls.len();
        info!(?scope, total, "Revalidation sweep started");

        let mut working = 0;
        let mut failed = 0;
        let mut unresolved = 0;
        'batches: for batch in urls.chunks(self.batch_size) {
            let receivers: Vec<_> = batch
                .iter()
                .map(|url| self.validator.submit(url, ProbePriority::Background))
                .collect();
            for mut receiver in receivers {
                let outcome = tokio::select! {
                    changed = receiver.wait_for(Option::is_some) => match changed {
                        Ok(record) => record.as_ref().map(|r| r.is_working()),
                        Err(_) => None,
                    },
                    _ = cancellation_token.cancelled() => {
                        unresolved = total - working - failed;
                        break 'batches;
                    }
                };
                match outcome {
                    Some(true) => working += 1,
                    Some(false) => failed += 1,
                    None => unresolved += 1,
                }
                self.update_status(|status| {
                    status.probed = working + failed;
                    status.working = working;
                    status.failed = failed;
                });
            }
        }

        self.update_status(|status| {
            status.running = false;
            status.finished_at = Some(Utc::now());
        });
        let report = SweepReport {
            scope,
            total,
            working,
            failed,
            unresolved,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            ?scope,
            total, working, failed, unresolved, "Revalidation sweep finished in {}ms", report.duration_ms
        );
        report
    }
}
