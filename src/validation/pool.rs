//! Fixed-width probe pool.
//!
//! Jobs arrive on two queues. A single dispatcher takes a pool permit, then
//! pulls the next job, always preferring the interactive queue, and spawns
//! the probe. Probes for the same URL are coalesced through the in-flight
//! map: every requester subscribes to the one running probe's result.

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cache::ValidationCache;
use super::prober::StreamProber;
use crate::errors::ProbeFailure;
use crate::models::ValidationRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbePriority {
    /// A user is waiting on the result
    Interactive,
    /// Sweeps and other housekeeping
    Background,
}

#[derive(Debug)]
struct ProbeJob {
    url: String,
    priority: ProbePriority,
}

/// Receives the outcome of a probe; `None` until the probe completes.
pub type ProbeReceiver = watch::Receiver<Option<ValidationRecord>>;

struct InFlight {
    sender: watch::Sender<Option<ValidationRecord>>,
    /// Set by whichever queue entry is dequeued first
    started: AtomicBool,
    interactive_queued: AtomicBool,
}

/// Counters since start-up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub pool_width: usize,
    pub in_flight: usize,
    pub submitted: u64,
    pub coalesced: u64,
    pub escalated: u64,
    pub completed: u64,
    pub working: u64,
    pub failed: u64,
    pub timeouts: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    coalesced: AtomicU64,
    escalated: AtomicU64,
    completed: AtomicU64,
    working: AtomicU64,
    failed: AtomicU64,
    timeouts: AtomicU64,
}

struct PoolShared {
    cache: Arc<ValidationCache>,
    prober: Arc<dyn StreamProber>,
    in_flight: DashMap<String, Arc<InFlight>>,
    probe_timeout: Duration,
    counters: Counters,
}

pub(crate) struct ProbePool {
    shared: Arc<PoolShared>,
    interactive_tx: mpsc::UnboundedSender<ProbeJob>,
    background_tx: mpsc::UnboundedSender<ProbeJob>,
    pool_width: usize,
    shutdown: CancellationToken,
}

impl ProbePool {
    /// Start the dispatcher. Must be called from within a tokio runtime.
    pub(crate) fn start(
        cache: Arc<ValidationCache>,
        prober: Arc<dyn StreamProber>,
        pool_width: usize,
        probe_timeout: Duration,
    ) -> Self {
        let pool_width = pool_width.max(1);
        let shared = Arc::new(PoolShared {
            cache,
            prober,
            in_flight: DashMap::new(),
            probe_timeout,
            counters: Counters::default(),
        });
        let (interactive_tx, interactive_rx) = mpsc::unbounded_channel();
        let (background_tx, background_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        tokio::spawn(dispatch(
            shared.clone(),
            Arc::new(Semaphore::new(pool_width)),
            interactive_rx,
            background_rx,
            shutdown.clone(),
        ));
        info!(pool_width, ?probe_timeout, "Probe pool started");

        Self {
            shared,
            interactive_tx,
            background_tx,
            pool_width,
            shutdown,
        }
    }

    /// Request a probe of `url`, joining the running probe if there is one.
    ///
    /// An interactive request for a URL that is only queued at background
    /// priority queues it again on the interactive side; the first of the
    /// two entries to be dequeued runs the probe.
    pub(crate) fn submit(&self, url: &str, priority: ProbePriority) -> ProbeReceiver {
        self.shared.cache.mark_unknown(url);
        let counters = &self.shared.counters;

        let (receiver, enqueue) = match self.shared.in_flight.entry(url.to_string()) {
            Entry::Occupied(occupied) => {
                let entry = occupied.get().clone();
                drop(occupied);
                counters.coalesced.fetch_add(1, Ordering::Relaxed);
                let escalate = priority == ProbePriority::Interactive
                    && !entry.started.load(Ordering::Acquire)
                    && !entry.interactive_queued.swap(true, Ordering::AcqRel);
                if escalate {
                    counters.escalated.fetch_add(1, Ordering::Relaxed);
                    debug!(url, "Escalating queued background probe");
                }
                (entry.sender.subscribe(), escalate)
            }
            Entry::Vacant(vacant) => {
                let (sender, receiver) = watch::channel(None);
                vacant.insert(Arc::new(InFlight {
                    sender,
                    started: AtomicBool::new(false),
                    interactive_queued: AtomicBool::new(priority == ProbePriority::Interactive),
                }));
                counters.submitted.fetch_add(1, Ordering::Relaxed);
                (receiver, true)
            }
        };

        if enqueue {
            let job = ProbeJob {
                url: url.to_string(),
                priority,
            };
            let queue = match priority {
                ProbePriority::Interactive => &self.interactive_tx,
                ProbePriority::Background => &self.background_tx,
            };
            if queue.send(job).is_err() {
                warn!(url, "Probe pool is shut down; request dropped");
            }
        }
        receiver
    }

    pub(crate) fn stats(&self) -> PoolStats {
        let counters = &self.shared.counters;
        PoolStats {
            pool_width: self.pool_width,
            in_flight: self.shared.in_flight.len(),
            submitted: counters.submitted.load(Ordering::Relaxed),
            coalesced: counters.coalesced.load(Ordering::Relaxed),
            escalated: counters.escalated.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            working: counters.working.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            timeouts: counters.timeouts.load(Ordering::Relaxed),
        }
    }

    /// Stop dispatching new probes. Running probes finish.
    pub(crate) fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for ProbePool {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn dispatch(
    shared: Arc<PoolShared>,
    permits: Arc<Semaphore>,
    mut interactive: mpsc::UnboundedReceiver<ProbeJob>,
    mut background: mpsc::UnboundedReceiver<ProbeJob>,
    shutdown: CancellationToken,
) {
    loop {
        let permit = tokio::select! {
            _ = shutdown.cancelled() => break,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            Some(job) = interactive.recv() => job,
            Some(job) = background.recv() => job,
            else => break,
        };

        let Some(entry) = shared.claim(&job.url) else {
            debug!(url = %job.url, priority = ?job.priority, "Skipping probe already started");
            continue;
        };

        let shared = shared.clone();
        tokio::spawn(async move {
            shared.execute(&job, entry).await;
            drop(permit);
        });
    }
    debug!("Probe dispatcher stopped");
}

impl PoolShared {
    fn claim(&self, url: &str) -> Option<Arc<InFlight>> {
        let entry = self.in_flight.get(url)?.value().clone();
        if entry.started.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(entry)
        }
    }

    async fn execute(&self, job: &ProbeJob, entry: Arc<InFlight>) {
        let _completion = Completion {
            in_flight: &self.in_flight,
            url: &job.url,
            entry: &entry,
        };

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.probe_timeout, self.prober.probe(&job.url)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProbeFailure::Timeout),
        };
        let checked_at = Utc::now();

        let record = match outcome {
            Ok(stream) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                self.counters.working.fetch_add(1, Ordering::Relaxed);
                debug!(url = %job.url, latency_ms, ?stream, "Stream working");
                ValidationRecord::working(checked_at, latency_ms, stream)
            }
            Err(failure) => {
                if failure == ProbeFailure::Timeout {
                    self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                }
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                debug!(url = %job.url, reason = %failure, "Stream failed");
                ValidationRecord::failed(checked_at, failure.to_string())
            }
        };
        self.counters.completed.fetch_add(1, Ordering::Relaxed);

        // Submission created the entry; if it is gone the URL left the catalog
        if !self.cache.replace_existing(&job.url, record.clone()) {
            debug!(url = %job.url, "Dropping probe result for evicted URL");
        }
        entry.sender.send_replace(Some(record));
    }
}

/// Removes the in-flight entry once its probe is over, including when the
/// probe task unwinds.
struct Completion<'a> {
    in_flight: &'a DashMap<String, Arc<InFlight>>,
    url: &'a str,
    entry: &'a Arc<InFlight>,
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        self.in_flight
            .remove_if(self.url, |_, current| Arc::ptr_eq(current, self.entry));
    }
}
