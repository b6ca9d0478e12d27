//! Filter and pagination over a catalog snapshot.
//!
//! Filtering, counting and slicing only read the snapshot and the
//! validation cache. Network I/O happens solely when a request asks for
//! validation, and then only for the channels on the returned page.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::catalog::{CatalogSnapshot, CatalogStore};
use crate::config::QueryConfig;
use crate::errors::{QueryError, QueryResult};
use crate::models::{
    ChannelView, Dimension, QueryPage, QueryRequest, ValidationRecord, ValidationStatus,
};
use crate::validation::Validator;

/// How candidate channels are selected before pagination
#[derive(Debug, Clone, PartialEq, Eq)]
enum Selection {
    All,
    Dimension(Dimension, String),
    Text(String),
}

/// A request that passed input validation
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueryPlan {
    selection: Selection,
    page: u32,
    limit: u32,
    offset: usize,
}

pub struct QueryEngine {
    store: Arc<CatalogStore>,
    validator: Arc<Validator>,
    config: QueryConfig,
    ensure_fresh_timeout: Duration,
}

impl QueryEngine {
    pub fn new(
        store: Arc<CatalogStore>,
        validator: Arc<Validator>,
        config: QueryConfig,
        ensure_fresh_timeout: Duration,
    ) -> Self {
        Self {
            store,
            validator,
            config,
            ensure_fresh_timeout,
        }
    }

    fn select(&self, request: &QueryRequest) -> QueryResult<Selection> {
        let filters = request.dimension_filters();
        if filters.len() > 1 {
            return Err(QueryError::ConflictingFilters {
                fields: filters
                    .iter()
                    .map(|(dimension, _)| dimension.as_str().to_string())
                    .collect(),
            });
        }

        // A dimension filter takes precedence over free text
        Ok(match filters.first() {
            Some((dimension, code)) => Selection::Dimension(*dimension, code.to_lowercase()),
            None => match request.search_text() {
                Some(text) => Selection::Text(text.to_lowercase()),
                None => Selection::All,
            },
        })
    }

    fn plan(&self, request: &QueryRequest) -> QueryResult<QueryPlan> {
        let selection = self.select(request)?;

        let page = request.page.unwrap_or(1);
        if page == 0 {
            return Err(QueryError::InvalidPage { page });
        }
        let limit = request.limit.unwrap_or(self.config.default_page_size);
        if limit == 0 || limit > self.config.max_page_size {
            return Err(QueryError::InvalidPageSize {
                limit,
                max: self.config.max_page_size,
            });
        }

        Ok(QueryPlan {
            selection,
            page,
            limit,
            offset: (page as usize - 1).saturating_mul(limit as usize),
        })
    }

    /// Exact number of channels matching the request's filters. Paging and
    /// `validate` are ignored. With `working_only`, only channels whose
    /// cached record is working are counted; nothing is probed.
    pub fn count(&self, request: &QueryRequest) -> QueryResult<usize> {
        let selection = self.select(request)?;
        let snapshot = self.store.snapshot();

        if request.working_only {
            let cache = self.validator.cache();
            return Ok(candidates(&snapshot, &selection)
                .filter(|&idx| {
                    cache
                        .get(&snapshot.channels()[idx].url)
                        .is_some_and(|record| record.is_working())
                })
                .count());
        }

        Ok(match &selection {
            Selection::All => snapshot.len(),
            Selection::Dimension(dimension, code) => snapshot.posting(*dimension, code).len(),
            Selection::Text(_) => candidates(&snapshot, &selection).count(),
        })
    }

    /// Evaluate a query against the current snapshot.
    ///
    /// Input errors reject the whole request. With `validate`, the channels
    /// on the page are refreshed within the configured timeout; channels
    /// whose probe is still running are reported as unknown.
    pub async fn query(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> QueryResult<QueryPage> {
        let plan = self.plan(request)?;
        let snapshot = self.store.snapshot();

        let (page, total, has_more) = if request.working_only {
            let page = if request.validate {
                self.validated_working_page(&snapshot, &plan, cancel).await
            } else {
                self.working_page(&snapshot, &plan)
            };
            let has_more = page.len() == plan.limit as usize;
            let page: Vec<_> = page
                .into_iter()
                .map(|(idx, record)| (idx, Some(record)))
                .collect();
            (page, None, has_more)
        } else {
            let (indexes, total) = page_of(&snapshot, &plan);
            let has_more = plan.offset + indexes.len() < total;
            let page = if request.validate {
                self.refresh_page(&snapshot, indexes, cancel).await
            } else {
                indexes.into_iter().map(|idx| (idx, None)).collect()
            };
            (page, Some(total), has_more)
        };

        let channels = page
            .into_iter()
            .map(|(idx, validation)| ChannelView {
                channel: snapshot.channels()[idx].clone(),
                validation,
            })
            .collect::<Vec<_>>();

        debug!(
            version = snapshot.version(),
            page = plan.page,
            limit = plan.limit,
            returned = channels.len(),
            total,
            has_more,
            "Query evaluated"
        );

        Ok(QueryPage {
            channels,
            page: plan.page,
            limit: plan.limit,
            total,
            has_more,
        })
    }

    /// Bring the page's records up to date. Probes still running at the
    /// deadline are reported as unknown.
    async fn refresh_page(
        &self,
        snapshot: &CatalogSnapshot,
        indexes: Vec<usize>,
        cancel: &CancellationToken,
    ) -> Vec<(usize, Option<ValidationRecord>)> {
        let urls: Vec<String> = indexes
            .iter()
            .map(|&idx| snapshot.channels()[idx].url.clone())
            .collect();
        let mut refreshed = self
            .validator
            .ensure_fresh(&urls, self.ensure_fresh_timeout, cancel)
            .await;
        indexes
            .into_iter()
            .zip(urls)
            .map(|(idx, url)| {
                let record = refreshed.remove(&url).unwrap_or_else(ValidationRecord::unknown);
                (idx, Some(record))
            })
            .collect()
    }

    /// Working channels in candidate order, probing missing and stale
    /// records on the way.
    ///
    /// Candidates are refreshed at most `limit` at a time until the page is
    /// full, the candidates run out, the deadline passes or the request is
    /// cancelled. Fresh failures are skipped without probing. A channel whose
    /// probe has not finished by the deadline is left out.
    async fn validated_working_page(
        &self,
        snapshot: &CatalogSnapshot,
        plan: &QueryPlan,
        cancel: &CancellationToken,
    ) -> Vec<(usize, ValidationRecord)> {
        let deadline = Instant::now() + self.ensure_fresh_timeout;
        let limit = plan.limit as usize;
        let cache = self.validator.cache();
        let mut remaining = candidates(snapshot, &plan.selection).filter(|&idx| {
            !cache
                .fresh(&snapshot.channels()[idx].url, Utc::now())
                .is_some_and(|record| record.status == ValidationStatus::Failed)
        });
        let mut skipped = 0;
        let mut page = Vec::with_capacity(limit);

        while page.len() < limit && !cancel.is_cancelled() {
            let now = Instant::now();
            if now >= deadline {
                debug!("Working-only page ran out of time");
                break;
            }
            let batch: Vec<usize> = remaining.by_ref().take(limit - page.len()).collect();
            if batch.is_empty() {
                break;
            }
            let urls: Vec<String> = batch
                .iter()
                .map(|&idx| snapshot.channels()[idx].url.clone())
                .collect();
            let mut refreshed = self.validator.ensure_fresh(&urls, deadline - now, cancel).await;

            for (idx, url) in batch.into_iter().zip(urls) {
                let Some(record) = refreshed.remove(&url).filter(ValidationRecord::is_working) else {
                    continue;
                };
                if skipped < plan.offset {
                    skipped += 1;
                } else if page.len() < limit {
                    page.push((idx, record));
                }
            }
        }
        page
    }

    /// Candidates whose cached status is working, paginated in order,
    /// with the record that qualified them
    fn working_page(
        &self,
        snapshot: &CatalogSnapshot,
        plan: &QueryPlan,
    ) -> Vec<(usize, ValidationRecord)> {
        let cache = self.validator.cache();
        candidates(snapshot, &plan.selection)
            .filter_map(|idx| {
                cache
                    .get(&snapshot.channels()[idx].url)
                    .filter(ValidationRecord::is_working)
                    .map(|record| (idx, record))
            })
            .skip(plan.offset)
            .take(plan.limit as usize)
            .collect()
    }
}

fn candidates<'a>(
    snapshot: &'a CatalogSnapshot,
    selection: &'a Selection,
) -> Box<dyn Iterator<Item = usize> + Send + 'a> {
    match selection {
        Selection::All => Box::new(0..snapshot.len()),
        Selection::Dimension(dimension, code) => {
            Box::new(snapshot.posting(*dimension, code).iter().copied())
        }
        Selection::Text(text) => Box::new(
            (0..snapshot.len()).filter(move |&idx| snapshot.search_text(idx).contains(text.as_str())),
        ),
    }
}

/// The page's channel indexes and the exact number of matches
fn page_of(snapshot: &CatalogSnapshot, plan: &QueryPlan) -> (Vec<usize>, usize) {
    let limit = plan.limit as usize;
    match &plan.selection {
        Selection::All => {
            let total = snapshot.len();
            let start = plan.offset.min(total);
            let end = start.saturating_add(limit).min(total);
            ((start..end).collect(), total)
        }
        Selection::Dimension(dimension, code) => {
            let posting = snapshot.posting(*dimension, code);
            let page = posting.iter().skip(plan.offset).take(limit).copied().collect();
            (page, posting.len())
        }
        selection @ Selection::Text(_) => {
            let mut total = 0;
            let mut page = Vec::with_capacity(limit);
            for idx in candidates(snapshot, selection) {
                if total >= plan.offset && page.len() < limit {
                    page.push(idx);
                }
                total += 1;
            }
            (page, total)
        }
    }
}
