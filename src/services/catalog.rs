//! Catalog service facade.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::{CatalogStore, DimensionDirectory, LoadSummary};
use crate::config::Config;
use crate::errors::{AppError, AppResult, QueryResult};
use crate::ingestor::CatalogSource;
use crate::models::{ChannelRecord, Dimension, DimensionEntry, QueryPage, QueryRequest};
use crate::query::QueryEngine;
use crate::validation::{
    CacheStats, PoolSettings, PoolStats, RevalidationSweeper, StreamProber, SweepScope,
    SweepStatus, ValidationCache, Validator,
};

/// Summary of the live snapshot
#[derive(Debug, Clone, Serialize)]
pub struct CatalogInfo {
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<DateTime<Utc>>,
    pub channels: usize,
    pub languages: usize,
    pub countries: usize,
    pub subdivisions: usize,
    pub cities: usize,
}

/// Channel and validation counts for the live snapshot
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSummary {
    pub parsed_count: usize,
    /// Channels with a completed probe, working or failed
    pub validated_count: usize,
    pub working_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_loaded: Option<DateTime<Utc>>,
}

/// Exact match count for a filter
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChannelCount {
    pub total: usize,
}

/// Current sweep progress plus cache and pool counters
#[derive(Debug, Clone, Serialize)]
pub struct ValidationOverview {
    pub sweep: SweepStatus,
    pub cache: CacheStats,
    pub pool: PoolStats,
}

pub struct CatalogService {
    store: Arc<CatalogStore>,
    validator: Arc<Validator>,
    query_engine: QueryEngine,
    sweeper: Arc<RevalidationSweeper>,
    reload_lock: tokio::sync::Mutex<()>,
    load_lock: Mutex<()>,
    shutdown: CancellationToken,
}

impl CatalogService {
    /// Build the store, cache, validator and sweeper from configuration.
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: &Config,
        prober: Arc<dyn StreamProber>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let store = Arc::new(CatalogStore::new());
        let cache = Arc::new(ValidationCache::new(config.validation.cache_ttl));
        let validator = Validator::new(cache, prober, PoolSettings::from(&config.validation));
        let query_engine = QueryEngine::new(
            store.clone(),
            validator.clone(),
            config.query.clone(),
            config.validation.ensure_fresh_timeout,
        );
        let sweeper = RevalidationSweeper::new(store.clone(), validator.clone(), &config.validation);

        Arc::new(Self {
            store,
            validator,
            query_engine,
            sweeper,
            reload_lock: tokio::sync::Mutex::new(()),
            load_lock: Mutex::new(()),
            shutdown,
        })
    }

    pub fn store(&self) -> &Arc<CatalogStore> {
        &self.store
    }

    pub fn validator(&self) -> &Arc<Validator> {
        &self.validator
    }

    pub fn sweeper(&self) -> &Arc<RevalidationSweeper> {
        &self.sweeper
    }

    /// Replace the catalog and evict validation records for URLs that left it.
    /// Loads are serialized so eviction always runs against the snapshot it
    /// just installed.
    pub fn load(&self, records: Vec<ChannelRecord>, directory: &DimensionDirectory) -> LoadSummary {
        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut summary = self.store.load(records, directory);
        let snapshot = self.store.snapshot();
        let keep: HashSet<&str> = snapshot.urls().collect();
        summary.evicted = self.validator.cache().evict_except(&keep);
        if summary.evicted > 0 {
            info!(evicted = summary.evicted, "Evicted validation records for removed channels");
        }
        summary
    }

    /// Fetch from `source` and load the result. On failure the current
    /// snapshot stays in place. Reloads run one at a time.
    pub async fn reload_from(&self, source: &dyn CatalogSource) -> AppResult<LoadSummary> {
        let _reload = self.reload_lock.lock().await;
        match source.fetch().await {
            Ok(batch) => Ok(self.load(batch.records, &batch.directory)),
            Err(e) => {
                warn!(
                    "Catalog reload from {} failed, keeping version {}: {}",
                    source.describe(),
                    self.store.snapshot().version(),
                    e
                );
                Err(e.into())
            }
        }
    }

    pub async fn query(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> QueryResult<QueryPage> {
        self.query_engine.query(request, cancel).await
    }

    /// Match count for the request's filters, without building a page
    pub fn count(&self, request: &QueryRequest) -> QueryResult<ChannelCount> {
        let total = self.query_engine.count(request)?;
        Ok(ChannelCount { total })
    }

    pub fn summary(&self) -> ChannelSummary {
        let snapshot = self.store.snapshot();
        let cache = self.validator.cache().stats();
        ChannelSummary {
            parsed_count: snapshot.len(),
            validated_count: cache.working + cache.failed,
            working_count: cache.working,
            last_loaded: snapshot.loaded_at(),
        }
    }

    pub fn catalog_info(&self) -> CatalogInfo {
        let snapshot = self.store.snapshot();
        let dimensions = snapshot.dimensions();
        CatalogInfo {
            version: snapshot.version(),
            loaded_at: snapshot.loaded_at(),
            channels: snapshot.len(),
            languages: dimensions.entries(Dimension::Language).len(),
            countries: dimensions.entries(Dimension::Country).len(),
            subdivisions: dimensions.entries(Dimension::Subdivision).len(),
            cities: dimensions.entries(Dimension::City).len(),
        }
    }

    fn list(&self, dimension: Dimension, q: Option<&str>, country: Option<&str>) -> Vec<DimensionEntry> {
        let needle = q.map(|q| q.trim().to_lowercase()).filter(|q| !q.is_empty());
        let country = country.map(|c| c.trim().to_lowercase()).filter(|c| !c.is_empty());
        self.store
            .snapshot()
            .dimensions()
            .entries(dimension)
            .iter()
            .filter(|entry| match &needle {
                Some(needle) => {
                    entry.name.to_lowercase().contains(needle.as_str()) || entry.code.contains(needle.as_str())
                }
                None => true,
            })
            .filter(|entry| match &country {
                Some(country) => entry.country.as_deref() == Some(country.as_str()),
                None => true,
            })
            .cloned()
            .collect()
    }

    fn lookup(&self, dimension: Dimension, code: &str) -> AppResult<DimensionEntry> {
        self.store
            .snapshot()
            .dimensions()
            .find(dimension, code)
            .cloned()
            .ok_or_else(|| AppError::not_found(dimension.as_str(), code))
    }

    pub fn languages(&self, q: Option<&str>) -> Vec<DimensionEntry> {
        self.list(Dimension::Language, q, None)
    }

    pub fn language(&self, code: &str) -> AppResult<DimensionEntry> {
        self.lookup(Dimension::Language, code)
    }

    pub fn countries(&self, q: Option<&str>) -> Vec<DimensionEntry> {
        self.list(Dimension::Country, q, None)
    }

    pub fn country(&self, code: &str) -> AppResult<DimensionEntry> {
        self.lookup(Dimension::Country, code)
    }

    /// Subdivisions, optionally only those of one country
    pub fn subdivisions(&self, country: Option<&str>) -> Vec<DimensionEntry> {
        self.list(Dimension::Subdivision, None, country)
    }

    /// Subdivisions of a country that has channels
    pub fn country_subdivisions(&self, country: &str) -> AppResult<Vec<DimensionEntry>> {
        let country = self.country(country)?;
        Ok(self.subdivisions(Some(&country.code)))
    }

    /// One subdivision of a country, by code or name
    pub fn country_subdivision(&self, country: &str, subdivision: &str) -> AppResult<DimensionEntry> {
        let country = self.country(country)?;
        let needle = subdivision.trim().to_lowercase();
        self.subdivisions(Some(&country.code))
            .into_iter()
            .find(|entry| entry.code == needle || entry.name.to_lowercase() == needle)
            .ok_or_else(|| AppError::not_found(Dimension::Subdivision.as_str(), subdivision))
    }

    pub fn cities(&self, country: Option<&str>) -> Vec<DimensionEntry> {
        self.list(Dimension::City, None, country)
    }

    pub fn city(&self, code: &str) -> AppResult<DimensionEntry> {
        self.lookup(Dimension::City, code)
    }

    pub fn validation_status(&self) -> ValidationOverview {
        ValidationOverview {
            sweep: self.sweeper.status(),
            cache: self.validator.cache().stats(),
            pool: self.validator.stats(),
        }
    }

    /// Re-probe every catalog URL in the background
    pub fn trigger_validate_all(&self) -> AppResult<SweepStatus> {
        self.sweeper.trigger(SweepScope::All, self.shutdown.child_token())
    }
}
