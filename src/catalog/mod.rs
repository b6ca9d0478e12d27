//! In-memory channel catalog.
//!
//! A [`CatalogStore`] holds one immutable [`CatalogSnapshot`] at a time.
//! Loads build a fresh snapshot off to the side and swap it in, so readers
//! always see one complete catalog.

pub mod dimensions;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::LoadError;
use crate::models::{Channel, ChannelRecord, Dimension};

pub use dimensions::{DimensionDirectory, DimensionIndex};
use dimensions::{DimensionAccumulator, check_consistency, normalize_code};

/// Outcome of a catalog load.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadSummary {
    pub version: u64,
    pub loaded: usize,
    pub dropped: usize,
    /// Dropped record counts keyed by error kind
    pub dropped_by_kind: BTreeMap<String, usize>,
    /// Validation entries removed because their URL left the catalog
    pub evicted: usize,
    pub duration_ms: u64,
    #[serde(skip)]
    pub errors: Vec<LoadError>,
}

/// One immutable generation of the catalog.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    version: u64,
    loaded_at: Option<DateTime<Utc>>,
    channels: Vec<Channel>,
    search_text: Vec<String>,
    postings: HashMap<Dimension, HashMap<String, Vec<usize>>>,
    dimensions: DimensionIndex,
}

impl CatalogSnapshot {
    /// The version-0 snapshot a store starts with
    pub fn empty() -> Self {
        Self::default()
    }

    fn build(
        version: u64,
        records: Vec<ChannelRecord>,
        directory: &DimensionDirectory,
    ) -> (Self, Vec<LoadError>) {
        let mut seen = HashSet::with_capacity(records.len());
        let mut channels = Vec::with_capacity(records.len());
        let mut errors = Vec::new();
        let mut aggregates = DimensionAccumulator::default();

        for record in records {
            match admit(record, directory, &mut seen) {
                Ok(channel) => {
                    aggregates.record(&channel);
                    channels.push(channel);
                }
                Err(e) => {
                    warn!(kind = e.kind(), url = e.url(), "Dropping channel record: {}", e);
                    errors.push(e);
                }
            }
        }

        channels.sort_by_cached_key(|c| (c.name.to_lowercase(), c.name.clone(), c.url.clone()));
        let dimensions = aggregates.finish(directory);

        let mut postings: HashMap<Dimension, HashMap<String, Vec<usize>>> = HashMap::new();
        let mut search_text = Vec::with_capacity(channels.len());
        for (idx, channel) in channels.iter().enumerate() {
            let codes = [
                (Dimension::Language, Some(&channel.language)),
                (Dimension::Country, Some(&channel.country)),
                (Dimension::Subdivision, channel.subdivision.as_ref()),
                (Dimension::City, channel.city.as_ref()),
            ];
            for (dimension, code) in codes {
                if let Some(code) = code {
                    postings
                        .entry(dimension)
                        .or_default()
                        .entry(code.clone())
                        .or_default()
                        .push(idx);
                }
            }
            search_text.push(haystack(channel, &dimensions));
        }

        let snapshot = Self {
            version,
            loaded_at: Some(Utc::now()),
            channels,
            search_text,
            postings,
            dimensions,
        };
        (snapshot, errors)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// All channels in result order
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Indexes (into [`channels`](Self::channels)) of the channels carrying
    /// `code`, in result order. Unknown codes yield an empty slice.
    pub fn posting(&self, dimension: Dimension, code: &str) -> &[usize] {
        self.postings
            .get(&dimension)
            .and_then(|by_code| by_code.get(&normalize_code(code)))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Lowercase text the free-text search matches against
    pub fn search_text(&self, idx: usize) -> &str {
        self.search_text.get(idx).map(String::as_str).unwrap_or("")
    }

    pub fn dimensions(&self) -> &DimensionIndex {
        &self.dimensions
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.url.as_str())
    }
}

/// Name, group label and language/country display names, lowercased and
/// separated so a term cannot match across fields.
fn haystack(channel: &Channel, dimensions: &DimensionIndex) -> String {
    let mut parts = vec![channel.name.to_lowercase()];
    if let Some(group) = &channel.group {
        parts.push(group.to_lowercase());
    }
    parts.push(
        dimensions
            .name_of(Dimension::Language, &channel.language)
            .to_lowercase(),
    );
    parts.push(
        dimensions
            .name_of(Dimension::Country, &channel.country)
            .to_lowercase(),
    );
    parts.join("\n")
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn admit(
    record: ChannelRecord,
    directory: &DimensionDirectory,
    seen: &mut HashSet<String>,
) -> Result<Channel, LoadError> {
    let url = record.url.trim().to_string();
    if url.is_empty() {
        return Err(LoadError::MissingField {
            url,
            field: "url",
        });
    }
    match url::Url::parse(&url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => {}
        _ => return Err(LoadError::InvalidUrl { url }),
    }
    let name = record.name.trim().to_string();
    if name.is_empty() {
        return Err(LoadError::MissingField { url, field: "name" });
    }
    let Some(language) = non_blank(record.language) else {
        return Err(LoadError::MissingField {
            url,
            field: "language",
        });
    };
    let Some(country) = non_blank(record.country) else {
        return Err(LoadError::MissingField {
            url,
            field: "country",
        });
    };

    let channel = Channel {
        name,
        logo: non_blank(record.logo),
        language: normalize_code(&language),
        country: normalize_code(&country),
        subdivision: non_blank(record.subdivision).map(|s| normalize_code(&s)),
        city: non_blank(record.city).map(|c| normalize_code(&c)),
        group: non_blank(record.group),
        url,
    };
    check_consistency(directory, &channel)?;

    if !seen.insert(channel.url.clone()) {
        return Err(LoadError::DuplicateUrl { url: channel.url });
    }
    Ok(channel)
}

/// Versioned holder of the current catalog snapshot.
pub struct CatalogStore {
    current: RwLock<Arc<CatalogSnapshot>>,
    reload_lock: Mutex<()>,
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(CatalogSnapshot::empty())),
            reload_lock: Mutex::new(()),
        }
    }

    /// The current snapshot. The read lock is held only for the pointer clone.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the catalog with `records`.
    ///
    /// Invalid records are dropped and reported in the summary. Loads are
    /// serialized; readers keep using the previous snapshot until the swap.
    pub fn load(&self, records: Vec<ChannelRecord>, directory: &DimensionDirectory) -> LoadSummary {
        let _guard = self.reload_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let started = Instant::now();
        let version = self.snapshot().version() + 1;
        let offered = records.len();

        let (snapshot, errors) = CatalogSnapshot::build(version, records, directory);
        let loaded = snapshot.len();
        debug!(
            version,
            offered,
            languages = snapshot.dimensions().entries(Dimension::Language).len(),
            countries = snapshot.dimensions().entries(Dimension::Country).len(),
            "Built catalog snapshot"
        );

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);

        let mut dropped_by_kind = BTreeMap::new();
        for error in &errors {
            *dropped_by_kind.entry(error.kind().to_string()).or_insert(0) += 1;
        }
        let summary = LoadSummary {
            version,
            loaded,
            dropped: errors.len(),
            dropped_by_kind,
            evicted: 0,
            duration_ms: started.elapsed().as_millis() as u64,
            errors,
        };
        info!(
            version,
            loaded = summary.loaded,
            dropped = summary.dropped,
            "Catalog loaded in {}ms",
            summary.duration_ms
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str, name: &str, language: &str, country: &str) -> ChannelRecord {
        ChannelRecord {
            url: url.to_string(),
            name: name.to_string(),
            language: Some(language.to_string()),
            country: Some(country.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_load_drops_invalid_records() {
        let store = CatalogStore::new();
        let mut inconsistent = record("http://e.com/4", "Four", "eng", "us");
        inconsistent.subdivision = Some("ca-on".to_string());
        let records = vec![
            record("http://e.com/1", "One", "eng", "us"),
            record("http://e.com/1", "One again", "eng", "us"),
            record("ftp://e.com/2", "Two", "eng", "us"),
            ChannelRecord {
                language: None,
                ..record("http://e.com/3", "Three", "eng", "us")
            },
            inconsistent,
        ];

        let summary = store.load(records, &DimensionDirectory::new());
        assert_eq!(summary.loaded, 1);
        assert_eq!(summary.dropped, 4);
        assert_eq!(summary.dropped_by_kind["duplicate_url"], 1);
        assert_eq!(summary.dropped_by_kind["invalid_url"], 1);
        assert_eq!(summary.dropped_by_kind["missing_field"], 1);
        assert_eq!(summary.dropped_by_kind["inconsistent_subdivision"], 1);
    }

    #[test]
    fn test_channels_sorted_and_codes_lowercased() {
        let store = CatalogStore::new();
        store.load(
            vec![
                record("http://e.com/b", "bravo", "ENG", "US"),
                record("http://e.com/a2", "Alpha", "eng", "us"),
                record("http://e.com/a1", "alpha", "hin", "in"),
            ],
            &DimensionDirectory::new(),
        );
        let snapshot = store.snapshot();
        let names: Vec<_> = snapshot.channels().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "alpha", "bravo"]);
        assert_eq!(snapshot.posting(Dimension::Language, "ENG"), &[0, 2]);
        assert_eq!(snapshot.posting(Dimension::Country, "xx"), &[] as &[usize]);
    }

    #[test]
    fn test_search_text_uses_display_names() {
        let store = CatalogStore::new();
        let directory = DimensionDirectory::new()
            .with_language("hin", "Hindi")
            .with_country("in", "India");
        let mut news = record("http://e.com/n", "Aaj Tak", "hin", "in");
        news.group = Some("News".to_string());
        store.load(vec![news], &directory);

        let snapshot = store.snapshot();
        let text = snapshot.search_text(0);
        assert!(text.contains("aaj tak"));
        assert!(text.contains("news"));
        assert!(text.contains("hindi"));
        assert!(text.contains("india"));
    }

    #[test]
    fn test_load_swaps_snapshot_and_bumps_version() {
        let store = CatalogStore::new();
        assert_eq!(store.snapshot().version(), 0);
        let before = store.snapshot();

        let summary = store.load(
            vec![record("http://e.com/1", "One", "eng", "us")],
            &DimensionDirectory::new(),
        );
        assert_eq!(summary.version, 1);
        assert!(before.is_empty());
        assert_eq!(store.snapshot().len(), 1);

        store.load(Vec::new(), &DimensionDirectory::new());
        assert_eq!(store.snapshot().version(), 2);
        assert!(store.snapshot().is_empty());
    }
}
