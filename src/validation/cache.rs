//! Per-URL validation results.
//!
//! Entries live in a sharded [`DashMap`] so probes completing for different
//! URLs never contend. Records are replaced wholesale; staleness is a read
//! time decision and never deletes anything.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;

use crate::models::{ValidationRecord, ValidationStatus};

/// Counts of cached records per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub unknown: usize,
    pub working: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct ValidationCache {
    entries: DashMap<String, ValidationRecord>,
    ttl: Duration,
}

impl ValidationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, url: &str) -> Option<ValidationRecord> {
        self.entries.get(url).map(|entry| entry.value().clone())
    }

    #[cfg(test)]
    pub(crate) fn put(&self, url: &str, record: ValidationRecord) {
        self.entries.insert(url.to_string(), record);
    }

    /// Replace the record for `url` only if the URL still has an entry.
    /// Returns false when the URL was evicted while its probe ran.
    pub(crate) fn replace_existing(&self, url: &str, record: ValidationRecord) -> bool {
        match self.entries.get_mut(url) {
            Some(mut entry) => {
                *entry = record;
                true
            }
            None => false,
        }
    }

    /// Create an `unknown` record for a URL that has never been probed.
    /// An existing record is left untouched.
    pub(crate) fn mark_unknown(&self, url: &str) {
        if let Entry::Vacant(vacant) = self.entries.entry(url.to_string()) {
            vacant.insert(ValidationRecord::unknown());
        }
    }

    /// A record is stale without a last-checked time or once older than the TTL
    pub fn is_stale(&self, record: &ValidationRecord, now: DateTime<Utc>) -> bool {
        match record.checked_at {
            None => true,
            Some(checked_at) => now
                .signed_duration_since(checked_at)
                .to_std()
                .map(|age| age > self.ttl)
                .unwrap_or(false),
        }
    }

    /// The cached record if it is present and fresh
    pub fn fresh(&self, url: &str, now: DateTime<Utc>) -> Option<ValidationRecord> {
        self.get(url).filter(|record| !self.is_stale(record, now))
    }

    /// URLs from `urls` whose record is missing or stale
    pub fn stale_urls<'a, I>(&self, urls: I, now: DateTime<Utc>) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        urls.into_iter()
            .filter(|url| match self.entries.get(*url) {
                Some(entry) => self.is_stale(entry.value(), now),
                None => true,
            })
            .map(str::to_string)
            .collect()
    }

    /// Drop every record whose URL is not in `keep`, returning how many went
    pub(crate) fn evict_except(&self, keep: &HashSet<&str>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|url, _| keep.contains(url.as_str()));
        before.saturating_sub(self.entries.len())
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for entry in self.entries.iter() {
            stats.entries += 1;
            match entry.value().status {
                ValidationStatus::Unknown => stats.unknown += 1,
                ValidationStatus::Working => stats.working += 1,
                ValidationStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StreamKind;
    use chrono::Duration as ChronoDuration;

    fn working_at(at: DateTime<Utc>) -> ValidationRecord {
        ValidationRecord::working(at, 120, StreamKind::MediaPlaylist { segments: 3 })
    }

    #[test]
    fn test_staleness_follows_ttl() {
        let cache = ValidationCache::new(Duration::from_secs(60));
        let now = Utc::now();

        assert!(cache.is_stale(&ValidationRecord::unknown(), now));
        assert!(!cache.is_stale(&working_at(now - ChronoDuration::seconds(30)), now));
        assert!(cache.is_stale(&working_at(now - ChronoDuration::seconds(90)), now));
        // Clock skew: a record from the future counts as fresh
        assert!(!cache.is_stale(&working_at(now + ChronoDuration::seconds(5)), now));
    }

    #[test]
    fn test_mark_unknown_keeps_existing_record() {
        let cache = ValidationCache::new(Duration::from_secs(60));
        let now = Utc::now();
        cache.put("http://a", working_at(now));
        cache.mark_unknown("http://a");
        cache.mark_unknown("http://b");

        assert!(cache.get("http://a").unwrap().is_working());
        assert_eq!(cache.get("http://b").unwrap().status, ValidationStatus::Unknown);
        assert_eq!(cache.fresh("http://a", now).map(|r| r.status), Some(ValidationStatus::Working));
        assert!(cache.fresh("http://b", now).is_none());
    }

    #[test]
    fn test_stale_urls_and_eviction() {
        let cache = ValidationCache::new(Duration::from_secs(60));
        let now = Utc::now();
        cache.put("http://fresh", working_at(now));
        cache.put("http://old", working_at(now - ChronoDuration::minutes(5)));
        cache.put("http://gone", ValidationRecord::failed(now, "timeout"));

        let stale = cache.stale_urls(["http://fresh", "http://old", "http://never"], now);
        assert_eq!(stale, vec!["http://old", "http://never"]);

        let keep: HashSet<&str> = ["http://fresh", "http://old"].into_iter().collect();
        assert_eq!(cache.evict_except(&keep), 1);
        assert!(cache.get("http://gone").is_none());

        let stats = cache.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.working, 2);
        assert_eq!(stats.failed, 0);
    }
}
