//! Domain types shared by the catalog, query and validation layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A channel as supplied by playlist ingestion, before validation.
///
/// Only the stream URL and display name are guaranteed; everything else is
/// whatever the playlist carried.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub url: String,
    pub name: String,
    pub logo: Option<String>,
    pub language: Option<String>,
    pub country: Option<String>,
    pub subdivision: Option<String>,
    pub city: Option<String>,
    pub group: Option<String>,
}

/// A validated channel held by a catalog snapshot. The stream URL is the
/// natural key; names are not unique. Dimension codes are lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub url: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    pub language: String,
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdivision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// A categorical facet channels are grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Language,
    Country,
    Subdivision,
    City,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Language,
        Dimension::Country,
        Dimension::Subdivision,
        Dimension::City,
    ];

    /// Request parameter / field name for this dimension
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Language => "language",
            Dimension::Country => "country",
            Dimension::Subdivision => "subdivision",
            Dimension::City => "city",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate for one language, country, subdivision or city.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionEntry {
    pub code: String,
    pub name: String,
    pub channel_count: usize,
    /// Owning country (subdivisions and cities only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Subdivision codes occurring within this country, ordered (countries only)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub subdivisions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Unknown,
    Working,
    Failed,
}

/// What a successful probe found at the stream URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamKind {
    MasterPlaylist { variants: usize },
    MediaPlaylist { segments: usize },
}

/// Health of one stream URL. Replaced wholesale by every completed probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub status: ValidationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamKind>,
}

impl ValidationRecord {
    /// A record for a URL whose first probe has not completed yet
    pub fn unknown() -> Self {
        Self {
            status: ValidationStatus::Unknown,
            checked_at: None,
            latency_ms: None,
            reason: None,
            stream: None,
        }
    }

    pub fn working(checked_at: DateTime<Utc>, latency_ms: u64, stream: StreamKind) -> Self {
        Self {
            status: ValidationStatus::Working,
            checked_at: Some(checked_at),
            latency_ms: Some(latency_ms),
            reason: None,
            stream: Some(stream),
        }
    }

    pub fn failed<S: Into<String>>(checked_at: DateTime<Utc>, reason: S) -> Self {
        Self {
            status: ValidationStatus::Failed,
            checked_at: Some(checked_at),
            latency_ms: None,
            reason: Some(reason.into()),
            stream: None,
        }
    }

    pub fn is_working(&self) -> bool {
        self.status == ValidationStatus::Working
    }
}

/// A filtered, paginated catalog query.
///
/// At most one dimension filter may be set; when one is, `q` is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    pub q: Option<String>,
    pub language: Option<String>,
    pub country: Option<String>,
    pub subdivision: Option<String>,
    pub city: Option<String>,
    /// 1-based; absent means the first page
    pub page: Option<u32>,
    /// Absent means the configured default page size
    pub limit: Option<u32>,
    pub validate: bool,
    pub working_only: bool,
}

impl QueryRequest {
    /// The dimension filters that are set, in declaration order.
    /// Blank values count as unset.
    pub fn dimension_filters(&self) -> Vec<(Dimension, &str)> {
        [
            (Dimension::Language, &self.language),
            (Dimension::Country, &self.country),
            (Dimension::Subdivision, &self.subdivision),
            (Dimension::City, &self.city),
        ]
        .into_iter()
        .filter_map(|(dimension, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (dimension, v))
        })
        .collect()
    }

    /// Free-text search term, if non-blank
    pub fn search_text(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

/// A channel on a result page, with its validation state when requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelView {
    #[serde(flatten)]
    pub channel: Channel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRecord>,
}

/// One page of query results.
///
/// `total` is the exact number of matching channels when it was computed
/// (never under `working_only`); `has_more` is always set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPage {
    pub channels: Vec<ChannelView>,
    pub page: u32,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_filters_are_ignored() {
        let request = QueryRequest {
            q: Some("   ".to_string()),
            language: Some("hin".to_string()),
            country: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(
            request.dimension_filters(),
            vec![(Dimension::Language, "hin")]
        );
        assert_eq!(request.search_text(), None);
    }

    #[test]
    fn test_validation_record_serializes_lowercase_status() {
        let json = serde_json::to_value(ValidationRecord::unknown()).unwrap();
        assert_eq!(json["status"], "unknown");
        assert!(json.get("checked_at").is_none());
    }
}
