//! Error type definitions for the IPTV catalog
//!
//! Every error exposes a stable `kind()` string and, where one exists, the
//! offending field or URL so callers can render a specific message.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid query input
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// Playlist ingestion errors
    #[error("Ingestion error: {0}")]
    Ingestion(#[from] IngestionError),

    /// Resource not found errors
    #[error("Not found: {resource} with code {code}")]
    NotFound { resource: String, code: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Operation already in progress errors
    #[error("Operation already in progress: {operation_type} on {resource}")]
    OperationInProgress {
        operation_type: String,
        resource: String,
    },
}

/// Rejected query input. No partial results are produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// More than one dimension filter was supplied
    #[error("Conflicting filters: only one of {} may be set", fields.join(", "))]
    ConflictingFilters { fields: Vec<String> },

    /// Page numbers are 1-based
    #[error("Invalid page: {page} (pages start at 1)")]
    InvalidPage { page: u32 },

    /// Page size is zero or above the configured maximum
    #[error("Invalid page size: {limit} (must be between 1 and {max})")]
    InvalidPageSize { limit: u32, max: u32 },

    /// A query string value could not be parsed
    #[error("Invalid query parameter: {message}")]
    InvalidParameter {
        field: Option<String>,
        message: String,
    },
}

/// A channel record that was excluded from a catalog load.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// A required attribute is absent or empty
    #[error("Missing {field} for channel {url}")]
    MissingField { url: String, field: &'static str },

    /// The stream URL is not an absolute http(s) URL
    #[error("Invalid stream URL: {url}")]
    InvalidUrl { url: String },

    /// Another record already uses this stream URL
    #[error("Duplicate stream URL: {url}")]
    DuplicateUrl { url: String },

    /// The subdivision does not belong to the channel's country
    #[error("Subdivision {subdivision} is not part of country {country} ({url})")]
    InconsistentSubdivision {
        url: String,
        subdivision: String,
        country: String,
    },

    /// The city does not belong to the channel's country
    #[error("City {city} is not part of country {country} ({url})")]
    InconsistentCity {
        url: String,
        city: String,
        country: String,
    },
}

/// Why a probe recorded a stream as failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    /// The probe did not complete within the per-probe timeout
    #[error("timeout")]
    Timeout,

    /// Connection, TLS or transfer error
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-2xx status
    #[error("http status {0}")]
    HttpStatus(u16),

    /// The body is not a parsable HLS manifest
    #[error("unparseable manifest: {0}")]
    Manifest(String),

    /// The manifest parsed but cannot be played by the client
    #[error("unsupported stream: {0}")]
    Unsupported(String),
}

/// Playlist ingestion specific errors
#[derive(Error, Debug)]
pub enum IngestionError {
    /// The playlist could not be downloaded
    #[error("Failed to fetch playlist {url}: {message}")]
    Fetch { url: String, message: String },

    /// The playlist server answered with a non-2xx status
    #[error("Playlist {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// The dimension directory could not be read or parsed
    #[error("Failed to load dimension directory {path}: {message}")]
    Directory { path: String, message: String },

    /// The playlist contained no channels at all
    #[error("Playlist {url} contained no channels")]
    EmptyPlaylist { url: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a not found error
    pub fn not_found<R: Into<String>, C: Into<String>>(resource: R, code: C) -> Self {
        Self::NotFound {
            resource: resource.into(),
            code: code.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an operation in progress error
    pub fn operation_in_progress<O: Into<String>, R: Into<String>>(
        operation_type: O,
        resource: R,
    ) -> Self {
        Self::OperationInProgress {
            operation_type: operation_type.into(),
            resource: resource.into(),
        }
    }

    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Query(e) => e.kind(),
            AppError::Ingestion(e) => e.kind(),
            AppError::NotFound { .. } => "not_found",
            AppError::Configuration { .. } => "configuration",
            AppError::OperationInProgress { .. } => "operation_in_progress",
        }
    }

    /// The offending field, URL or resource, if the error has one
    pub fn field(&self) -> Option<String> {
        match self {
            AppError::Query(e) => e.field(),
            AppError::Ingestion(e) => e.field(),
            AppError::NotFound { resource, .. } => Some(resource.clone()),
            AppError::OperationInProgress { resource, .. } => Some(resource.clone()),
            _ => None,
        }
    }
}

impl QueryError {
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::ConflictingFilters { .. } => "conflicting_filters",
            QueryError::InvalidPage { .. } => "invalid_page",
            QueryError::InvalidPageSize { .. } => "invalid_page_size",
            QueryError::InvalidParameter { .. } => "invalid_parameter",
        }
    }

    pub fn field(&self) -> Option<String> {
        match self {
            QueryError::ConflictingFilters { fields } => Some(fields.join(",")),
            QueryError::InvalidPage { .. } => Some("page".to_string()),
            QueryError::InvalidPageSize { .. } => Some("limit".to_string()),
            QueryError::InvalidParameter { field, .. } => field.clone(),
        }
    }
}

impl LoadError {
    pub fn kind(&self) -> &'static str {
        match self {
            LoadError::MissingField { .. } => "missing_field",
            LoadError::InvalidUrl { .. } => "invalid_url",
            LoadError::DuplicateUrl { .. } => "duplicate_url",
            LoadError::InconsistentSubdivision { .. } => "inconsistent_subdivision",
            LoadError::InconsistentCity { .. } => "inconsistent_city",
        }
    }

    /// Stream URL of the rejected record
    pub fn url(&self) -> &str {
        match self {
            LoadError::MissingField { url, .. }
            | LoadError::InvalidUrl { url }
            | LoadError::DuplicateUrl { url }
            | LoadError::InconsistentSubdivision { url, .. }
            | LoadError::InconsistentCity { url, .. } => url,
        }
    }
}

impl IngestionError {
    pub fn kind(&self) -> &'static str {
        match self {
            IngestionError::Fetch { .. } => "ingestion_fetch",
            IngestionError::HttpStatus { .. } => "ingestion_http_status",
            IngestionError::Directory { .. } => "ingestion_directory",
            IngestionError::EmptyPlaylist { .. } => "ingestion_empty",
        }
    }

    pub fn field(&self) -> Option<String> {
        match self {
            IngestionError::Fetch { url, .. }
            | IngestionError::HttpStatus { url, .. }
            | IngestionError::EmptyPlaylist { url } => Some(url.clone()),
            IngestionError::Directory { path, .. } => Some(path.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_timeout_reason_is_plain() {
        assert_eq!(ProbeFailure::Timeout.to_string(), "timeout");
        assert_eq!(ProbeFailure::HttpStatus(404).to_string(), "http status 404");
    }

    #[test]
    fn test_query_error_carries_field() {
        let err = AppError::from(QueryError::ConflictingFilters {
            fields: vec!["language".to_string(), "country".to_string()],
        });
        assert_eq!(err.kind(), "conflicting_filters");
        assert_eq!(err.field().as_deref(), Some("language,country"));
        assert!(err.to_string().contains("only one of language, country"));
    }
}
