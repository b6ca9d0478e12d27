//! Centralized error handling for the IPTV catalog
//!
//! Errors are grouped by the layer that produces them:
//!
//! - **Load Errors**: per-record problems found while building a catalog
//!   snapshot. These never fail a load; they are aggregated into a summary.
//! - **Query Errors**: invalid caller input, rejected before any work is done.
//! - **Probe Failures**: anything that goes wrong while validating a stream.
//!   These are recorded in the validation cache and never reach a query.
//! - **Ingestion Errors**: playlist or directory retrieval problems. A failed
//!   ingestion leaves the previous catalog snapshot in place.
//!
//! # Usage
//!
//! ```rust
//! use iptv_catalog::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Err(AppError::configuration("pool_width must be greater than zero"))
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for query evaluation results
pub type QueryResult<T> = Result<T, QueryError>;

/// Convenience type alias for ingestion results
pub type IngestionResult<T> = Result<T, IngestionError>;
