//! Service layer
//!
//! Wires the catalog store, validator, query engine and sweeper together
//! behind one facade for the web layer and background tasks.

pub mod catalog;

pub use catalog::{CatalogInfo, CatalogService, ChannelCount, ChannelSummary, ValidationOverview};
