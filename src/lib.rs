//! IPTV channel catalog with live stream validation.
//!
//! The catalog is held in memory as an immutable snapshot, queried through
//! [`query::QueryEngine`], and annotated with stream health from a
//! bounded-concurrency [`validation::Validator`].

pub mod catalog;
pub mod config;
pub mod errors;
pub mod ingestor;
pub mod models;
pub mod query;
pub mod services;
pub mod utils;
pub mod validation;
pub mod web;
