//! Health check HTTP handlers

use axum::{extract::State, response::IntoResponse};
use serde::Serialize;

use crate::services::CatalogInfo;
use crate::validation::CacheStats;
use crate::web::{AppState, responses::ok};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub catalog: CatalogInfo,
    pub validation: CacheStats,
}

/// Liveness plus a summary of the loaded catalog. An empty catalog is
/// reported as `degraded`.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let catalog = state.service.catalog_info();
    let status = if catalog.channels > 0 { "healthy" } else { "degraded" };
    ok(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        catalog,
        validation: state.service.validator().cache().stats(),
    })
}
