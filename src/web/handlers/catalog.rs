//! Catalog maintenance endpoints

use axum::{
    extract::State,
    response::{IntoResponse, Response},
};

use crate::errors::AppError;
use crate::web::{AppState, responses::ok};

/// `POST /api/v1/catalog/reload`: re-ingest the playlist now. On failure the
/// current catalog keeps serving and the ingestion error is returned.
pub async fn reload_catalog(State(state): State<AppState>) -> Result<Response, AppError> {
    let summary = state.service.reload_from(state.source.as_ref()).await?;
    Ok(ok(summary).into_response())
}
