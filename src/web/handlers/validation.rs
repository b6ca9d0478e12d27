//! Bulk validation endpoints

use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use tracing::info;

use crate::errors::AppError;
use crate::web::{
    AppState,
    responses::{accepted, ok},
};

/// `POST /api/v1/channels/validate-all`: start re-probing every channel.
/// Answers 409 while a sweep is already running.
pub async fn validate_all(State(state): State<AppState>) -> Result<Response, AppError> {
    let status = state.service.trigger_validate_all()?;
    info!(total = state.service.catalog_info().channels, "Validate-all requested");
    Ok(accepted(status).into_response())
}

/// `GET /api/v1/channels/validate-status`
pub async fn validate_status(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.service.validation_status())
}
