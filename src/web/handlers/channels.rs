//! Channel query endpoints

use axum::{
    extract::{Query, State, rejection::QueryRejection},
    response::{IntoResponse, Response},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::{AppError, QueryError};
use crate::models::QueryRequest;
use crate::web::{
    AppState,
    responses::{handle_result, ok},
};

const REJECTION_PREFIX: &str = "Failed to deserialize query string: ";

/// Turn axum's plain-text rejection into a query error, keeping the name of
/// the offending parameter when the message leads with it
fn invalid_parameter(rejection: QueryRejection) -> QueryError {
    let text = rejection.body_text();
    let message = text.strip_prefix(REJECTION_PREFIX).unwrap_or(&text);
    let field = message
        .split_once(": ")
        .map(|(field, _)| field)
        .filter(|field| {
            !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
        .map(str::to_string);
    QueryError::InvalidParameter {
        field,
        message: message.to_string(),
    }
}

/// `GET /api/v1/channels`
///
/// If the client goes away mid-request the handler future is dropped, which
/// cancels the token and stops further probe submissions.
pub async fn list_channels(
    State(state): State<AppState>,
    query: Result<Query<QueryRequest>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(request) = query.map_err(invalid_parameter)?;
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();
    debug!(?request, "Channel query");

    let page = state.service.query(&request, &cancel).await?;
    Ok(ok(page).into_response())
}

/// `GET /api/v1/channels/count`
pub async fn count_channels(
    State(state): State<AppState>,
    query: Result<Query<QueryRequest>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(request) = query.map_err(invalid_parameter)?;
    Ok(ok(state.service.count(&request)?).into_response())
}

/// `GET /api/v1/channels/summary`
pub async fn channel_summary(State(state): State<AppState>) -> Response {
    handle_result(Ok(state.service.summary()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::FromRequestParts;
    use axum::http::Request;

    async fn reject(uri: &str) -> QueryRejection {
        let (mut parts, _) = Request::builder().uri(uri).body(()).unwrap().into_parts();
        match Query::<QueryRequest>::from_request_parts(&mut parts, &()).await {
            Ok(_) => panic!("{uri} was accepted"),
            Err(rejection) => rejection,
        }
    }

    #[tokio::test]
    async fn test_rejection_names_the_parameter() {
        let error = invalid_parameter(reject("/channels?page=abc").await);
        assert_eq!(error.kind(), "invalid_parameter");
        assert_eq!(error.field().as_deref(), Some("page"));

        let error = invalid_parameter(reject("/channels?limit=-1").await);
        assert_eq!(error.field().as_deref(), Some("limit"));
    }
}
