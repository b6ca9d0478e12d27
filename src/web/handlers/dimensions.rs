//! Language, country, subdivision and city listings
//!
//! All of these read the aggregates precomputed for the current snapshot.
//! Single-entry lookups accept a code or a display name.

use axum::{
    extract::{Path, Query, State},
    response::Response,
};
use serde::Deserialize;

use crate::web::{AppState, responses::handle_result};

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CountryParams {
    pub country: Option<String>,
}

pub async fn list_languages(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Response {
    handle_result(Ok(state.service.languages(params.q.as_deref())))
}

pub async fn get_language(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    handle_result(state.service.language(&code))
}

pub async fn list_countries(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Response {
    handle_result(Ok(state.service.countries(params.q.as_deref())))
}

pub async fn get_country(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    handle_result(state.service.country(&code))
}

pub async fn list_country_subdivisions(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Response {
    handle_result(state.service.country_subdivisions(&code))
}

pub async fn get_country_subdivision(
    State(state): State<AppState>,
    Path((code, sub_code)): Path<(String, String)>,
) -> Response {
    handle_result(state.service.country_subdivision(&code, &sub_code))
}

pub async fn list_subdivisions(
    State(state): State<AppState>,
    Query(params): Query<CountryParams>,
) -> Response {
    handle_result(Ok(state.service.subdivisions(params.country.as_deref())))
}

pub async fn list_cities(
    State(state): State<AppState>,
    Query(params): Query<CountryParams>,
) -> Response {
    handle_result(Ok(state.service.cities(params.country.as_deref())))
}

pub async fn get_city(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    handle_result(state.service.city(&code))
}
