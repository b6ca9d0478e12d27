//! HTTP API behaviour through the full router.

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use iptv_catalog::{
    catalog::DimensionDirectory,
    config::Config,
    errors::{IngestionError, IngestionResult, ProbeFailure},
    ingestor::{CatalogBatch, CatalogSource},
    models::{ChannelRecord, StreamKind},
    services::CatalogService,
    validation::StreamProber,
    web::{AppState, WebServer},
};

struct QuickProber;

#[async_trait]
impl StreamProber for QuickProber {
    async fn probe(&self, url: &str) -> Result<StreamKind, ProbeFailure> {
        if url.contains("offline") {
            Err(ProbeFailure::HttpStatus(503))
        } else {
            Ok(StreamKind::MasterPlaylist { variants: 3 })
        }
    }
}

/// Serves a fixed batch, or fails when told to
struct FixedSource {
    batch: CatalogBatch,
    fail: AtomicBool,
}

#[async_trait]
impl CatalogSource for FixedSource {
    async fn fetch(&self) -> IngestionResult<CatalogBatch> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(IngestionError::HttpStatus {
                url: "http://playlist.test/index.m3u".to_string(),
                status: 500,
            });
        }
        Ok(self.batch.clone())
    }

    fn describe(&self) -> String {
        "fixed test batch".to_string()
    }
}

fn record(path: &str, name: &str, language: &str, country: &str) -> ChannelRecord {
    ChannelRecord {
        url: format!("http://streams.test/{path}"),
        name: name.to_string(),
        language: Some(language.to_string()),
        country: Some(country.to_string()),
        ..Default::default()
    }
}

fn batch() -> CatalogBatch {
    let mut records = vec![
        record("in/aajtak.m3u8", "Aaj Tak", "hin", "in"),
        record("in/ndtv.m3u8", "NDTV India", "hin", "in"),
        record("in/offline.m3u8", "Offline News", "hin", "in"),
        record("gb/bbc.m3u8", "BBC News", "eng", "gb"),
    ];
    records.push(ChannelRecord {
        subdivision: Some("us-ny".to_string()),
        city: Some("usnyc".to_string()),
        ..record("us/ny1.m3u8", "NY1", "eng", "us")
    });
    let directory = DimensionDirectory::new()
        .with_language("hin", "Hindi")
        .with_language("eng", "English")
        .with_country("in", "India")
        .with_country("gb", "United Kingdom")
        .with_country("us", "United States")
        .with_subdivision("us-ny", "New York", "us")
        .with_city("usnyc", "New York City", "us");
    CatalogBatch { records, directory }
}

async fn setup() -> (TestServer, Arc<FixedSource>) {
    let mut config = Config::default();
    config.validation.ensure_fresh_timeout = Duration::from_secs(2);
    let service = CatalogService::new(&config, Arc::new(QuickProber), CancellationToken::new());
    let source = Arc::new(FixedSource {
        batch: batch(),
        fail: AtomicBool::new(false),
    });
    service.reload_from(source.as_ref()).await.unwrap();

    let state = AppState {
        service,
        source: source.clone(),
    };
    let server = TestServer::new(WebServer::router(state)).unwrap();
    (server, source)
}

#[tokio::test]
async fn test_health_reports_catalog() {
    let (server, _) = setup().await;
    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["catalog"]["channels"], 5);
}

#[tokio::test]
async fn test_channel_listing_with_filter() {
    let (server, _) = setup().await;
    let response = server
        .get("/api/v1/channels")
        .add_query_param("language", "hin")
        .add_query_param("limit", 2)
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    let data = &body["data"];
    assert_eq!(data["total"], 3);
    assert_eq!(data["has_more"], true);
    let channels = data["channels"].as_array().unwrap();
    assert_eq!(channels.len(), 2);
    assert_eq!(channels[0]["name"], "Aaj Tak");
    assert!(channels[0].get("validation").is_none());
}

#[tokio::test]
async fn test_conflicting_filters_return_bad_request() {
    let (server, _) = setup().await;
    let response = server
        .get("/api/v1/channels")
        .add_query_param("language", "hin")
        .add_query_param("country", "in")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["details"]["kind"], "conflicting_filters");
}

#[tokio::test]
async fn test_invalid_page_size_returns_bad_request() {
    let (server, _) = setup().await;
    server
        .get("/api/v1/channels")
        .add_query_param("limit", 0)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .get("/api/v1/channels")
        .add_query_param("page", 0)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_validating_query_annotates_channels() {
    let (server, _) = setup().await;
    let response = server
        .get("/api/v1/channels")
        .add_query_param("country", "in")
        .add_query_param("validate", true)
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    let channels = body["data"]["channels"].as_array().unwrap();
    assert_eq!(channels.len(), 3);
    for channel in channels {
        let expected = if channel["name"] == "Offline News" { "failed" } else { "working" };
        assert_eq!(channel["validation"]["status"], expected);
    }

    let working = server
        .get("/api/v1/channels")
        .add_query_param("country", "in")
        .add_query_param("working_only", true)
        .await;
    let body: Value = working.json();
    let names: Vec<_> = body["data"]["channels"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["Aaj Tak", "NDTV India"]);
    assert!(body["data"].get("total").is_none());
}

#[tokio::test]
async fn test_dimension_endpoints() {
    let (server, _) = setup().await;

    let body: Value = server.get("/api/v1/languages").await.json();
    let languages = body["data"].as_array().unwrap();
    assert_eq!(languages.len(), 2);
    assert_eq!(languages[0]["name"], "English");
    assert_eq!(languages[1]["channel_count"], 3);

    let body: Value = server
        .get("/api/v1/countries")
        .add_query_param("q", "united")
        .await
        .json();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let body: Value = server.get("/api/v1/countries/IN").await.json();
    assert_eq!(body["data"]["name"], "India");
    assert_eq!(body["data"]["channel_count"], 3);

    let body: Value = server.get("/api/v1/countries/us/subdivisions").await.json();
    assert_eq!(body["data"][0]["code"], "us-ny");

    let body: Value = server
        .get("/api/v1/cities")
        .add_query_param("country", "us")
        .await
        .json();
    assert_eq!(body["data"][0]["name"], "New York City");
    server.get("/api/v1/cities/usnyc").await.assert_status_ok();
}

#[tokio::test]
async fn test_unknown_codes_are_not_found() {
    let (server, _) = setup().await;
    let response = server.get("/api/v1/countries/zz").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["success"], false);

    server
        .get("/api/v1/languages/xyz")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .get("/api/v1/countries/zz/subdivisions")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_validate_all_and_status() {
    let (server, _) = setup().await;
    let response = server.post("/api/v1/channels/validate-all").await;
    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["data"]["running"], true);
    assert_eq!(body["data"]["total"], 5);

    let mut finished = false;
    for _ in 0..50 {
        let body: Value = server.get("/api/v1/channels/validate-status").await.json();
        if body["data"]["sweep"]["running"] == false {
            assert_eq!(body["data"]["sweep"]["working"], 4);
            assert_eq!(body["data"]["sweep"]["failed"], 1);
            assert_eq!(body["data"]["cache"]["entries"], 5);
            finished = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(finished, "validate-all never finished");
}

#[tokio::test]
async fn test_reload_endpoint() {
    let (server, source) = setup().await;

    let response = server.post("/api/v1/catalog/reload").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["version"], 2);
    assert_eq!(body["data"]["loaded"], 5);

    source.fail.store(true, Ordering::SeqCst);
    server
        .post("/api/v1/catalog/reload")
        .await
        .assert_status(StatusCode::BAD_GATEWAY);

    let body: Value = server.get("/health").await.json();
    assert_eq!(body["data"]["catalog"]["version"], 2);
    assert_eq!(body["data"]["catalog"]["channels"], 5);
}

#[tokio::test]
async fn test_lookups_accept_names() {
    let (server, _) = setup().await;

    let body: Value = server.get("/api/v1/countries/India").await.json();
    assert_eq!(body["data"]["code"], "in");
    let body: Value = server.get("/api/v1/languages/hindi").await.json();
    assert_eq!(body["data"]["code"], "hin");
    let body: Value = server.get("/api/v1/cities/New%20York%20City").await.json();
    assert_eq!(body["data"]["code"], "usnyc");
}

#[tokio::test]
async fn test_country_subdivision_by_code_or_name() {
    let (server, _) = setup().await;

    let response = server.get("/api/v1/countries/us/subdivisions/us-ny").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["name"], "New York");
    assert_eq!(body["data"]["channel_count"], 1);

    let body: Value = server
        .get("/api/v1/countries/United%20States/subdivisions/new%20york")
        .await
        .json();
    assert_eq!(body["data"]["code"], "us-ny");

    server
        .get("/api/v1/countries/in/subdivisions/us-ny")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .get("/api/v1/countries/zz/subdivisions/us-ny")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_channel_count_and_summary() {
    let (server, _) = setup().await;

    let body: Value = server
        .get("/api/v1/channels/count")
        .add_query_param("q", "news")
        .await
        .json();
    assert_eq!(body["data"]["total"], 2);
    let body: Value = server
        .get("/api/v1/channels/count")
        .add_query_param("language", "eng")
        .await
        .json();
    assert_eq!(body["data"]["total"], 2);
    server
        .get("/api/v1/channels/count")
        .add_query_param("language", "eng")
        .add_query_param("city", "usnyc")
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let body: Value = server.get("/api/v1/channels/summary").await.json();
    assert_eq!(body["data"]["parsed_count"], 5);
    assert_eq!(body["data"]["validated_count"], 0);
    assert!(body["data"]["last_loaded"].is_string());

    server
        .get("/api/v1/channels")
        .add_query_param("country", "in")
        .add_query_param("validate", true)
        .await
        .assert_status_ok();
    let body: Value = server.get("/api/v1/channels/summary").await.json();
    assert_eq!(body["data"]["validated_count"], 3);
    assert_eq!(body["data"]["working_count"], 2);
}

#[tokio::test]
async fn test_malformed_parameters_use_the_error_envelope() {
    let (server, _) = setup().await;

    for (name, value) in [("page", "abc"), ("limit", "-1"), ("validate", "maybe")] {
        let response = server
            .get("/api/v1/channels")
            .add_query_param(name, value)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["success"], false);
        assert_eq!(body["details"]["kind"], "invalid_parameter");
        assert_eq!(body["details"]["field"], name);
    }

    let response = server
        .get("/api/v1/channels/count")
        .add_query_param("page", "abc")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["details"]["kind"], "invalid_parameter");
}
