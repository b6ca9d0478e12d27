//! Web layer module
//!
//! Thin axum handlers over [`CatalogService`]. Handlers hold no logic of
//! their own beyond extracting parameters and rendering the response
//! envelope.

use anyhow::Result;
use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::ingestor::CatalogSource;
use crate::services::CatalogService;

pub mod handlers;
pub mod responses;

pub use responses::{ApiResponse, handle_error, handle_result};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CatalogService>,
    /// Where `POST /api/v1/catalog/reload` fetches from
    pub source: Arc<dyn CatalogSource>,
}

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(config: &Config, state: AppState) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.web.host, config.web.port).parse()?;
        Ok(Self {
            app: Self::router(state),
            addr,
        })
    }

    /// The full application router
    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(handlers::health::health_check))
            .nest("/api/v1", Self::api_v1_routes())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    fn api_v1_routes() -> Router<AppState> {
        Router::new()
            .route("/channels", get(handlers::channels::list_channels))
            .route("/channels/count", get(handlers::channels::count_channels))
            .route("/channels/summary", get(handlers::channels::channel_summary))
            .route(
                "/channels/validate-all",
                post(handlers::validation::validate_all),
            )
            .route(
                "/channels/validate-status",
                get(handlers::validation::validate_status),
            )
            .route("/languages", get(handlers::dimensions::list_languages))
            .route("/languages/{code}", get(handlers::dimensions::get_language))
            .route("/countries", get(handlers::dimensions::list_countries))
            .route("/countries/{code}", get(handlers::dimensions::get_country))
            .route(
                "/countries/{code}/subdivisions",
                get(handlers::dimensions::list_country_subdivisions),
            )
            .route(
                "/countries/{code}/subdivisions/{sub_code}",
                get(handlers::dimensions::get_country_subdivision),
            )
            .route("/subdivisions", get(handlers::dimensions::list_subdivisions))
            .route("/cities", get(handlers::dimensions::list_cities))
            .route("/cities/{code}", get(handlers::dimensions::get_city))
            .route("/catalog/reload", post(handlers::catalog::reload_catalog))
    }

    /// Serve until the token is cancelled, then shut down gracefully
    pub async fn serve_with_cancellation(self, cancellation_token: CancellationToken) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.addr, e))?;
        tracing::info!("Web server listening on {}", self.addr);

        let shutdown_signal = async move {
            cancellation_token.cancelled().await;
            tracing::info!("Web server received cancellation signal, shutting down gracefully");
        };
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal)
            .await?;
        Ok(())
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}
