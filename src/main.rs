use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iptv_catalog::{
    config::Config,
    ingestor::{CatalogRefresher, CatalogSource, PlaylistIngestor},
    services::CatalogService,
    validation::HttpStreamProber,
    web::{AppState, WebServer},
};

#[derive(Parser)]
#[command(name = "iptv-catalog")]
#[command(version)]
#[command(about = "IPTV channel catalog with filtered queries and live stream validation")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Playlist URL or path (overrides config file)
    #[arg(long, value_name = "URL")]
    playlist: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = if cli.log_level == "trace" {
        format!("iptv_catalog={},tower_http=trace", cli.log_level)
    } else {
        format!("iptv_catalog={},tower_http=info", cli.log_level)
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting IPTV Catalog v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    if let Some(playlist) = cli.playlist {
        config.catalog.playlist_url = playlist;
    }
    config.validate()?;

    let shutdown = CancellationToken::new();
    let prober = Arc::new(HttpStreamProber::new(&config.validation)?);
    let service = CatalogService::new(&config, prober, shutdown.clone());
    let source: Arc<dyn CatalogSource> = Arc::new(PlaylistIngestor::new(&config)?);

    // The server starts even if the first load fails; the refresher retries
    let refresher = Arc::new(CatalogRefresher::new(
        service.clone(),
        source.clone(),
        config.catalog.refresh_interval,
    ));
    if !refresher.refresh().await {
        warn!("Initial catalog load failed; serving an empty catalog until the next refresh");
    }

    let mut tasks = Vec::new();
    tasks.push(tokio::spawn({
        let refresher = refresher.clone();
        let token = shutdown.child_token();
        async move { refresher.run(token).await }
    }));
    if config.validation.sweep_enabled {
        let sweeper = service.sweeper().clone();
        let token = shutdown.child_token();
        tasks.push(tokio::spawn(async move { sweeper.run(token).await }));
    } else {
        info!("Background revalidation disabled");
    }

    let server = WebServer::new(
        &config,
        AppState {
            service: service.clone(),
            source,
        },
    )?;
    info!("Serving API on http://{}:{}", server.host(), server.port());

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, shutting down gracefully"),
                Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
            }
            shutdown.cancel();
        }
    });

    let served = server.serve_with_cancellation(shutdown.clone()).await;
    shutdown.cancel();
    service.validator().shutdown();
    for task in tasks {
        if let Err(e) = task.await {
            error!("Background task ended abnormally: {}", e);
        }
    }

    info!("IPTV Catalog stopped");
    served
}
