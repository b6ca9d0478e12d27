//! Playlist ingestion.
//!
//! A [`CatalogSource`] produces the raw channel records and dimension
//! directory a catalog load consumes. [`PlaylistIngestor`] is the source
//! backed by a remote (or local) M3U playlist.

use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

pub mod m3u_parser;
pub mod scheduler;

pub use m3u_parser::parse_playlist;
pub use scheduler::CatalogRefresher;

use crate::catalog::DimensionDirectory;
use crate::config::Config;
use crate::errors::{IngestionError, IngestionResult};
use crate::models::ChannelRecord;

/// Everything needed for one catalog load
#[derive(Debug, Clone, Default)]
pub struct CatalogBatch {
    pub records: Vec<ChannelRecord>,
    pub directory: DimensionDirectory,
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self) -> IngestionResult<CatalogBatch>;

    /// Where the records come from, for logs
    fn describe(&self) -> String;
}

pub struct PlaylistIngestor {
    client: Client,
    playlist_url: String,
    directory_path: Option<PathBuf>,
}

impl PlaylistIngestor {
    pub fn new(config: &Config) -> IngestionResult<Self> {
        let client = Client::builder()
            .timeout(config.catalog.fetch_timeout)
            .user_agent(config.validation.user_agent.clone())
            .build()
            .map_err(|e| IngestionError::Fetch {
                url: config.catalog.playlist_url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            playlist_url: config.catalog.playlist_url.clone(),
            directory_path: config.catalog.directory_path.clone(),
        })
    }

    async fn download(&self) -> IngestionResult<String> {
        let fetch_error = |message: String| IngestionError::Fetch {
            url: self.playlist_url.clone(),
            message,
        };

        let is_remote = url::Url::parse(&self.playlist_url)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !is_remote {
            let path = self
                .playlist_url
                .strip_prefix("file://")
                .unwrap_or(&self.playlist_url);
            debug!("Reading playlist from file {}", path);
            return tokio::fs::read_to_string(Path::new(path))
                .await
                .map_err(|e| fetch_error(e.to_string()));
        }

        let response = self
            .client
            .get(&self.playlist_url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(IngestionError::HttpStatus {
                url: self.playlist_url.clone(),
                status: status.as_u16(),
            });
        }
        info!(
            "Connected to playlist {}, content length: {:?} bytes",
            self.playlist_url,
            response.content_length()
        );
        response.text().await.map_err(|e| fetch_error(e.to_string()))
    }
}

#[async_trait]
impl CatalogSource for PlaylistIngestor {
    async fn fetch(&self) -> IngestionResult<CatalogBatch> {
        let started = Instant::now();
        let directory = match &self.directory_path {
            Some(path) => DimensionDirectory::from_json_file(path).await?,
            None => DimensionDirectory::new(),
        };

        let content = self.download().await?;
        let records = parse_playlist(&content, &directory);
        if records.is_empty() {
            return Err(IngestionError::EmptyPlaylist {
                url: self.playlist_url.clone(),
            });
        }

        info!(
            "Ingested {} channel records from {} in {}ms",
            records.len(),
            self.playlist_url,
            started.elapsed().as_millis()
        );
        Ok(CatalogBatch { records, directory })
    }

    fn describe(&self) -> String {
        self.playlist_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_for(playlist: &str, directory: Option<PathBuf>) -> Config {
        let mut config = Config::default();
        config.catalog.playlist_url = playlist.to_string();
        config.catalog.directory_path = directory;
        config
    }

    #[tokio::test]
    async fn test_fetch_from_local_file_with_directory() {
        let dir = tempfile::tempdir().unwrap();
        let playlist_path = dir.path().join("index.m3u");
        let mut playlist = std::fs::File::create(&playlist_path).unwrap();
        writeln!(playlist, "#EXTM3U").unwrap();
        writeln!(playlist, "#EXTINF:-1 tvg-language=\"French\" tvg-country=\"France\",France 24").unwrap();
        writeln!(playlist, "http://streams.test/f24.m3u8").unwrap();

        let directory_path = dir.path().join("directory.json");
        std::fs::write(
            &directory_path,
            r#"{"languages":[{"code":"fra","name":"French"}],"countries":[{"code":"FR","name":"France"}]}"#,
        )
        .unwrap();

        let ingestor = PlaylistIngestor::new(&config_for(
            playlist_path.to_str().unwrap(),
            Some(directory_path),
        ))
        .unwrap();
        let batch = ingestor.fetch().await.unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].language.as_deref(), Some("fra"));
        assert_eq!(batch.records[0].country.as_deref(), Some("fr"));
    }

    #[tokio::test]
    async fn test_empty_playlist_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.m3u");
        std::fs::write(&path, "#EXTM3U\n").unwrap();

        let ingestor = PlaylistIngestor::new(&config_for(path.to_str().unwrap(), None)).unwrap();
        assert!(matches!(
            ingestor.fetch().await,
            Err(IngestionError::EmptyPlaylist { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_directory_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.m3u");
        std::fs::write(&path, "#EXTM3U\nhttp://streams.test/a.m3u8\n").unwrap();

        let ingestor = PlaylistIngestor::new(&config_for(
            path.to_str().unwrap(),
            Some(dir.path().join("missing.json")),
        ))
        .unwrap();
        assert!(matches!(
            ingestor.fetch().await,
            Err(IngestionError::Directory { .. })
        ));
    }
}
