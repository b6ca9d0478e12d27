//! Stream probing.
//!
//! A probe answers one question: does this URL currently serve an HLS
//! playlist a browser can play? The [`StreamProber`] trait is the seam the
//! validator schedules against; [`HttpStreamProber`] is the network-backed
//! implementation.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use tracing::debug;

use super::manifest::classify_manifest;
use crate::config::ValidationConfig;
use crate::errors::ProbeFailure;
use crate::models::StreamKind;

#[async_trait]
pub trait StreamProber: Send + Sync {
    /// Probe `url` once. Implementations do not retry and are not required to
    /// enforce the overall probe timeout; the validator does that.
    async fn probe(&self, url: &str) -> Result<StreamKind, ProbeFailure>;
}

/// Fetches the stream URL with a GET and classifies the manifest body.
pub struct HttpStreamProber {
    client: Client,
    max_manifest_bytes: usize,
}

impl HttpStreamProber {
    pub fn new(config: &ValidationConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.probe_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self::with_client(client, config.max_manifest_bytes))
    }

    pub fn with_client(client: Client, max_manifest_bytes: usize) -> Self {
        Self {
            client,
            max_manifest_bytes,
        }
    }

    /// Read at most `max_manifest_bytes` of the body. Returns the bytes and
    /// whether the body was cut short.
    async fn read_bounded(&self, response: reqwest::Response) -> Result<(Vec<u8>, bool), ProbeFailure> {
        let mut body = response.bytes_stream();
        let mut collected: Vec<u8> = Vec::with_capacity(8192);
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(network_failure)?;
            let room = self.max_manifest_bytes - collected.len();
            if chunk.len() > room {
                collected.extend_from_slice(&chunk[..room]);
                return Ok((collected, true));
            }
            collected.extend_from_slice(&chunk);
        }
        Ok((collected, false))
    }
}

#[async_trait]
impl StreamProber for HttpStreamProber {
    async fn probe(&self, url: &str) -> Result<StreamKind, ProbeFailure> {
        let response = self.client.get(url).send().await.map_err(network_failure)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeFailure::HttpStatus(status.as_u16()));
        }

        let (body, truncated) = self.read_bounded(response).await?;
        debug!(url, bytes = body.len(), truncated, "Fetched manifest");
        classify_manifest(&body, truncated)
    }
}

fn network_failure(error: reqwest::Error) -> ProbeFailure {
    if error.is_timeout() {
        ProbeFailure::Timeout
    } else {
        ProbeFailure::Network(error.to_string())
    }
}
