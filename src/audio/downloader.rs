//! Episode audio download.

use crate::error::{HarkError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

/// Some podcast CDNs reject requests without a recognizable client.
const USER_AGENT: &str = "Mozilla/5.0 (compatible; Hark/0.1; +https://github.com/hark-audio/hark)";

/// Fetches episode audio to a local file.
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// HTTP fetcher used in production.
pub struct HttpFetcher {
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

#[async_trait]
impl AudioFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        download_audio(url, dest, self.timeout_secs).await
    }
}

/// Download an episode's audio to `dest`, streaming to disk.
///
/// Fails with `Download` on a non-2xx response, timeout, or network error.
#[instrument(skip_all, fields(url = %url))]
pub async fn download_audio(url: &str, dest: &Path, timeout_secs: u64) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;

    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .header(reqwest::header::ACCEPT, "audio/mpeg,audio/*;q=0.9,*/*;q=0.8")
        .send()
        .await
        .map_err(|e| HarkError::Download(format!("Request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(HarkError::Download(format!(
            "Server returned {} for {url}",
            response.status()
        )));
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| HarkError::Download(format!("Stream error: {e}")))?;
        downloaded += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    info!(
        "Downloaded {:.1} MB to {}",
        downloaded as f64 / (1024.0 * 1024.0),
        dest.display()
    );

    Ok(())
}
