//! Byte fetching over HTTP(S).
//!
//! The catalog only needs "give me the bytes at this URL"; the `Fetcher`
//! trait is that seam, and `HttpFetcher` is the reqwest-backed implementation.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, info, trace};
use url::Url;

// ============================================================================
// URL Validation
// ============================================================================

/// Validates that a URL can be fetched.
///
/// Checks:
/// - URL scheme must be HTTP or HTTPS
/// - Host must be present
pub fn validate_url(url: &Url) -> Result<()> {
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("URL must use HTTP(S): {}", url);
    }

    if url.host_str().map_or(true, str::is_empty) {
        anyhow::bail!("URL must have a host: {}", url);
    }

    Ok(())
}

// ============================================================================
// Fetcher
// ============================================================================

/// Fetches the bytes behind a URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Returns the full response body.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>>;

    /// Fetches `url` and writes the body to `dest`, creating parent directories.
    async fn save_to_file(&self, url: &Url, dest: &Path) -> Result<u64> {
        let bytes = self.fetch(url).await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        tokio::fs::write(dest, &bytes)
            .await
            .with_context(|| format!("Failed to write file: {}", dest.display()))?;

        debug!("Saved {} bytes from {} to {}", bytes.len(), url, dest.display());
        Ok(bytes.len() as u64)
    }
}

/// `Fetcher` backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        info!("Fetching {}", url);

        validate_url(url)?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to start download from {}", url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!(
                "Download failed with status {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown error")
            );
        }

        let total_bytes = response.content_length();
        debug!("Content-Length: {:?}", total_bytes);

        let mut body = Vec::with_capacity(total_bytes.unwrap_or(0) as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.context("Failed to read chunk from response stream")?;
            body.extend_from_slice(&chunk);
            trace!(downloaded = body.len(), ?total_bytes, "Download progress");
        }

        info!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_validate_url_scheme() {
        assert!(validate_url(&url("https://example.com/game.json")).is_ok());
        assert!(validate_url(&url("http://example.com/game.json")).is_ok());
        assert!(validate_url(&url("file:///etc/passwd")).is_err());
        assert!(validate_url(&url("ftp://example.com/game.json")).is_err());
    }

    #[test]
    fn test_validate_url_requires_host() {
        assert!(validate_url(&url("cardhouse:game")).is_err());
    }

    #[tokio::test]
    async fn test_http_fetcher_rejects_file_urls() {
        let fetcher = HttpFetcher::new();
        let result = fetcher.fetch(&url("file:///tmp/game.json")).await;
        assert!(result.is_err());
    }
}
