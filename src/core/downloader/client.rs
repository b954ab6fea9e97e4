use std::path::Path;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};

/// Fetches a remote file onto the local disk.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// Downloads `url` to `dest`, optionally validating a SHA-256 hex digest.
    /// Returns the number of bytes written.
    async fn download(&self, url: &str, dest: &Path, sha256: Option<&str>) -> LauncherResult<u64>;
}

/// Streaming, SHA-256 validated downloader.
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpFetch for Downloader {
    /// Creates parent directories as needed and removes the partial file when
    /// anything goes wrong, so `dest` either holds the whole payload or nothing.
    async fn download(&self, url: &str, dest: &Path, sha256: Option<&str>) -> LauncherResult<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }

        let result = stream_to_file(&self.client, url, dest, sha256).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(dest).await;
        }
        result
    }
}

async fn stream_to_file(
    client: &Client,
    url: &str,
    dest: &Path,
    sha256_expected: Option<&str>,
) -> LauncherResult<u64> {
    let response = client.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(LauncherError::DownloadFailed {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    info!(
        "Downloading {} ({} bytes)",
        url,
        response
            .content_length()
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".into())
    );

    let mut hasher = Sha256::new();
    let mut written = 0u64;

    // Scoped so the handle is closed before the caller touches the file
    {
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| LauncherError::io(dest, e))?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| LauncherError::io(dest, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| LauncherError::io(dest, e))?;
    }

    if let Some(expected) = sha256_expected {
        let actual = hex::encode(hasher.finalize());
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(LauncherError::Sha256Mismatch {
                path: dest.to_path_buf(),
                expected: expected.to_string(),
                actual,
            });
        }
    }

    debug!("Downloaded: {} -> {:?} ({} bytes)", url, dest, written);
    Ok(written)
}
