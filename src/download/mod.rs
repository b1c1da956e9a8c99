use anyhow::Context;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use std::io::Write;
use std::path::Path;

use crate::{ExtractorError, Result};

/// Fetches one remote file to a local path
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `url` to `destination`, leaving no file behind on failure
    async fn download(&self, url: &str, destination: &Path) -> Result<()>;
}

/// Plain HTTP(S) downloader
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    async fn stream_to_file(&self, response: reqwest::Response, destination: &Path) -> Result<u64> {
        let mut file = fs_err::File::create(destination)?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Failed to read response body")?;
            file.write_all(&chunk)?;
            written += chunk.len() as u64;
        }
        file.flush()?;

        Ok(written)
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, destination: &Path) -> Result<()> {
        tracing::debug!("Downloading {} to {}", url, destination.display());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request failed ({})", url))?;

        if response.status() != StatusCode::OK {
            return Err(ExtractorError::DownloadFailed {
                status: response.status().as_u16(),
                url: url.to_string(),
            }
            .into());
        }

        match self.stream_to_file(response, destination).await {
            Ok(bytes) => {
                tracing::debug!("Downloaded {} bytes from {}", bytes, url);
                Ok(())
            }
            Err(e) => {
                let _ = fs_err::remove_file(destination);
                Err(e.context(format!("Download interrupted ({})", url)))
            }
        }
    }
}
