//! Image downloader
//!
//! Saves every reference of a `LinkSet` under `<root>/<keyword>/` as
//! `<site>_<index>.<ext>`, where index is the reference's position in the set.
//! Remote bodies are streamed to disk, inline `data:` payloads are decoded.
//! Each saved file is checked against its magic bytes: non-images are deleted
//! and files whose real format differs from their extension are renamed.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use futures::stream::StreamExt;
use reqwest::{Client, Response, StatusCode};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::crawler::keywords::Keyword;
use crate::crawler::layout;
use crate::crawler::links::{ImageRef, LinkSet};
use crate::crawler::worker_pool::Cancellation;

/// Bytes read from a saved file to identify its format.
const SNIFF_LEN: u64 = 64;

/// Error types for the downloader
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected status: {0}")]
    Status(StatusCode),

    #[error("Invalid inline payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Not an image: {0}")]
    NotAnImage(String),
}

/// Result type for download operations
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Outcome of downloading one link set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub succeeded: usize,
    pub failed: usize,
    pub files: Vec<PathBuf>,
}

pub struct Downloader {
    client: Client,
    root: PathBuf,
}

impl Downloader {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration, user_agent: &str) -> DownloadResult<Self> {
        // bounds connecting and each read, not the whole transfer
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()?;
        Ok(Self { client, root: root.into() })
    }

    /// Downloads the link set in order.
    ///
    /// Stops early once `max_count` files succeeded (0 means no cap) or when
    /// cancelled. Per-reference errors are counted, never returned; only
    /// failing to create the keyword directory is an error.
    pub async fn download(
        &self,
        keyword: &Keyword,
        links: &LinkSet,
        site_name: &str,
        max_count: usize,
        cancel: &Cancellation,
    ) -> DownloadResult<DownloadReport> {
        let dir = layout::keyword_dir(&self.root, keyword);
        fs::create_dir_all(&dir).await?;

        let mut report = DownloadReport::default();
        for (index, image) in links.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Download of '{}' cancelled after {} files", keyword, report.succeeded);
                break;
            }
            if max_count > 0 && report.succeeded >= max_count {
                debug!("Reached limit of {} files for '{}'", max_count, keyword);
                break;
            }

            match self.save(&dir, site_name, index, image).await {
                Ok(path) => {
                    debug!("Saved {} -> {}", image, path.display());
                    report.succeeded += 1;
                    report.files.push(path);
                }
                Err(e) => {
                    warn!("Failed to download {}: {}", image, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Downloaded {} images for '{}' from {} ({} failed)",
            report.succeeded, keyword, site_name, report.failed
        );
        Ok(report)
    }

    async fn save(&self, dir: &Path, site_name: &str, index: usize, image: &ImageRef) -> DownloadResult<PathBuf> {
        let path = match image {
            ImageRef::Inline { format, .. } => {
                let payload = image.inline_payload().unwrap_or_default().trim();
                let data = BASE64.decode(payload)?;
                let path = layout::image_path(dir, site_name, index, format.extension());
                fs::write(&path, data).await?;
                path
            }
            ImageRef::Remote(url) => {
                let response = self.client.get(url).send().await?;
                if !response.status().is_success() {
                    return Err(DownloadError::Status(response.status()));
                }
                let path = layout::image_path(dir, site_name, index, infer_extension(url));
                if let Err(e) = stream_to_file(response, &path).await {
                    let _ = fs::remove_file(&path).await;
                    return Err(e);
                }
                path
            }
        };

        verify_format(path).await
    }
}

/// Stream a response to a file
async fn stream_to_file(response: Response, file_path: &Path) -> DownloadResult<()> {
    let mut file = File::create(file_path).await?;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }

    file.flush().await?;
    Ok(())
}

/// Deletes the file when it is not an image, renames it when its extension
/// does not match the sniffed format. Returns the final path.
async fn verify_format(path: PathBuf) -> DownloadResult<PathBuf> {
    let mut header = Vec::with_capacity(SNIFF_LEN as usize);
    File::open(&path).await?.take(SNIFF_LEN).read_to_end(&mut header).await?;

    let Some(actual) = sniff_extension(&header) else {
        fs::remove_file(&path).await?;
        return Err(DownloadError::NotAnImage(path.display().to_string()));
    };

    let current = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    if current == actual {
        return Ok(path);
    }

    let renamed = path.with_extension(actual);
    debug!("Renaming {} -> {}", path.display(), renamed.display());
    fs::rename(&path, &renamed).await?;
    Ok(renamed)
}

/// Extension for the format identified by the leading bytes, if any.
/// JPEG is reported as `jpg`.
pub fn sniff_extension(header: &[u8]) -> Option<&'static str> {
    image::guess_format(header)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
}

/// Guesses the file extension from a URL's last path segment.
///
/// Only jpg, jpeg, gif and png are recognised; everything else is saved as
/// `jpg` and corrected after sniffing.
pub fn infer_extension(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next().unwrap_or(path);
    let extension = segment
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "gif" => "gif",
        "png" => "png",
        _ => "jpg",
    }
}
