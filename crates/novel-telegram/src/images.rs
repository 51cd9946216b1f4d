//! Story image download with an on-disk cache.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use novel_persistence::atomic::atomic_write;

use crate::error::{Result, TelegramError};

/// Direct download endpoint for storage ids.
const DOWNLOAD_URL: &str = "https://drive.google.com/uc?export=download&id=";

/// Storage answers browsers more reliably than bare clients.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// File extension of cached images.
const CACHE_EXTENSION: &str = "webp";

/// Fetches story images by storage id, caching the bytes on disk.
pub struct ImageCache {
    dir: PathBuf,
    client: reqwest::Client,
    download_url: String,
}

impl ImageCache {
    /// Create a cache rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(DOWNLOAD_TIMEOUT)
            .build()?;
        Ok(Self {
            dir: dir.into(),
            client,
            download_url: DOWNLOAD_URL.to_string(),
        })
    }

    /// Override the download endpoint. The storage id is appended to it.
    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = url.into();
        self
    }

    /// Cache root.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Image bytes for `image_id`, from disk when cached.
    pub async fn fetch(&self, image_id: &str) -> Result<Vec<u8>> {
        let path = self.cache_path(image_id)?;

        if let Some(bytes) = self.read_cached(&path).await {
            debug!(image_id, "Image cache hit");
            return Ok(bytes);
        }

        let bytes = self.download(image_id).await?;
        if let Err(e) = self.store(&path, &bytes).await {
            warn!(image_id, error = %e, "Failed to cache image");
        }
        Ok(bytes)
    }

    /// Cache file for an id. Ids are restricted to storage id characters.
    pub fn cache_path(&self, image_id: &str) -> Result<PathBuf> {
        let id = sanitize_id(image_id)
            .ok_or_else(|| TelegramError::InvalidImageId(image_id.to_string()))?;
        let shard: String = id.chars().take(2).collect();
        Ok(self.dir.join(shard).join(format!("{}.{}", id, CACHE_EXTENSION)))
    }

    async fn read_cached(&self, path: &Path) -> Option<Vec<u8>> {
        match tokio::fs::read(path).await {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read cached image");
                None
            }
        }
    }

    async fn download(&self, image_id: &str) -> Result<Vec<u8>> {
        let url = format!("{}{}", self.download_url, image_id);
        info!(image_id, "Downloading image");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TelegramError::ImageDownload {
                image_id: image_id.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(TelegramError::ImageDownload {
                image_id: image_id.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(bytes.to_vec())
    }

    async fn store(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let path = path.to_path_buf();
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || atomic_write(&path, &bytes))
            .await
            .map_err(|e| TelegramError::Io(std::io::Error::other(e)))??;
        Ok(())
    }
}

/// Returns the id if it only holds storage id characters.
fn sanitize_id(image_id: &str) -> Option<&str> {
    let id = image_id.trim();
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(id)
}
