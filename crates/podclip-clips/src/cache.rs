//! URL-keyed download cache.
//!
//! Analysis and waveform jobs over the same episode reuse the downloaded
//! bytes instead of refetching. Eviction is LRU by modification time,
//! bounded by a byte budget.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use podclip_media::AudioFetcher;

use crate::error::ClipResult;

/// Default cache budget: 2 GiB.
const DEFAULT_MAX_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Cache of downloaded episode audio, keyed by URL hash.
#[derive(Debug, Clone)]
pub struct AudioCache {
    dir: PathBuf,
    max_bytes: u64,
}

impl AudioCache {
    pub fn new(dir: impl Into<PathBuf>) -> ClipResult<Self> {
        let cache = Self {
            dir: dir.into(),
            max_bytes: DEFAULT_MAX_BYTES,
        };
        std::fs::create_dir_all(&cache.dir).map_err(podclip_media::MediaError::Io)?;
        Ok(cache)
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache path for a URL.
    pub fn path_for(&self, url: &str) -> PathBuf {
        let digest = Sha256::digest(url.as_bytes());
        let mut key = String::with_capacity(32);
        for byte in &digest[..16] {
            key.push_str(&format!("{byte:02x}"));
        }
        self.dir.join(format!("{key}.audio"))
    }

    /// Fetch a URL through the cache.
    ///
    /// A prior download is reused (its mtime refreshed for the LRU); a miss
    /// downloads into a `.part` sibling and renames, so a crash never leaves
    /// a half-file under a valid cache key.
    pub async fn fetch(
        &self,
        fetcher: &AudioFetcher,
        url: &str,
        cancel: watch::Receiver<bool>,
        progress: impl FnMut(u64, Option<u64>),
    ) -> ClipResult<PathBuf> {
        let path = self.path_for(url);

        if path.exists() {
            debug!("Audio cache hit for {url}");
            touch(&path).await;
            return Ok(path);
        }

        let part = path.with_extension("part");
        fetcher.download_to(url, &part, cancel, progress).await?;
        tokio::fs::rename(&part, &path)
            .await
            .map_err(podclip_media::MediaError::Io)?;

        self.evict().await;
        Ok(path)
    }

    /// Drop oldest entries until the cache fits its byte budget.
    pub async fn evict(&self) {
        let mut entries: Vec<(PathBuf, std::time::SystemTime, u64)> = Vec::new();
        let Ok(read_dir) = std::fs::read_dir(&self.dir) else {
            return;
        };
        for entry in read_dir.flatten() {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "audio") {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                let mtime = meta.modified().unwrap_or(std::time::UNIX_EPOCH);
                entries.push((path, mtime, meta.len()));
            }
        }

        let mut total: u64 = entries.iter().map(|(_, _, len)| len).sum();
        if total <= self.max_bytes {
            return;
        }

        // Oldest first.
        entries.sort_by_key(|(_, mtime, _)| *mtime);
        for (path, _, len) in entries {
            if total <= self.max_bytes {
                break;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    total = total.saturating_sub(len);
                    info!("Evicted cached audio {}", path.display());
                }
                Err(e) => warn!("Failed to evict {}: {}", path.display(), e),
            }
        }
    }
}

async fn touch(path: &Path) {
    // Refresh mtime so the LRU sees the hit; failure only skews eviction.
    let now = std::time::SystemTime::now();
    if let Ok(file) = std::fs::File::options().append(true).open(path) {
        let _ = file.set_modified(now);
    }
}
