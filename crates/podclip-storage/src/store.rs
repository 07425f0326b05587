//! Label-keyed clip storage.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use podclip_models::label_slug;

use crate::error::{StorageError, StorageResult};

/// Minimum free space required in the temp dir before an extraction starts.
const DEFAULT_MIN_FREE_BYTES: u64 = 256 * 1024 * 1024;

/// Filesystem layout and operations for extracted clips.
#[derive(Debug, Clone)]
pub struct ClipStore {
    root: PathBuf,
    temp_dir: PathBuf,
    min_free_bytes: u64,
}

impl ClipStore {
    /// Create the store, making both roots if needed.
    pub fn new(root: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let store = Self {
            root: root.into(),
            temp_dir: temp_dir.into(),
            min_free_bytes: DEFAULT_MIN_FREE_BYTES,
        };
        std::fs::create_dir_all(&store.root)?;
        std::fs::create_dir_all(&store.temp_dir)?;
        Ok(store)
    }

    pub fn with_min_free_bytes(mut self, bytes: u64) -> Self {
        self.min_free_bytes = bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Canonical filename for a clip.
    pub fn clip_filename(uuid: &Uuid) -> String {
        format!("clip_{uuid}.wav")
    }

    /// Full path for a clip under its label directory.
    pub fn clip_path(&self, label: &str, uuid: &Uuid) -> StorageResult<PathBuf> {
        let slug = label_slug(label)?;
        Ok(self.root.join(slug).join(Self::clip_filename(uuid)))
    }

    /// Verify the temp filesystem has headroom for another extraction.
    pub fn check_free_space(&self) -> StorageResult<()> {
        let available = fs2::available_space(&self.temp_dir)?;
        if available < self.min_free_bytes {
            return Err(StorageError::DiskFull {
                path: self.temp_dir.clone(),
                available,
            });
        }
        Ok(())
    }

    /// Move a finished WAV from the temp dir into its label directory.
    ///
    /// Returns the final path and filename. The source must already be a
    /// complete file; this is rename-only on the happy path, with a
    /// copy+rename fallback when roots sit on different filesystems.
    pub async fn adopt(
        &self,
        src: &Path,
        label: &str,
        uuid: &Uuid,
    ) -> StorageResult<(PathBuf, String)> {
        if !src.exists() {
            return Err(StorageError::FileNotFound(src.to_path_buf()));
        }

        let dest = self.clip_path(label, uuid)?;
        let parent = dest.parent().expect("clip path always has a parent");
        create_label_dir(parent).await?;
        move_file(src, &dest).await?;

        debug!("Stored clip at {}", dest.display());
        Ok((dest.clone(), Self::clip_filename(uuid)))
    }

    /// Move an extracted clip between label directories.
    ///
    /// Same-filesystem rename, so it is atomic; the caller pairs it with the
    /// row update and calls it again in reverse if that update fails.
    pub async fn move_between_labels(
        &self,
        uuid: &Uuid,
        from_label: &str,
        to_label: &str,
    ) -> StorageResult<(PathBuf, PathBuf)> {
        let from = self.clip_path(from_label, uuid)?;
        let to = self.clip_path(to_label, uuid)?;

        if !from.exists() {
            return Err(StorageError::FileNotFound(from));
        }

        let parent = to.parent().expect("clip path always has a parent");
        create_label_dir(parent).await?;
        fs::rename(&from, &to).await?;

        debug!("Relabeled clip: {} -> {}", from.display(), to.display());
        Ok((from, to))
    }

    /// Remove a clip file. Missing files are not an error.
    pub async fn delete(&self, label: &str, uuid: &Uuid) -> StorageResult<()> {
        let path = self.clip_path(label, uuid)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted clip file {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Write bytes atomically: temp sibling, fsync, rename.
    pub async fn atomic_write(&self, dest: &Path, bytes: &[u8]) -> StorageResult<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = dest.with_extension("tmp");

        let dest = dest.to_path_buf();
        let tmp_clone = tmp.clone();
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || -> StorageResult<()> {
            use std::io::Write;
            let mut file = std::fs::File::create(&tmp_clone)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            std::fs::rename(&tmp_clone, &dest)?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;
        Ok(())
    }
}

/// Create a label directory with conventional permissions.
async fn create_label_dir(path: &Path) -> StorageResult<()> {
    fs::create_dir_all(path).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o755);
        fs::set_permissions(path, perms).await?;
    }
    Ok(())
}

/// Rename with copy+rename fallback for cross-device moves.
async fn move_file(src: &Path, dst: &Path) -> StorageResult<()> {
    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            debug!(
                "Cross-device rename, falling back to copy+rename: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(StorageError::Io(e)),
    }
}

/// EXDEV is error code 18 on Linux/macOS.
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> StorageResult<()> {
    // Copy lands next to dst so the final rename stays on one filesystem.
    let tmp_dst = dst.with_extension("tmp");
    fs::copy(src, &tmp_dst).await?;
    if let Err(e) = fs::rename(&tmp_dst, dst).await {
        let _ = std::fs::remove_file(&tmp_dst);
        return Err(StorageError::Io(e));
    }
    if let Err(e) = fs::remove_file(src).await {
        warn!("Failed to remove source after move: {}: {}", src.display(), e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, ClipStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ClipStore::new(dir.path().join("clips"), dir.path().join("tmp")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_clip_path_uses_label_slug() {
        let (_guard, store) = store().await;
        let uuid = Uuid::new_v4();
        let path = store.clip_path("Volume Spike", &uuid).unwrap();
        assert!(path.ends_with(format!("volume_spike/clip_{uuid}.wav")));

        assert!(store.clip_path("!!!", &uuid).is_err());
    }

    #[tokio::test]
    async fn test_adopt_moves_into_label_dir() {
        let (guard, store) = store().await;
        let uuid = Uuid::new_v4();
        let src = guard.path().join("tmp").join("work.wav");
        fs::write(&src, b"RIFFdata").await.unwrap();

        let (dest, filename) = store.adopt(&src, "ad", &uuid).await.unwrap();
        assert!(!src.exists());
        assert!(dest.exists());
        assert_eq!(filename, format!("clip_{uuid}.wav"));
        assert_eq!(fs::read(&dest).await.unwrap(), b"RIFFdata");
    }

    #[tokio::test]
    async fn test_relabel_round_trip_preserves_bytes() {
        let (guard, store) = store().await;
        let uuid = Uuid::new_v4();
        let src = guard.path().join("tmp").join("work.wav");
        fs::write(&src, b"payload").await.unwrap();
        store.adopt(&src, "ad", &uuid).await.unwrap();

        store.move_between_labels(&uuid, "ad", "music").await.unwrap();
        let music_path = store.clip_path("music", &uuid).unwrap();
        let ad_path = store.clip_path("ad", &uuid).unwrap();
        assert!(music_path.exists());
        assert!(!ad_path.exists());

        store.move_between_labels(&uuid, "music", "ad").await.unwrap();
        assert!(ad_path.exists());
        assert!(!music_path.exists());
        assert_eq!(fs::read(&ad_path).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_move_between_labels_missing_file() {
        let (_guard, store) = store().await;
        let result = store
            .move_between_labels(&Uuid::new_v4(), "ad", "music")
            .await;
        assert!(matches!(result, Err(StorageError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (guard, store) = store().await;
        let uuid = Uuid::new_v4();
        let src = guard.path().join("tmp").join("work.wav");
        fs::write(&src, b"x").await.unwrap();
        store.adopt(&src, "ad", &uuid).await.unwrap();

        store.delete("ad", &uuid).await.unwrap();
        // Second delete of a missing file succeeds quietly.
        store.delete("ad", &uuid).await.unwrap();
    }

    #[tokio::test]
    async fn test_atomic_write_replaces_content() {
        let (guard, store) = store().await;
        let dest = guard.path().join("cache").join("waveform.json");

        store.atomic_write(&dest, b"{\"v\":1}").await.unwrap();
        store.atomic_write(&dest, b"{\"v\":2}").await.unwrap();
        assert_eq!(fs::read(&dest).await.unwrap(), b"{\"v\":2}");
        assert!(!dest.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_check_free_space_threshold() {
        let (_guard, store) = store().await;
        // Zero threshold always passes; an absurd one always fails.
        assert!(store.clone().with_min_free_bytes(0).check_free_space().is_ok());
        assert!(matches!(
            store.with_min_free_bytes(u64::MAX).check_free_space(),
            Err(StorageError::DiskFull { .. })
        ));
    }
}
