//! Streaming dataset export.
//!
//! The archive is spooled to the temp root (never the clip tree, so it can
//! never swallow itself) and handed to the response as a byte stream; the
//! spool file is unlinked as soon as it is open, so nothing lingers after
//! the client disconnects. Memory use stays flat regardless of dataset
//! size.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures_util::stream::Stream;
use serde_json::json;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

use podclip_models::label_slug;

use crate::error::{StorageError, StorageResult};

/// One clip to be placed in the archive.
#[derive(Debug, Clone)]
pub struct ExportEntry {
    pub uuid: Uuid,
    pub label: String,
    /// Absolute path of the extracted WAV
    pub path: PathBuf,
    pub duration: Option<f64>,
    pub original_start_time: f64,
    pub original_end_time: f64,
    pub source_episode_url: String,
    pub podcast_index_episode_id: i64,
}

impl ExportEntry {
    /// Archive entry name: `<label-slug>/clip_<uuid>.wav`.
    fn archive_name(&self) -> StorageResult<String> {
        Ok(format!("{}/clip_{}.wav", label_slug(&self.label)?, self.uuid))
    }

    /// One JSONL manifest record.
    fn manifest_record(&self) -> serde_json::Value {
        json!({
            "uuid": self.uuid,
            "label": self.label,
            "duration": self.duration,
            "original_start_time": self.original_start_time,
            "original_end_time": self.original_end_time,
            "source_episode_url": self.source_episode_url,
            "podcast_index_episode_id": self.podcast_index_episode_id,
        })
    }
}

/// Build the dataset archive and return it as a byte stream.
///
/// Entries whose file has vanished since listing are skipped with a warning
/// rather than aborting the whole export.
pub async fn stream_dataset_zip(
    entries: Vec<ExportEntry>,
    spool_dir: &Path,
) -> StorageResult<impl Stream<Item = std::io::Result<Bytes>> + Send + 'static> {
    let spool_path = spool_dir.join(format!("export_{}.zip", Uuid::new_v4()));

    let build_path = spool_path.clone();
    tokio::task::spawn_blocking(move || write_archive(&build_path, &entries))
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;

    let file = tokio::fs::File::open(&spool_path).await?;

    // Unlink immediately; the open descriptor keeps the bytes alive until
    // the stream is dropped. On platforms where that fails the temp-dir
    // sweeper picks the file up later.
    if let Err(e) = tokio::fs::remove_file(&spool_path).await {
        warn!("Could not unlink export spool {}: {}", spool_path.display(), e);
    }

    Ok(ReaderStream::with_capacity(file, 64 * 1024))
}

fn write_archive(path: &Path, entries: &[ExportEntry]) -> StorageResult<()> {
    let file = std::fs::File::create(path)?;
    let mut zip = zip::ZipWriter::new(std::io::BufWriter::new(file));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .large_file(true);

    let mut manifest = String::new();
    let mut copy_buf = vec![0u8; 64 * 1024];
    let mut written = 0usize;

    for entry in entries {
        let name = match entry.archive_name() {
            Ok(name) => name,
            Err(e) => {
                warn!("Skipping clip {} with bad label: {e}", entry.uuid);
                continue;
            }
        };

        let mut clip_file = match std::fs::File::open(&entry.path) {
            Ok(file) => file,
            Err(e) => {
                warn!(
                    "Skipping clip {}: cannot open {}: {e}",
                    entry.uuid,
                    entry.path.display()
                );
                continue;
            }
        };

        zip.start_file(name, options)?;
        loop {
            let n = clip_file.read(&mut copy_buf)?;
            if n == 0 {
                break;
            }
            zip.write_all(&copy_buf[..n])?;
        }
        written += 1;

        manifest.push_str(&entry.manifest_record().to_string());
        manifest.push('\n');
    }

    zip.start_file("manifest.jsonl", options)?;
    zip.write_all(manifest.as_bytes())?;
    zip.finish()?;

    debug!("Dataset export spooled ({written} of {} entries)", entries.len());
    Ok(())
}
