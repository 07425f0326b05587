//! Waveform preview generation.
//!
//! Produces a fixed-bin peak summary JSON for an episode, cached next to
//! the audio cache so repeated requests are free.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use podclip_media::{waveform_summary, AudioFetcher};
use podclip_queue::ProgressReporter;
use podclip_storage::ClipStore;

use crate::cache::AudioCache;
use crate::error::ClipResult;

/// Bins per waveform preview.
const WAVEFORM_BINS: usize = 1000;

/// Generates and caches waveform previews.
#[derive(Clone)]
pub struct WaveformGenerator {
    fetcher: AudioFetcher,
    cache: AudioCache,
    store: ClipStore,
}

impl WaveformGenerator {
    pub fn new(fetcher: AudioFetcher, cache: AudioCache, store: ClipStore) -> Self {
        Self {
            fetcher,
            cache,
            store,
        }
    }

    /// Cache location for an episode's waveform JSON.
    pub fn waveform_path(&self, episode_id: i64) -> PathBuf {
        self.cache
            .dir()
            .join("waveforms")
            .join(format!("episode_{episode_id}.json"))
    }

    /// Generate the waveform summary for an episode.
    ///
    /// Idempotent: an existing cache file short-circuits the whole job.
    pub async fn generate(
        &self,
        episode_id: i64,
        audio_url: &str,
        progress: &Arc<ProgressReporter>,
        cancel: watch::Receiver<bool>,
    ) -> ClipResult<PathBuf> {
        let dest = self.waveform_path(episode_id);
        if dest.exists() {
            info!(episode_id, "Waveform already cached");
            progress.report(100);
            return Ok(dest);
        }

        let dl_progress = Arc::clone(progress);
        let audio_path = self
            .cache
            .fetch(&self.fetcher, audio_url, cancel.clone(), move |received, total| {
                if let Some(total) = total.filter(|t| *t > 0) {
                    dl_progress.report_phase(0, 50, received as f64 / total as f64);
                }
            })
            .await?;
        progress.report(50);

        let samples =
            podclip_media::decode_pcm(&audio_path, None, self.cache.dir(), cancel).await?;
        progress.report(80);

        let summary = waveform_summary(&samples, WAVEFORM_BINS);
        let json = serde_json::to_vec(&summary)
            .map_err(podclip_media::MediaError::JsonParse)?;
        self.store.atomic_write(&dest, &json).await?;
        progress.report(100);

        info!(episode_id, "Waveform generated");
        Ok(dest)
    }
}
