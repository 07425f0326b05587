//! Episode analysis: volume-spike detection into candidate clips.
//!
//! Progress layout: download 0-40, decode 40-60, detect 60-80, insert
//! 80-100.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use podclip_db::ClipRepository;
use podclip_media::{detect_spikes, rms_envelope, AudioFetcher, EnvelopeParams, TARGET_SAMPLE_RATE};
use podclip_models::NewClip;
use podclip_queue::ProgressReporter;

use crate::cache::AudioCache;
use crate::error::ClipResult;

/// Label every detection candidate is staged under.
pub const SPIKE_LABEL: &str = "volume_spike";

/// Result of one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub episode_id: i64,
    pub clip_uuids: Vec<Uuid>,
}

/// Volume-spike analyzer.
#[derive(Clone)]
pub struct Analyzer {
    clips: ClipRepository,
    fetcher: AudioFetcher,
    cache: AudioCache,
    params: EnvelopeParams,
}

impl Analyzer {
    pub fn new(
        clips: ClipRepository,
        fetcher: AudioFetcher,
        cache: AudioCache,
        params: EnvelopeParams,
    ) -> Self {
        Self {
            clips,
            fetcher,
            cache,
            params,
        }
    }

    /// Analyze one episode and stage detected clips.
    ///
    /// The interval set is deterministic for identical audio bytes and
    /// parameters; each run stages fresh rows (re-analysis intentionally
    /// does not dedup against earlier candidates).
    pub async fn analyze(
        &self,
        episode_id: i64,
        audio_url: &str,
        progress: &Arc<ProgressReporter>,
        cancel: watch::Receiver<bool>,
    ) -> ClipResult<AnalysisOutcome> {
        progress.report(0);

        // Download (or reuse) the episode audio: 0-40.
        let dl_progress = Arc::clone(progress);
        let audio_path = self
            .cache
            .fetch(&self.fetcher, audio_url, cancel.clone(), move |received, total| {
                if let Some(total) = total.filter(|t| *t > 0) {
                    dl_progress.report_phase(0, 40, received as f64 / total as f64);
                }
            })
            .await?;
        progress.report(40);

        // Decode to normalized PCM: 40-60.
        let samples = podclip_media::decode_pcm(
            &audio_path,
            None,
            self.cache.dir(),
            cancel.clone(),
        )
        .await?;
        let duration = samples.len() as f64 / TARGET_SAMPLE_RATE as f64;
        progress.report(60);

        // Detect loud regions: 60-80.
        let envelope = rms_envelope(&samples, self.params.window_s, self.params.hop_s);
        let spikes = detect_spikes(&envelope, &self.params);
        progress.report(80);

        // Stage candidates: 80-100.
        let candidates: Vec<NewClip> = spikes
            .iter()
            .map(|spike| {
                NewClip::detected(
                    episode_id,
                    audio_url,
                    spike.start,
                    spike.end.min(duration),
                    SPIKE_LABEL,
                    spike.confidence,
                )
            })
            .collect();
        let records = self.clips.insert_batch(&candidates)?;
        progress.report(100);

        info!(
            episode_id,
            spikes = records.len(),
            duration_s = format!("{duration:.1}"),
            "Episode analysis complete"
        );

        Ok(AnalysisOutcome {
            episode_id,
            clip_uuids: records.into_iter().map(|r| r.uuid).collect(),
        })
    }
}
