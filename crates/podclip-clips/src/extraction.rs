//! The clip-extraction job body.
//!
//! Progress layout: download 0-50, transcode 50-95, store 95-100.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use podclip_db::ClipRepository;
use podclip_media::{extract_wav, AudioFetcher, ExtractRequest};
use podclip_models::ClipStatus;
use podclip_queue::ProgressReporter;
use podclip_storage::ClipStore;

use crate::error::ClipResult;

/// Executes queued extractions end to end.
#[derive(Clone)]
pub struct ExtractionPipeline {
    clips: ClipRepository,
    store: ClipStore,
    fetcher: AudioFetcher,
    target_duration: f64,
}

impl ExtractionPipeline {
    pub fn new(
        clips: ClipRepository,
        store: ClipStore,
        fetcher: AudioFetcher,
        target_duration: f64,
    ) -> Self {
        Self {
            clips,
            store,
            fetcher,
            target_duration,
        }
    }

    /// Run one extraction attempt for `clip_uuid`.
    ///
    /// Idempotent: anything not currently `queued` is a no-op success, so a
    /// duplicate or replayed job cannot double-extract. The one exception is
    /// a retry attempt finding the clip `processing`: the unique job key
    /// guarantees no other live attempt exists, so that state can only be
    /// the residue of a timed-out or crashed attempt and is reclaimed. On
    /// failure the clip row carries the classified message and the error
    /// propagates for the worker's retry accounting.
    pub async fn run(
        &self,
        clip_uuid: &Uuid,
        progress: &Arc<ProgressReporter>,
        cancel: watch::Receiver<bool>,
        is_retry: bool,
    ) -> ClipResult<()> {
        let Some(mut clip) = self.clips.get_by_uuid(clip_uuid)? else {
            // The clip was deleted while its job sat in the queue.
            info!(clip = %clip_uuid, "Clip vanished before extraction; nothing to do");
            return Ok(());
        };

        if clip.status == ClipStatus::Processing
            && is_retry
            && self
                .clips
                .transition(clip_uuid, ClipStatus::Processing, ClipStatus::Queued)?
        {
            info!(clip = %clip_uuid, "Reclaimed clip from a dead attempt");
            clip.status = ClipStatus::Queued;
        }

        if clip.status != ClipStatus::Queued {
            info!(clip = %clip_uuid, status = %clip.status, "Clip not queued; skipping");
            return Ok(());
        }
        if !self
            .clips
            .transition(clip_uuid, ClipStatus::Queued, ClipStatus::Processing)?
        {
            // Another worker won the transition.
            return Ok(());
        }
        progress.report(0);

        match self.extract(&clip, progress, cancel).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.clips.mark_failed(clip_uuid, &e.failure_message())?;
                // Leave the row failed; a retry re-queues it explicitly.
                Err(e)
            }
        }
    }

    async fn extract(
        &self,
        clip: &podclip_models::ClipRecord,
        progress: &Arc<ProgressReporter>,
        cancel: watch::Receiver<bool>,
    ) -> ClipResult<()> {
        self.store.check_free_space()?;

        // Download phase: 0-50.
        let download_path = self
            .store
            .temp_dir()
            .join(format!("source_{}.audio", clip.uuid));
        let dl_progress = Arc::clone(progress);
        self.fetcher
            .download_to(
                &clip.source_episode_url,
                &download_path,
                cancel.clone(),
                move |received, total| {
                    if let Some(total) = total.filter(|t| *t > 0) {
                        dl_progress.report_phase(0, 50, received as f64 / total as f64);
                    }
                },
            )
            .await?;
        progress.report(50);

        // Transcode phase: 50-95.
        let request = ExtractRequest {
            source: download_path.clone(),
            start: clip.original_start_time,
            end: clip.original_end_time,
            target_duration: self.target_duration,
        };
        let extracted = extract_wav(&request, self.store.temp_dir(), cancel).await;
        if let Err(e) = tokio::fs::remove_file(&download_path).await {
            warn!("Failed to remove downloaded source {}: {e}", download_path.display());
        }
        let extracted = extracted?;
        progress.report(95);

        // Store phase: 95-100.
        let (_, filename) = self
            .store
            .adopt(&extracted.path, &clip.label, &clip.uuid)
            .await?;
        self.clips.mark_ready(
            &clip.uuid,
            &filename,
            extracted.duration,
            extracted.size_bytes,
        )?;
        progress.report(100);

        info!(clip = %clip.uuid, file = %filename, "Extraction complete");
        Ok(())
    }

    /// Re-queue a failed clip for another attempt.
    pub fn requeue(&self, clip_uuid: &Uuid) -> ClipResult<bool> {
        Ok(self
            .clips
            .transition(clip_uuid, ClipStatus::Failed, ClipStatus::Queued)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podclip_db::{Database, JobStore};
    use podclip_models::{JobPayload, JobType, NewClip};
    use podclip_media::FetchConfig;
    use std::sync::Arc as StdArc;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        _guard: tempfile::TempDir,
        clips: ClipRepository,
        pipeline: ExtractionPipeline,
        jobs: JobStore,
    }

    fn fixture() -> Fixture {
        let guard = tempfile::tempdir().unwrap();
        let db = StdArc::new(Database::open_in_memory().unwrap());
        let clips = ClipRepository::new(StdArc::clone(&db));
        let jobs = JobStore::new(db);
        let store =
            ClipStore::new(guard.path().join("clips"), guard.path().join("tmp")).unwrap();
        let fetcher = AudioFetcher::new(FetchConfig {
            allow_private_hosts: vec!["127.0.0.1".into()],
            ..Default::default()
        })
        .unwrap();
        let pipeline = ExtractionPipeline::new(clips.clone(), store, fetcher, 15.0);
        Fixture {
            _guard: guard,
            clips,
            pipeline,
            jobs,
        }
    }

    fn reporter(jobs: &JobStore) -> Arc<ProgressReporter> {
        let job = jobs
            .enqueue(JobType::ClipExtraction, &JobPayload::new())
            .unwrap();
        jobs.claim_next("w0").unwrap();
        Arc::new(ProgressReporter::new(jobs.clone(), job.id))
    }

    fn idle_cancel() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        std::mem::forget(tx);
        rx
    }

    #[tokio::test]
    async fn test_non_queued_clip_is_noop() {
        let fx = fixture();
        let clip = fx
            .clips
            .insert(&NewClip::detected(
                7,
                "https://cdn.example/ep.mp3",
                0.0,
                10.0,
                "volume_spike",
                0.5,
            ))
            .unwrap();

        let progress = reporter(&fx.jobs);
        fx.pipeline
            .run(&clip.uuid, &progress, idle_cancel(), false)
            .await
            .unwrap();

        // Still detected, untouched.
        let after = fx.clips.get_by_uuid(&clip.uuid).unwrap().unwrap();
        assert_eq!(after.status, ClipStatus::Detected);
    }

    #[tokio::test]
    async fn test_vanished_clip_is_noop() {
        let fx = fixture();
        let progress = reporter(&fx.jobs);
        fx.pipeline
            .run(&Uuid::new_v4(), &progress, idle_cancel(), false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_download_failure_marks_clip_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fx = fixture();
        let clip = fx
            .clips
            .insert(&NewClip::manual(
                7,
                format!("{}/ep.mp3", server.uri()),
                0.0,
                10.0,
                "ad",
            ))
            .unwrap();

        let progress = reporter(&fx.jobs);
        let result = fx.pipeline.run(&clip.uuid, &progress, idle_cancel(), false).await;
        assert!(result.is_err());

        let after = fx.clips.get_by_uuid(&clip.uuid).unwrap().unwrap();
        assert_eq!(after.status, ClipStatus::Failed);
        let message = after.error_message.unwrap();
        assert!(
            message.starts_with("download:http_503"),
            "unexpected message: {message}"
        );
    }

    #[tokio::test]
    async fn test_retry_reclaims_clip_stuck_in_processing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fx = fixture();
        let clip = fx
            .clips
            .insert(&NewClip::manual(
                7,
                format!("{}/ep.mp3", server.uri()),
                0.0,
                10.0,
                "ad",
            ))
            .unwrap();
        // A timed-out attempt died mid-flight.
        fx.clips
            .transition(&clip.uuid, ClipStatus::Queued, ClipStatus::Processing)
            .unwrap();

        // A first attempt must not touch it.
        let progress = reporter(&fx.jobs);
        fx.pipeline
            .run(&clip.uuid, &progress, idle_cancel(), false)
            .await
            .unwrap();
        assert_eq!(
            fx.clips.get_by_uuid(&clip.uuid).unwrap().unwrap().status,
            ClipStatus::Processing
        );

        // A retry reclaims it and actually attempts the extraction.
        let progress = reporter(&fx.jobs);
        let result = fx.pipeline.run(&clip.uuid, &progress, idle_cancel(), true).await;
        assert!(result.is_err());
        assert_eq!(
            fx.clips.get_by_uuid(&clip.uuid).unwrap().unwrap().status,
            ClipStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_requeue_flips_failed_back_to_queued() {
        let fx = fixture();
        let clip = fx
            .clips
            .insert(&NewClip::manual(7, "https://cdn.example/e.mp3", 0.0, 10.0, "ad"))
            .unwrap();
        fx.clips
            .transition(&clip.uuid, ClipStatus::Queued, ClipStatus::Processing)
            .unwrap();
        fx.clips.mark_failed(&clip.uuid, "download:http_503: x").unwrap();

        assert!(fx.pipeline.requeue(&clip.uuid).unwrap());
        let after = fx.clips.get_by_uuid(&clip.uuid).unwrap().unwrap();
        assert_eq!(after.status, ClipStatus::Queued);

        // Requeue of a non-failed clip is a no-op.
        assert!(!fx.pipeline.requeue(&clip.uuid).unwrap());
    }
}
