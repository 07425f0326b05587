//! Clip state machine and client-facing operations.

use tracing::{info, warn};
use uuid::Uuid;

use podclip_db::{ClipFilter, ClipRepository};
use podclip_models::{label_slug, validate_clip_fields, ClipRecord, NewClip};
use podclip_queue::{ExtractClipJob, JobQueue};
use podclip_storage::ClipStore;

use crate::error::{ClipError, ClipResult};

/// Clip lifecycle operations.
///
/// All transitions between clip statuses funnel through here; handlers and
/// HTTP surface share one set of rules.
#[derive(Clone)]
pub struct ClipService {
    clips: ClipRepository,
    store: ClipStore,
    queue: JobQueue,
}

impl ClipService {
    pub fn new(clips: ClipRepository, store: ClipStore, queue: JobQueue) -> Self {
        Self {
            clips,
            store,
            queue,
        }
    }

    pub fn repository(&self) -> &ClipRepository {
        &self.clips
    }

    pub fn store(&self) -> &ClipStore {
        &self.store
    }

    /// Create a manual clip: approved up front, queued, extraction enqueued.
    pub fn create_manual(
        &self,
        episode_id: i64,
        source_url: &str,
        start: f64,
        end: f64,
        label: &str,
    ) -> ClipResult<ClipRecord> {
        validate_clip_fields(start, end, label)?;
        label_slug(label)?;

        let clip = self
            .clips
            .insert(&NewClip::manual(episode_id, source_url, start, end, label))?;
        self.queue
            .enqueue_extraction(&ExtractClipJob::new(clip.uuid))?;

        info!(clip = %clip.uuid, episode_id, "Created manual clip");
        Ok(clip)
    }

    /// Stage detection candidates. No extraction jobs; approval is the gate.
    pub fn create_detected_batch(&self, candidates: &[NewClip]) -> ClipResult<Vec<ClipRecord>> {
        for candidate in candidates {
            candidate.validate()?;
            label_slug(&candidate.label)?;
        }
        let records = self.clips.insert_batch(candidates)?;
        info!(count = records.len(), "Staged detected clips");
        Ok(records)
    }

    /// Approve a detected clip and enqueue its extraction.
    pub fn approve(&self, uuid: &Uuid) -> ClipResult<ClipRecord> {
        let clip = self.clips.approve(uuid).map_err(map_db_err)?;
        self.queue
            .enqueue_extraction(&ExtractClipJob::new(clip.uuid))?;
        info!(clip = %clip.uuid, "Approved clip");
        Ok(clip)
    }

    /// Relabel a clip, moving its extracted file between label directories.
    ///
    /// The rename happens first; if the row update then fails the file is
    /// moved back, so disk and database never disagree about the label.
    pub async fn update_label(&self, uuid: &Uuid, new_label: &str) -> ClipResult<ClipRecord> {
        if new_label.trim().is_empty() {
            return Err(ClipError::Validation(
                podclip_models::ValidationError::EmptyLabel,
            ));
        }
        label_slug(new_label)?;

        let clip = self
            .clips
            .get_by_uuid(uuid)?
            .ok_or_else(|| ClipError::not_found(format!("clip {uuid}")))?;

        if clip.label == new_label {
            return Ok(clip);
        }

        let moved = if clip.extracted && clip.clip_filename.is_some() {
            self.store
                .move_between_labels(uuid, &clip.label, new_label)
                .await?;
            true
        } else {
            false
        };

        match self.clips.update_label(uuid, new_label) {
            Ok(updated) => {
                info!(clip = %uuid, from = %clip.label, to = %new_label, "Relabeled clip");
                Ok(updated)
            }
            Err(e) => {
                if moved {
                    if let Err(restore) = self
                        .store
                        .move_between_labels(uuid, new_label, &clip.label)
                        .await
                    {
                        warn!(clip = %uuid, "Failed to restore file after relabel rollback: {restore}");
                    }
                }
                Err(ClipError::Db(e))
            }
        }
    }

    /// Delete a clip. Both halves are idempotent: a missing file is fine,
    /// and a missing row still reports success.
    pub async fn delete(&self, uuid: &Uuid) -> ClipResult<()> {
        let Some(clip) = self.clips.get_by_uuid(uuid)? else {
            return Ok(());
        };

        if let Err(e) = self.store.delete(&clip.label, uuid).await {
            warn!(clip = %uuid, "Failed to remove clip file: {e}");
        }
        self.clips.delete(uuid)?;
        info!(clip = %uuid, "Deleted clip");
        Ok(())
    }

    pub fn get(&self, uuid: &Uuid) -> ClipResult<Option<ClipRecord>> {
        Ok(self.clips.get_by_uuid(uuid)?)
    }

    pub fn require(&self, uuid: &Uuid) -> ClipResult<ClipRecord> {
        self.get(uuid)?
            .ok_or_else(|| ClipError::not_found(format!("clip {uuid}")))
    }

    pub fn list(&self, filter: &ClipFilter) -> ClipResult<Vec<ClipRecord>> {
        Ok(self.clips.list(filter)?)
    }
}

fn map_db_err(e: podclip_db::DbError) -> ClipError {
    match e {
        podclip_db::DbError::NotFound(msg) => ClipError::NotFound(msg),
        podclip_db::DbError::InvalidState(msg) => ClipError::InvalidState(msg),
        other => ClipError::Db(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podclip_db::{Database, JobStore};
    use podclip_models::{ClipStatus, JobStatus, JobType, LabelMethod};
    use std::sync::Arc;

    struct Fixture {
        _guard: tempfile::TempDir,
        service: ClipService,
        jobs: JobStore,
    }

    fn fixture() -> Fixture {
        let guard = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let jobs = JobStore::new(Arc::clone(&db));
        let service = ClipService::new(
            ClipRepository::new(db),
            ClipStore::new(guard.path().join("clips"), guard.path().join("tmp")).unwrap(),
            JobQueue::new(jobs.clone()),
        );
        Fixture {
            _guard: guard,
            service,
            jobs,
        }
    }

    #[test]
    fn test_manual_create_queues_extraction() {
        let fx = fixture();
        let clip = fx
            .service
            .create_manual(12345, "https://cdn.example/ep.mp3", 30.0, 45.0, "ad")
            .unwrap();

        assert_eq!(clip.status, ClipStatus::Queued);
        assert!(clip.approved);
        assert_eq!(clip.label_method, LabelMethod::Manual);

        let job = fx.jobs.claim_next("w0").unwrap().unwrap();
        assert_eq!(job.job_type, JobType::ClipExtraction);
        assert_eq!(job.payload_str("clip_uuid"), Some(clip.uuid.to_string().as_str()));
    }

    #[test]
    fn test_invalid_range_creates_nothing() {
        let fx = fixture();
        let result = fx
            .service
            .create_manual(12345, "https://cdn.example/ep.mp3", 45.0, 30.0, "ad");
        assert!(matches!(result, Err(ClipError::Validation(_))));

        assert!(fx.service.list(&ClipFilter::default()).unwrap().is_empty());
        assert!(fx.jobs.claim_next("w0").unwrap().is_none());
    }

    #[test]
    fn test_detected_clips_stay_unqueued_until_approved() {
        let fx = fixture();
        let staged = fx
            .service
            .create_detected_batch(&[NewClip::detected(
                77,
                "https://cdn.example/ep.mp3",
                10.0,
                25.0,
                "volume_spike",
                0.8,
            )])
            .unwrap();
        let clip = &staged[0];
        assert_eq!(clip.status, ClipStatus::Detected);
        assert!(fx.jobs.claim_next("w0").unwrap().is_none());

        let approved = fx.service.approve(&clip.uuid).unwrap();
        assert_eq!(approved.status, ClipStatus::Queued);
        let job = fx.jobs.claim_next("w0").unwrap().unwrap();
        assert_eq!(job.job_type, JobType::ClipExtraction);
    }

    #[test]
    fn test_approve_unknown_clip_is_not_found() {
        let fx = fixture();
        assert!(matches!(
            fx.service.approve(&Uuid::new_v4()),
            Err(ClipError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_relabel_before_extraction_touches_only_the_row() {
        let fx = fixture();
        let clip = fx
            .service
            .create_manual(1, "https://cdn.example/ep.mp3", 0.0, 10.0, "ad")
            .unwrap();

        let updated = fx.service.update_label(&clip.uuid, "music").await.unwrap();
        assert_eq!(updated.label, "music");
        assert_eq!(updated.uuid, clip.uuid);
    }

    #[tokio::test]
    async fn test_relabel_moves_extracted_file() {
        let fx = fixture();
        let clip = fx
            .service
            .create_manual(1, "https://cdn.example/ep.mp3", 0.0, 10.0, "ad")
            .unwrap();

        // Simulate a finished extraction.
        let src = fx.service.store().temp_dir().join("done.wav");
        tokio::fs::write(&src, b"RIFF").await.unwrap();
        let (_, filename) = fx.service.store().adopt(&src, "ad", &clip.uuid).await.unwrap();
        fx.service
            .repository()
            .mark_ready(&clip.uuid, &filename, 15.0, 4)
            .unwrap();

        let updated = fx.service.update_label(&clip.uuid, "music").await.unwrap();
        assert_eq!(updated.label, "music");

        let old_path = fx.service.store().clip_path("ad", &clip.uuid).unwrap();
        let new_path = fx.service.store().clip_path("music", &clip.uuid).unwrap();
        assert!(!old_path.exists());
        assert!(new_path.exists());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_for_rows_and_files() {
        let fx = fixture();
        let clip = fx
            .service
            .create_manual(1, "https://cdn.example/ep.mp3", 0.0, 10.0, "ad")
            .unwrap();

        fx.service.delete(&clip.uuid).await.unwrap();
        // Second delete: row is gone, still succeeds.
        fx.service.delete(&clip.uuid).await.unwrap();
        assert!(fx.service.get(&clip.uuid).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_extraction_jobs_collapse() {
        let fx = fixture();
        let clip = fx
            .service
            .create_manual(1, "https://cdn.example/ep.mp3", 0.0, 10.0, "ad")
            .unwrap();

        // A second enqueue for the same clip (e.g. a re-approve race)
        // lands on the existing pending job.
        let job = fx
            .jobs
            .get_for(
                JobType::ClipExtraction,
                "clip_uuid",
                &serde_json::json!(clip.uuid.to_string()),
            )
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Pending);
    }
}
