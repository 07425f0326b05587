//! Enqueue facade over the durable store.

use tracing::info;

use podclip_db::JobStore;
use podclip_models::{JobRecord, JobType};

use crate::error::QueueResult;
use crate::job::{AnalyzeEpisodeJob, ExtractClipJob, WaveformJob};

/// Typed enqueue operations.
///
/// Every enqueue goes through a unique key, so hammering the same endpoint
/// concurrently yields one job.
#[derive(Debug, Clone)]
pub struct JobQueue {
    store: JobStore,
}

impl JobQueue {
    pub fn new(store: JobStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Enqueue a clip extraction, collapsing duplicates per clip.
    pub fn enqueue_extraction(&self, job: &ExtractClipJob) -> QueueResult<JobRecord> {
        let record = self.store.enqueue_unique(
            JobType::ClipExtraction,
            &job.payload(),
            &job.unique_key(),
        )?;
        info!(job_id = record.id, clip = %job.clip_uuid, "Queued clip extraction");
        Ok(record)
    }

    /// Enqueue an episode analysis, collapsing duplicates per episode.
    pub fn enqueue_analysis(&self, job: &AnalyzeEpisodeJob) -> QueueResult<JobRecord> {
        let record = self.store.enqueue_unique(
            JobType::EpisodeAnalysis,
            &job.payload(),
            &job.unique_key(),
        )?;
        info!(
            job_id = record.id,
            episode_id = job.episode_id,
            "Queued episode analysis"
        );
        Ok(record)
    }

    /// Enqueue waveform generation, collapsing duplicates per episode.
    pub fn enqueue_waveform(&self, job: &WaveformJob) -> QueueResult<JobRecord> {
        let record = self.store.enqueue_unique(
            JobType::WaveformGeneration,
            &job.payload(),
            &job.unique_key(),
        )?;
        info!(
            job_id = record.id,
            episode_id = job.episode_id,
            "Queued waveform generation"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podclip_db::Database;
    use podclip_models::JobStatus;
    use std::sync::Arc;
    use uuid::Uuid;

    fn queue() -> JobQueue {
        let db = Arc::new(Database::open_in_memory().unwrap());
        JobQueue::new(JobStore::new(db))
    }

    #[test]
    fn test_duplicate_analysis_is_collapsed() {
        let queue = queue();
        let job = AnalyzeEpisodeJob::new(77, "https://cdn.example/ep.mp3");

        let a = queue.enqueue_analysis(&job).unwrap();
        let b = queue.enqueue_analysis(&job).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.status, JobStatus::Pending);
    }

    #[test]
    fn test_different_clips_get_different_jobs() {
        let queue = queue();
        let a = queue
            .enqueue_extraction(&ExtractClipJob::new(Uuid::new_v4()))
            .unwrap();
        let b = queue
            .enqueue_extraction(&ExtractClipJob::new(Uuid::new_v4()))
            .unwrap();
        assert_ne!(a.id, b.id);
    }
}
