//! Job definitions for queue processing.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of attempts a job gets before it is parked for good.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Opaque key/value payload carried by a job, JSON-encoded in the store.
///
/// A BTreeMap keeps the serialized form stable, which makes payload-based
/// lookups (`get_for`) predictable.
pub type JobPayload = BTreeMap<String, serde_json::Value>;

/// Type of background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Precompute a waveform envelope for an episode
    WaveformGeneration,
    /// Produce a transcript for an episode (handled by an external engine)
    TranscriptionGeneration,
    /// Scan an episode for volume spikes and stage candidate clips
    EpisodeAnalysis,
    /// Download, transcode and persist a single clip
    ClipExtraction,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::WaveformGeneration => "waveform_generation",
            JobType::TranscriptionGeneration => "transcription_generation",
            JobType::EpisodeAnalysis => "episode_analysis",
            JobType::ClipExtraction => "clip_extraction",
        }
    }

    /// Parse the wire/database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waveform_generation" => Some(JobType::WaveformGeneration),
            "transcription_generation" => Some(JobType::TranscriptionGeneration),
            "episode_analysis" => Some(JobType::EpisodeAnalysis),
            "clip_extraction" => Some(JobType::ClipExtraction),
            _ => None,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job state in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting in queue
    #[default]
    Pending,
    /// Job is being processed by a worker
    Processing,
    /// Job completed successfully
    Completed,
    /// Job failed and may be retried
    Failed,
    /// Job exhausted its attempts (or failed unretryably)
    PermanentlyFailed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::PermanentlyFailed => "permanently_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "permanently_failed" => Some(JobStatus::PermanentlyFailed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::PermanentlyFailed)
    }

    /// Statuses that hold a unique key (at most one such row per key).
    pub fn holds_unique_key(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable background job row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Monotonic integer id assigned by the store
    pub id: i64,

    /// Job type
    pub job_type: JobType,

    /// Current status
    pub status: JobStatus,

    /// Progress (0-100); 100 only when completed
    pub progress: u8,

    /// Opaque payload
    pub payload: JobPayload,

    /// Optional key collapsing duplicate concurrent enqueues
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_key: Option<String>,

    /// Attempts consumed so far
    pub attempts: u32,

    /// Attempts allowed in total
    pub max_attempts: u32,

    /// Error text from the most recent failed attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Earliest time the job may be claimed (retry backoff)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_after: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Check if another attempt is allowed after a retryable failure.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Fetch a string payload field.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }

    /// Fetch an integer payload field.
    pub fn payload_i64(&self, key: &str) -> Option<i64> {
        self.payload.get(key).and_then(|v| v.as_i64())
    }
}
