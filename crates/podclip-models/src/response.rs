//! API response shapes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clip::ClipRecord;
use crate::job::JobRecord;
use crate::timestamp::format_utc_second;

/// Wire representation of a clip.
///
/// Internal row ids never appear here; the UUID is the only identity a
/// client sees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipResponse {
    pub uuid: Uuid,
    pub label: String,
    pub status: String,
    pub approved: bool,
    pub extracted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
    pub original_start_time: f64,
    pub original_end_time: f64,
    pub auto_labeled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_confidence: Option<f64>,
    pub label_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&ClipRecord> for ClipResponse {
    fn from(clip: &ClipRecord) -> Self {
        Self {
            uuid: clip.uuid,
            label: clip.label.clone(),
            status: clip.status.as_str().to_string(),
            approved: clip.approved,
            extracted: clip.extracted,
            filename: clip.clip_filename.clone(),
            duration: clip.clip_duration,
            size_bytes: clip.clip_size_bytes,
            original_start_time: clip.original_start_time,
            original_end_time: clip.original_end_time,
            auto_labeled: clip.auto_labeled,
            label_confidence: clip.label_confidence,
            label_method: clip.label_method.as_str().to_string(),
            error_message: clip.error_message.clone(),
            created_at: format_utc_second(&clip.created_at),
            updated_at: format_utc_second(&clip.updated_at),
        }
    }
}

/// Response for a kicked-off episode analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub job_id: i64,
    pub episode_id: i64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clips_created: Option<u64>,
}

/// Wire representation of a job, used by polling clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    pub id: i64,
    #[serde(rename = "type")]
    pub job_type: String,
    pub status: String,
    pub progress: u8,
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl From<&JobRecord> for JobResponse {
    fn from(job: &JobRecord) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type.as_str().to_string(),
            status: job.status.as_str().to_string(),
            progress: job.progress,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            error: job.error.clone(),
            created_at: format_utc_second(&job.created_at),
            updated_at: format_utc_second(&job.updated_at),
            started_at: job.started_at.as_ref().map(format_utc_second),
            completed_at: job.completed_at.as_ref().map(format_utc_second),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{ClipStatus, LabelMethod};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_clip_response_shape() {
        let created = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let clip = ClipRecord {
            id: 42,
            uuid: Uuid::new_v4(),
            podcast_index_episode_id: 12345,
            source_episode_url: "https://cdn.example/ep.mp3".into(),
            original_start_time: 30.0,
            original_end_time: 45.0,
            label: "ad".into(),
            status: ClipStatus::Queued,
            approved: true,
            extracted: false,
            clip_filename: None,
            clip_duration: None,
            clip_size_bytes: None,
            auto_labeled: false,
            label_confidence: None,
            label_method: LabelMethod::Manual,
            error_message: None,
            created_at: created,
            updated_at: created,
        };

        let resp = ClipResponse::from(&clip);
        assert_eq!(resp.status, "queued");
        assert_eq!(resp.label_method, "manual");
        assert_eq!(resp.created_at, "2025-03-01T08:00:00Z");

        // Internal row id must not leak into the serialized form.
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("id").is_none());
        assert!(json.get("uuid").is_some());
    }
}
