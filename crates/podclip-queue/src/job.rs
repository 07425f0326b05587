//! Typed job payloads.
//!
//! Payloads cross the store as opaque JSON maps; these types are the only
//! place that knows the field names, and each carries the unique key that
//! collapses duplicate concurrent enqueues.

use serde_json::json;
use uuid::Uuid;

use podclip_models::JobPayload;

use crate::error::{QueueError, QueueResult};

/// Extract one clip, addressed by its external UUID.
///
/// The payload carries only the UUID; the handler re-reads the clip row on
/// every attempt so retries see current state.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractClipJob {
    pub clip_uuid: Uuid,
}

impl ExtractClipJob {
    pub fn new(clip_uuid: Uuid) -> Self {
        Self { clip_uuid }
    }

    pub fn unique_key(&self) -> String {
        format!("clip_extraction:{}", self.clip_uuid)
    }

    pub fn payload(&self) -> JobPayload {
        let mut payload = JobPayload::new();
        payload.insert("clip_uuid".into(), json!(self.clip_uuid));
        payload
    }

    pub fn from_payload(payload: &JobPayload) -> QueueResult<Self> {
        let raw = payload
            .get("clip_uuid")
            .and_then(|v| v.as_str())
            .ok_or_else(|| QueueError::bad_payload("missing clip_uuid"))?;
        let clip_uuid = Uuid::parse_str(raw)
            .map_err(|e| QueueError::bad_payload(format!("bad clip_uuid {raw:?}: {e}")))?;
        Ok(Self { clip_uuid })
    }
}

/// Scan an episode for volume spikes.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeEpisodeJob {
    pub episode_id: i64,
    pub audio_url: String,
}

impl AnalyzeEpisodeJob {
    pub fn new(episode_id: i64, audio_url: impl Into<String>) -> Self {
        Self {
            episode_id,
            audio_url: audio_url.into(),
        }
    }

    pub fn unique_key(&self) -> String {
        format!("episode_analysis:{}", self.episode_id)
    }

    pub fn payload(&self) -> JobPayload {
        let mut payload = JobPayload::new();
        payload.insert("episode_id".into(), json!(self.episode_id));
        payload.insert("audio_url".into(), json!(self.audio_url));
        payload
    }

    pub fn from_payload(payload: &JobPayload) -> QueueResult<Self> {
        let episode_id = payload
            .get("episode_id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| QueueError::bad_payload("missing episode_id"))?;
        let audio_url = payload
            .get("audio_url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| QueueError::bad_payload("missing audio_url"))?
            .to_string();
        Ok(Self {
            episode_id,
            audio_url,
        })
    }
}

/// Precompute a waveform preview for an episode.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformJob {
    pub episode_id: i64,
    pub audio_url: String,
}

impl WaveformJob {
    pub fn new(episode_id: i64, audio_url: impl Into<String>) -> Self {
        Self {
            episode_id,
            audio_url: audio_url.into(),
        }
    }

    pub fn unique_key(&self) -> String {
        format!("waveform:{}", self.episode_id)
    }

    pub fn payload(&self) -> JobPayload {
        let mut payload = JobPayload::new();
        payload.insert("episode_id".into(), json!(self.episode_id));
        payload.insert("audio_url".into(), json!(self.audio_url));
        payload
    }

    pub fn from_payload(payload: &JobPayload) -> QueueResult<Self> {
        let inner = AnalyzeEpisodeJob::from_payload(payload)?;
        Ok(Self {
            episode_id: inner.episode_id,
            audio_url: inner.audio_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_job_round_trip() {
        let job = ExtractClipJob::new(Uuid::new_v4());
        let parsed = ExtractClipJob::from_payload(&job.payload()).unwrap();
        assert_eq!(job, parsed);
        assert_eq!(job.unique_key(), format!("clip_extraction:{}", job.clip_uuid));
    }

    #[test]
    fn test_analyze_job_round_trip() {
        let job = AnalyzeEpisodeJob::new(77, "https://cdn.example/ep.mp3");
        let parsed = AnalyzeEpisodeJob::from_payload(&job.payload()).unwrap();
        assert_eq!(job, parsed);
        assert_eq!(job.unique_key(), "episode_analysis:77");
    }

    #[test]
    fn test_bad_payloads_are_rejected() {
        let empty = JobPayload::new();
        assert!(ExtractClipJob::from_payload(&empty).is_err());
        assert!(AnalyzeEpisodeJob::from_payload(&empty).is_err());

        let mut bad_uuid = JobPayload::new();
        bad_uuid.insert("clip_uuid".into(), json!("not-a-uuid"));
        assert!(ExtractClipJob::from_payload(&bad_uuid).is_err());
    }
}
