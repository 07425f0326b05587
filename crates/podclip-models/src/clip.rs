//! Clip records and lifecycle states.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Validation failures for client-supplied clip fields.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("end_time must be greater than start_time")]
    InvalidRange,

    #[error("start_time must not be negative")]
    NegativeStart,

    #[error("label must not be empty")]
    EmptyLabel,
}

/// Status of a clip in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClipStatus {
    /// Auto-detected candidate awaiting review
    #[default]
    Detected,
    /// Approved and waiting for extraction
    Queued,
    /// Extraction in flight
    Processing,
    /// Extracted audio is on disk
    Ready,
    /// Extraction failed
    Failed,
}

impl ClipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipStatus::Detected => "detected",
            ClipStatus::Queued => "queued",
            ClipStatus::Processing => "processing",
            ClipStatus::Ready => "ready",
            ClipStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "detected" => Some(ClipStatus::Detected),
            "queued" => Some(ClipStatus::Queued),
            "processing" => Some(ClipStatus::Processing),
            "ready" => Some(ClipStatus::Ready),
            "failed" => Some(ClipStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ClipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a clip got its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LabelMethod {
    /// A human typed it
    #[default]
    Manual,
    /// Volume-spike detection assigned it
    PeakDetection,
}

impl LabelMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelMethod::Manual => "manual",
            LabelMethod::PeakDetection => "peak_detection",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(LabelMethod::Manual),
            "peak_detection" => Some(LabelMethod::PeakDetection),
            _ => None,
        }
    }
}

/// A labeled audio segment destined for a training dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipRecord {
    /// Internal row id; never exposed across the API boundary
    pub id: i64,

    /// External identity, stable across updates
    pub uuid: Uuid,

    /// Episode this clip was cut from (external directory id)
    pub podcast_index_episode_id: i64,

    /// Audio URL the segment is extracted from
    pub source_episode_url: String,

    /// Segment start within the episode, seconds
    pub original_start_time: f64,

    /// Segment end within the episode, seconds
    pub original_end_time: f64,

    /// Free-form class tag; becomes a directory after slug normalization
    pub label: String,

    pub status: ClipStatus,

    /// Whether a human (or the create call) approved the clip for extraction
    pub approved: bool,

    /// Whether extracted audio exists on disk
    pub extracted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_filename: Option<String>,

    /// Duration of the extracted file, seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_duration: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_size_bytes: Option<i64>,

    /// True when detection produced the label
    pub auto_labeled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_confidence: Option<f64>,

    pub label_method: LabelMethod,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClipRecord {
    /// Duration of the source segment, seconds.
    pub fn segment_duration(&self) -> f64 {
        self.original_end_time - self.original_start_time
    }
}

/// Fields for inserting a clip row.
#[derive(Debug, Clone)]
pub struct NewClip {
    pub podcast_index_episode_id: i64,
    pub source_episode_url: String,
    pub original_start_time: f64,
    pub original_end_time: f64,
    pub label: String,
    pub status: ClipStatus,
    pub approved: bool,
    pub auto_labeled: bool,
    pub label_confidence: Option<f64>,
    pub label_method: LabelMethod,
}

impl NewClip {
    /// A manually-created clip: approved up front and queued for extraction.
    pub fn manual(
        episode_id: i64,
        source_url: impl Into<String>,
        start: f64,
        end: f64,
        label: impl Into<String>,
    ) -> Self {
        Self {
            podcast_index_episode_id: episode_id,
            source_episode_url: source_url.into(),
            original_start_time: start,
            original_end_time: end,
            label: label.into(),
            status: ClipStatus::Queued,
            approved: true,
            auto_labeled: false,
            label_confidence: None,
            label_method: LabelMethod::Manual,
        }
    }

    /// A detection candidate: parked until a human approves it.
    pub fn detected(
        episode_id: i64,
        source_url: impl Into<String>,
        start: f64,
        end: f64,
        label: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            podcast_index_episode_id: episode_id,
            source_episode_url: source_url.into(),
            original_start_time: start,
            original_end_time: end,
            label: label.into(),
            status: ClipStatus::Detected,
            approved: false,
            auto_labeled: true,
            label_confidence: Some(confidence),
            label_method: LabelMethod::PeakDetection,
        }
    }

    /// Validate the invariants every insert must satisfy.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_clip_fields(self.original_start_time, self.original_end_time, &self.label)
    }
}

/// Validate a clip's time range and label.
pub fn validate_clip_fields(start: f64, end: f64, label: &str) -> Result<(), ValidationError> {
    if start < 0.0 || !start.is_finite() {
        return Err(ValidationError::NegativeStart);
    }
    if !end.is_finite() || end <= start {
        return Err(ValidationError::InvalidRange);
    }
    if label.trim().is_empty() {
        return Err(ValidationError::EmptyLabel);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_inverted_range() {
        assert_eq!(
            validate_clip_fields(45.0, 30.0, "ad"),
            Err(ValidationError::InvalidRange)
        );
        assert_eq!(
            validate_clip_fields(30.0, 30.0, "ad"),
            Err(ValidationError::InvalidRange)
        );
    }

    #[test]
    fn test_validate_rejects_negative_start() {
        assert_eq!(
            validate_clip_fields(-1.0, 30.0, "ad"),
            Err(ValidationError::NegativeStart)
        );
    }

    #[test]
    fn test_validate_rejects_blank_label() {
        assert_eq!(
            validate_clip_fields(0.0, 15.0, "  "),
            Err(ValidationError::EmptyLabel)
        );
    }

    #[test]
    fn test_manual_clip_defaults() {
        let clip = NewClip::manual(12345, "https://cdn.example/ep.mp3", 30.0, 45.0, "ad");
        assert!(clip.validate().is_ok());
        assert!(clip.approved);
        assert_eq!(clip.status, ClipStatus::Queued);
        assert_eq!(clip.label_method, LabelMethod::Manual);
        assert!(!clip.auto_labeled);
    }

    #[test]
    fn test_detected_clip_defaults() {
        let clip = NewClip::detected(77, "https://cdn.example/ep.mp3", 10.0, 25.0, "volume_spike", 0.8);
        assert!(!clip.approved);
        assert_eq!(clip.status, ClipStatus::Detected);
        assert_eq!(clip.label_method, LabelMethod::PeakDetection);
        assert!(clip.auto_labeled);
        assert_eq!(clip.label_confidence, Some(0.8));
    }
}
