//! Shared data models for the podclip backend.
//!
//! This crate provides Serde-serializable types for:
//! - Background jobs (types, statuses, payload maps)
//! - Clips (records, statuses, label methods)
//! - Label slug normalization
//! - API response shapes shared between handlers and tests

pub mod clip;
pub mod job;
pub mod label;
pub mod response;
pub mod timestamp;

// Re-export common types
pub use clip::{validate_clip_fields, ClipRecord, ClipStatus, LabelMethod, NewClip, ValidationError};
pub use job::{JobPayload, JobRecord, JobStatus, JobType, DEFAULT_MAX_ATTEMPTS};
pub use label::{label_slug, SlugError};
pub use response::{AnalysisResponse, ClipResponse, JobResponse};
pub use timestamp::format_utc_second;
