//! Typed job enqueueing and worker-side dispatch plumbing.
//!
//! This crate provides:
//! - Typed job payloads with unique keys (`job`)
//! - A `JobQueue` facade over the durable store (`queue`)
//! - Rate-limited, monotonic progress reporting (`progress`)
//! - The per-type handler registry (`registry`)

pub mod error;
pub mod job;
pub mod progress;
pub mod queue;
pub mod registry;

pub use error::{QueueError, QueueResult};
pub use job::{AnalyzeEpisodeJob, ExtractClipJob, WaveformJob};
pub use progress::ProgressReporter;
pub use queue::JobQueue;
pub use registry::{HandlerEntry, HandlerError, HandlerRegistry, HandlerResult, JobContext, JobHandler};
