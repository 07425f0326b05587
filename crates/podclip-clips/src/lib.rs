//! Clip lifecycle and the pipelines that feed it.
//!
//! This crate provides:
//! - `ClipService`: create/approve/relabel/delete/list with the state
//!   machine rules enforced
//! - `ExtractionPipeline`: the clip-extraction job body
//! - `Analyzer`: volume-spike detection over an episode
//! - `WaveformGenerator`: cached waveform previews
//! - `AudioCache`: URL-keyed download cache shared by the above

pub mod analysis;
pub mod cache;
pub mod error;
pub mod extraction;
pub mod service;
pub mod waveform;

pub use analysis::{AnalysisOutcome, Analyzer};
pub use cache::AudioCache;
pub use error::{ClipError, ClipResult};
pub use podclip_media::FailureKind;
pub use extraction::ExtractionPipeline;
pub use service::ClipService;
pub use waveform::WaveformGenerator;
