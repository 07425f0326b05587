//! Audio acquisition and processing for the podclip backend.
//!
//! This crate provides:
//! - SSRF-guarded URL validation (`ssrf`)
//! - A range-preserving HTTP fetcher for proxying and downloads (`fetch`)
//! - FFmpeg child-process plumbing (`command`)
//! - PCM decode, crop/pad and WAV output for clip extraction (`pcm`, `extract`)
//! - Short-time RMS envelopes and volume-spike detection (`envelope`)

pub mod command;
pub mod envelope;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod pcm;
pub mod ssrf;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use envelope::{detect_spikes, rms_envelope, waveform_summary, EnvelopeParams, SpikeInterval};
pub use error::{FailureKind, MediaError, MediaResult};
pub use extract::{extract_wav, ExtractRequest, ExtractedWav};
pub use fetch::{AudioFetcher, FetchConfig, Upstream, RELAY_HEADERS};
pub use pcm::{decode_pcm, TARGET_CHANNELS, TARGET_SAMPLE_RATE};
pub use ssrf::validate_url;
