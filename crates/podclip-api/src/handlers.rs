//! Request handlers.

pub mod analysis;
pub mod clips;
pub mod export;
pub mod health;
pub mod jobs;
pub mod stream;
pub mod waveform;
