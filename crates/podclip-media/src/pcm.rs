//! PCM decoding via FFmpeg.

use std::path::Path;

use tokio::sync::watch;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Normalized sample rate for every decoded buffer and extracted clip.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Normalized channel count.
pub const TARGET_CHANNELS: u8 = 1;

/// Decode (part of) an audio file to 16 kHz mono s16 samples.
///
/// `window` selects `(start_seconds, duration_seconds)` within the source;
/// `None` decodes the whole file. The raw PCM lands in a scratch file next
/// to nothing else and is removed before returning.
pub async fn decode_pcm(
    input: &Path,
    window: Option<(f64, f64)>,
    scratch_dir: &Path,
    cancel: watch::Receiver<bool>,
) -> MediaResult<Vec<i16>> {
    if !input.exists() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }

    static DECODE_SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    let seq = DECODE_SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    let raw_path = scratch_dir.join(format!("decode_{}_{seq}.s16le", std::process::id()));

    let mut cmd = FfmpegCommand::new(input, &raw_path);
    if let Some((start, duration)) = window {
        cmd = cmd.seek(start).duration(duration);
    }
    let cmd = cmd
        .no_video()
        .audio_codec("pcm_s16le")
        .sample_rate(TARGET_SAMPLE_RATE)
        .channels(TARGET_CHANNELS)
        .format("s16le");

    let result = FfmpegRunner::new().with_cancel(cancel).run(&cmd).await;
    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&raw_path).await;
        return Err(e);
    }

    let bytes = tokio::fs::read(&raw_path).await?;
    let _ = tokio::fs::remove_file(&raw_path).await;

    let mut samples = Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks_exact(2) {
        samples.push(i16::from_le_bytes([pair[0], pair[1]]));
    }
    Ok(samples)
}

/// Number of samples in `seconds` at the normalized rate.
pub fn samples_for(seconds: f64) -> usize {
    (seconds * TARGET_SAMPLE_RATE as f64).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_for() {
        assert_eq!(samples_for(1.0), 16_000);
        assert_eq!(samples_for(15.0), 240_000);
        assert_eq!(samples_for(0.5), 8_000);
    }

    #[tokio::test]
    async fn test_decode_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = watch::channel(false);
        let result = decode_pcm(
            &dir.path().join("absent.mp3"),
            None,
            dir.path(),
            rx,
        )
        .await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
