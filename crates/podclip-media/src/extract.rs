//! Clip extraction: decode, crop/pad, WAV output.
//!
//! Every extracted clip is exactly `target_duration` seconds of 16 kHz mono
//! 16-bit PCM. Shorter segments are right-padded with silence; longer ones
//! are center-cropped. The WAV is written to a `.tmp` sibling and renamed
//! so the clip store only ever sees complete files.

use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::error::{MediaError, MediaResult};
use crate::pcm::{self, TARGET_CHANNELS, TARGET_SAMPLE_RATE};

/// Default output length in seconds.
pub const DEFAULT_TARGET_DURATION: f64 = 15.0;

/// An extraction request against an already-downloaded source file.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    /// Downloaded episode audio
    pub source: PathBuf,
    /// Segment start within the episode, seconds
    pub start: f64,
    /// Segment end within the episode, seconds
    pub end: f64,
    /// Output length, seconds
    pub target_duration: f64,
}

/// A finished clip sitting in the temp directory.
#[derive(Debug, Clone)]
pub struct ExtractedWav {
    pub path: PathBuf,
    pub duration: f64,
    pub size_bytes: i64,
}

/// Extract a normalized WAV clip into `temp_dir`.
pub async fn extract_wav(
    request: &ExtractRequest,
    temp_dir: &Path,
    cancel: watch::Receiver<bool>,
) -> MediaResult<ExtractedWav> {
    if request.start < 0.0 || !request.start.is_finite() || !request.end.is_finite() {
        return Err(MediaError::InvalidInterval(format!(
            "start={} end={}",
            request.start, request.end
        )));
    }
    if request.end <= request.start {
        return Err(MediaError::InvalidInterval(
            "end_time must be greater than start_time".into(),
        ));
    }
    if request.target_duration <= 0.0 {
        return Err(MediaError::InvalidInterval(format!(
            "target_duration={}",
            request.target_duration
        )));
    }

    let segment = request.end - request.start;

    // Longer segments only need the centered target window decoded;
    // shorter ones are decoded whole and padded afterwards.
    let (decode_start, decode_duration) = if segment > request.target_duration {
        (
            request.start + (segment - request.target_duration) / 2.0,
            request.target_duration,
        )
    } else {
        (request.start, segment)
    };

    let samples = pcm::decode_pcm(
        &request.source,
        Some((decode_start, decode_duration)),
        temp_dir,
        cancel,
    )
    .await?;

    let target_samples = pcm::samples_for(request.target_duration);
    let normalized = crop_or_pad(samples, target_samples);

    let filename = format!("clip_{}.wav", Uuid::new_v4());
    let final_path = temp_dir.join(&filename);
    let tmp_path = temp_dir.join(format!("{filename}.tmp"));

    write_wav_sync(&tmp_path, &normalized)?;
    tokio::fs::rename(&tmp_path, &final_path).await?;

    let size_bytes = tokio::fs::metadata(&final_path).await?.len() as i64;
    debug!(
        "Extracted {} ({} samples, {} bytes)",
        final_path.display(),
        normalized.len(),
        size_bytes
    );

    Ok(ExtractedWav {
        path: final_path,
        duration: request.target_duration,
        size_bytes,
    })
}

/// Center-crop or right-pad `samples` to exactly `target` samples.
fn crop_or_pad(mut samples: Vec<i16>, target: usize) -> Vec<i16> {
    use std::cmp::Ordering;

    match samples.len().cmp(&target) {
        Ordering::Equal => samples,
        Ordering::Greater => {
            let excess = samples.len() - target;
            let lead = excess / 2;
            samples.drain(..lead);
            samples.truncate(target);
            samples
        }
        Ordering::Less => {
            samples.resize(target, 0);
            samples
        }
    }
}

/// Write samples as a 16 kHz mono 16-bit WAV, fsynced before return.
fn write_wav_sync(path: &Path, samples: &[i16]) -> MediaResult<()> {
    let spec = hound::WavSpec {
        channels: TARGET_CHANNELS as u16,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let file = std::fs::File::create(path)?;
    let mut writer = hound::WavWriter::new(std::io::BufWriter::new(file), spec)?;
    let mut writer16 = writer.get_i16_writer(samples.len() as u32);
    for &sample in samples {
        writer16.write_sample(sample);
    }
    writer16.flush()?;
    writer.finalize()?;

    // finalize consumed the writer; reopen to fsync the finished file.
    let file = std::fs::File::open(path)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_or_pad_pads_right() {
        let padded = crop_or_pad(vec![5; 10], 16);
        assert_eq!(padded.len(), 16);
        assert_eq!(&padded[..10], &[5; 10]);
        assert_eq!(&padded[10..], &[0; 6]);
    }

    #[test]
    fn test_crop_or_pad_center_crops() {
        let samples: Vec<i16> = (0..100).collect();
        let cropped = crop_or_pad(samples, 50);
        assert_eq!(cropped.len(), 50);
        // 25 samples removed from each side.
        assert_eq!(cropped[0], 25);
        assert_eq!(cropped[49], 74);
    }

    #[test]
    fn test_crop_or_pad_noop_at_target() {
        let samples = vec![1i16; 240_000];
        assert_eq!(crop_or_pad(samples.clone(), 240_000), samples);
    }

    #[test]
    fn test_wav_output_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let samples = vec![123i16; pcm::samples_for(15.0)];
        write_wav_sync(&path, &samples).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        // 240_000 samples at 16 kHz is exactly 15 s.
        assert_eq!(reader.len(), 240_000);
    }

    #[tokio::test]
    async fn test_invalid_interval_is_rejected_before_decoding() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = watch::channel(false);
        let request = ExtractRequest {
            source: dir.path().join("missing.mp3"),
            start: 45.0,
            end: 30.0,
            target_duration: 15.0,
        };
        let result = extract_wav(&request, dir.path(), rx).await;
        assert!(matches!(result, Err(MediaError::InvalidInterval(_))));
    }
}
