//! Short-time RMS envelopes and volume-spike detection.
//!
//! The analyzer is deterministic: identical samples and parameters always
//! produce the identical interval set.

use serde::Serialize;

use crate::pcm::TARGET_SAMPLE_RATE;

/// Envelope and detection parameters.
#[derive(Debug, Clone)]
pub struct EnvelopeParams {
    /// RMS window length, seconds
    pub window_s: f64,
    /// Hop between windows, seconds
    pub hop_s: f64,
    /// Threshold multiplier: spike when RMS > mean + k * std
    pub k: f64,
    /// Minimum spike width, seconds
    pub min_width_s: f64,
    /// Adjacent regions closer than this are merged, seconds
    pub merge_gap_s: f64,
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self {
            window_s: 1.0,
            hop_s: 0.5,
            k: 2.5,
            min_width_s: 3.0,
            merge_gap_s: 1.0,
        }
    }
}

/// A detected loud region.
#[derive(Debug, Clone, PartialEq)]
pub struct SpikeInterval {
    /// Start within the episode, seconds
    pub start: f64,
    /// End within the episode, seconds
    pub end: f64,
    /// Normalized detection confidence in [0, 1]
    pub confidence: f64,
}

/// Short-time RMS envelope of a mono 16 kHz buffer.
///
/// One value per hop; each value is the RMS of the `window_s`-long window
/// starting at that hop (shorter at the tail).
pub fn rms_envelope(samples: &[i16], window_s: f64, hop_s: f64) -> Vec<f64> {
    let window = ((window_s * TARGET_SAMPLE_RATE as f64).round() as usize).max(1);
    let hop = ((hop_s * TARGET_SAMPLE_RATE as f64).round() as usize).max(1);

    if samples.is_empty() {
        return Vec::new();
    }

    let mut envelope = Vec::with_capacity(samples.len() / hop + 1);
    let mut offset = 0;
    while offset < samples.len() {
        let end = (offset + window).min(samples.len());
        let slice = &samples[offset..end];
        let sum_sq: f64 = slice
            .iter()
            .map(|&s| {
                let v = s as f64 / i16::MAX as f64;
                v * v
            })
            .sum();
        envelope.push((sum_sq / slice.len() as f64).sqrt());
        offset += hop;
    }
    envelope
}

/// Find contiguous regions where the envelope exceeds `mean + k * std`.
pub fn detect_spikes(envelope: &[f64], params: &EnvelopeParams) -> Vec<SpikeInterval> {
    if envelope.is_empty() {
        return Vec::new();
    }

    let n = envelope.len() as f64;
    let mean = envelope.iter().sum::<f64>() / n;
    let variance = envelope.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let std = variance.sqrt();
    let threshold = mean + params.k * std;

    if std <= f64::EPSILON {
        // Flat signal; nothing sticks out.
        return Vec::new();
    }

    // Raw runs of above-threshold hops, in envelope index space.
    let mut runs: Vec<(usize, usize)> = Vec::new();
    let mut run_start: Option<usize> = None;
    for (i, &v) in envelope.iter().enumerate() {
        if v > threshold {
            run_start.get_or_insert(i);
        } else if let Some(start) = run_start.take() {
            runs.push((start, i - 1));
        }
    }
    if let Some(start) = run_start {
        runs.push((start, envelope.len() - 1));
    }

    // Convert to seconds, merge near-adjacent regions, enforce width.
    let mut merged: Vec<(f64, f64, f64)> = Vec::new(); // (start, end, peak)
    for (first, last) in runs {
        let start = first as f64 * params.hop_s;
        let end = last as f64 * params.hop_s + params.window_s;
        let peak = envelope[first..=last]
            .iter()
            .cloned()
            .fold(f64::MIN, f64::max);

        match merged.last_mut() {
            Some((_, prev_end, prev_peak)) if start - *prev_end <= params.merge_gap_s => {
                *prev_end = end;
                *prev_peak = prev_peak.max(peak);
            }
            _ => merged.push((start, end, peak)),
        }
    }

    merged
        .into_iter()
        .filter(|(start, end, _)| end - start >= params.min_width_s)
        .map(|(start, end, peak)| SpikeInterval {
            start,
            end,
            confidence: ((peak - mean) / (params.k * std)).clamp(0.0, 1.0),
        })
        .collect()
}

/// Fixed-bin peak summary used for waveform previews.
#[derive(Debug, Clone, Serialize)]
pub struct WaveformSummary {
    /// Number of bins
    pub bins: usize,
    /// Source duration, seconds
    pub duration: f64,
    /// Peak absolute amplitude per bin, normalized to [0, 1]
    pub peaks: Vec<f32>,
}

/// Summarize a mono buffer into `bins` peak values.
pub fn waveform_summary(samples: &[i16], bins: usize) -> WaveformSummary {
    let bins = bins.max(1);
    let duration = samples.len() as f64 / TARGET_SAMPLE_RATE as f64;

    if samples.is_empty() {
        return WaveformSummary {
            bins,
            duration,
            peaks: vec![0.0; bins],
        };
    }

    let per_bin = samples.len().div_ceil(bins);
    let mut peaks = Vec::with_capacity(bins);
    for chunk in samples.chunks(per_bin) {
        let peak = chunk.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
        peaks.push(peak as f32 / i16::MAX as f32);
    }
    peaks.resize(bins, 0.0);

    WaveformSummary {
        bins,
        duration,
        peaks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Mono buffer with quiet background and loud bursts at given second ranges.
    fn synth(duration_s: f64, bursts: &[(f64, f64)]) -> Vec<i16> {
        let rate = TARGET_SAMPLE_RATE as f64;
        let len = (duration_s * rate) as usize;
        let mut samples = vec![0i16; len];

        // Low-level noise floor so the std is non-zero.
        for (i, s) in samples.iter_mut().enumerate() {
            *s = if i % 2 == 0 { 120 } else { -120 };
        }
        for &(start, end) in bursts {
            let a = (start * rate) as usize;
            let b = ((end * rate) as usize).min(len);
            for (i, s) in samples[a..b].iter_mut().enumerate() {
                *s = if i % 2 == 0 { 24_000 } else { -24_000 };
            }
        }
        samples
    }

    #[test]
    fn test_detects_two_bursts() {
        let samples = synth(120.0, &[(20.0, 26.0), (70.0, 75.0)]);
        let params = EnvelopeParams::default();
        let envelope = rms_envelope(&samples, params.window_s, params.hop_s);
        let spikes = detect_spikes(&envelope, &params);

        assert_eq!(spikes.len(), 2, "spikes: {spikes:?}");
        assert!((spikes[0].start - 20.0).abs() <= 1.5);
        assert!((spikes[0].end - 26.0).abs() <= 1.5);
        assert!((spikes[1].start - 70.0).abs() <= 1.5);
        assert!(spikes.iter().all(|s| s.confidence > 0.0 && s.confidence <= 1.0));
    }

    #[test]
    fn test_narrow_bursts_are_dropped() {
        let samples = synth(120.0, &[(20.0, 21.0)]);
        let params = EnvelopeParams::default();
        let envelope = rms_envelope(&samples, params.window_s, params.hop_s);
        let spikes = detect_spikes(&envelope, &params);
        assert!(spikes.is_empty(), "spikes: {spikes:?}");
    }

    #[test]
    fn test_nearby_bursts_merge() {
        let samples = synth(120.0, &[(20.0, 23.0), (23.5, 26.0)]);
        let params = EnvelopeParams::default();
        let envelope = rms_envelope(&samples, params.window_s, params.hop_s);
        let spikes = detect_spikes(&envelope, &params);
        assert_eq!(spikes.len(), 1, "spikes: {spikes:?}");
    }

    #[test]
    fn test_flat_signal_has_no_spikes() {
        let samples = vec![100i16; 16_000 * 30];
        let params = EnvelopeParams::default();
        let envelope = rms_envelope(&samples, params.window_s, params.hop_s);
        assert!(detect_spikes(&envelope, &params).is_empty());
    }

    #[test]
    fn test_detection_is_deterministic() {
        let samples = synth(60.0, &[(10.0, 15.0)]);
        let params = EnvelopeParams::default();
        let run = || {
            let envelope = rms_envelope(&samples, params.window_s, params.hop_s);
            detect_spikes(&envelope, &params)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_waveform_summary_bins() {
        let samples = synth(10.0, &[(2.0, 3.0)]);
        let summary = waveform_summary(&samples, 1000);
        assert_eq!(summary.peaks.len(), 1000);
        assert!((summary.duration - 10.0).abs() < 0.01);
        // The burst bin peaks well above the noise floor.
        let max = summary.peaks.iter().cloned().fold(0.0f32, f32::max);
        assert!(max > 0.5);
    }
}
