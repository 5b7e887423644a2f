//! Sample-rate conversion used when loading assets
//!
//! Rate changes go through rubato's band-limited FFT resampler, so content
//! above the output Nyquist is filtered out instead of folding back.
//! Non-integer ratios use rubato's windowed-sinc interpolator.

use rubato::{
    FftFixedIn, Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

use crate::error::{Result, SynthesisError};
use crate::io::sample_buffer::SampleBuffer;

/// Input frames per resampler call
const CHUNK: usize = 1024;
/// FFT sub-chunks per input chunk
const SUB_CHUNKS: usize = 2;

fn rubato_err(e: impl std::fmt::Display) -> SynthesisError {
    SynthesisError::Resample(e.to_string())
}

/// Resample a buffer to `target_rate`
///
/// Output length is `ceil(len * target_rate / source_rate)`. The resampler
/// delay is removed, so the output is time-aligned with the input.
///
/// # Errors
///
/// `InvalidConfig` if either rate is zero, `Resample` if rubato rejects
/// the rate pair
pub fn resample(buffer: &SampleBuffer, target_rate: u32) -> Result<SampleBuffer> {
    if buffer.sample_rate == 0 || target_rate == 0 {
        return Err(SynthesisError::InvalidConfig(format!(
            "cannot resample {} Hz -> {} Hz",
            buffer.sample_rate, target_rate
        )));
    }
    if buffer.sample_rate == target_rate || buffer.is_empty() {
        return Ok(SampleBuffer::new(buffer.samples.clone(), target_rate));
    }

    let source_rate = buffer.sample_rate as u64;
    let out_len = ((buffer.len() as u64 * target_rate as u64).div_ceil(source_rate)) as usize;

    let mut resampler = FftFixedIn::<f32>::new(
        buffer.sample_rate as usize,
        target_rate as usize,
        CHUNK,
        SUB_CHUNKS,
        1,
    )
    .map_err(rubato_err)?;
    let out = drive(&mut resampler, &buffer.samples, out_len)?;
    log::trace!(
        "Resampled {} -> {} samples ({} Hz -> {} Hz)",
        buffer.len(),
        out.len(),
        buffer.sample_rate,
        target_rate
    );
    Ok(SampleBuffer::new(out, target_rate))
}

/// Resample `samples` by an arbitrary `ratio` (output rate over input rate)
///
/// Output length is `ceil(len * ratio)`, time-aligned with the input.
///
/// # Errors
///
/// `InvalidConfig` for a non-positive ratio, `Resample` if rubato fails
pub fn resample_by_ratio(samples: &[f32], ratio: f64) -> Result<Vec<f32>> {
    if !(ratio.is_finite() && ratio > 0.0) {
        return Err(SynthesisError::InvalidConfig(format!(
            "cannot resample by ratio {}",
            ratio
        )));
    }
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let out_len = (samples.len() as f64 * ratio).ceil() as usize;
    let parameters = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 1.0, parameters, CHUNK, 1).map_err(rubato_err)?;
    drive(&mut resampler, samples, out_len)
}

/// Feed `input` through `resampler` and return `out_len` delay-compensated frames
fn drive<R: Resampler<f32>>(resampler: &mut R, input: &[f32], out_len: usize) -> Result<Vec<f32>> {
    let delay = resampler.output_delay();
    let mut out = Vec::with_capacity(out_len + delay + 2 * CHUNK);
    let mut pos = 0;
    // Past the end of the input, partial calls feed zeros and flush the filter
    while out.len() < out_len + delay {
        let needed = resampler.input_frames_next();
        let end = (pos + needed).min(input.len());
        let block = [&input[pos..end]];
        let frames = if end - pos == needed {
            resampler.process(&block[..], None)
        } else {
            resampler.process_partial(Some(&block[..]), None)
        }
        .map_err(rubato_err)?;
        out.extend_from_slice(&frames[0]);
        pos = end;
    }

    out.drain(..delay);
    out.truncate(out_len);
    Ok(out)
}

/// Stretch `samples` to exactly `out_len` samples by linear interpolation
///
/// Used by the time scaler to restore length after a pitch-shifting stretch,
/// where the ratio is arbitrary and not a sample-rate change.
pub fn resample_to_length(samples: &[f32], out_len: usize) -> Vec<f32> {
    if samples.is_empty() || out_len == 0 {
        return vec![0.0; out_len];
    }
    let ratio = out_len as f64 / samples.len() as f64;
    let last = samples.len() - 1;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 / ratio;
            let idx = (pos.floor() as usize).min(last);
            let frac = (pos - idx as f64).clamp(0.0, 1.0) as f32;
            let s0 = samples[idx];
            let s1 = samples[(idx + 1).min(last)];
            s0 + (s1 - s0) * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::normalization::mean_power;
    use std::f32::consts::PI;

    fn tone(freq: f32, amplitude: f32, len: usize, rate: u32) -> SampleBuffer {
        let samples = (0..len)
            .map(|n| amplitude * (2.0 * PI * freq * n as f32 / rate as f32).sin())
            .collect();
        SampleBuffer::new(samples, rate)
    }

    /// Power of the middle half, away from the filter edges
    fn mid_power(samples: &[f32]) -> f64 {
        let quarter = samples.len() / 4;
        mean_power(&samples[quarter..samples.len() - quarter])
    }

    #[test]
    fn test_downsample_length() {
        let buffer = SampleBuffer::filled(48000, 0.5, 48000);
        let resampled = resample(&buffer, 16000).unwrap();
        assert_eq!(resampled.len(), 16000);
        assert_eq!(resampled.sample_rate, 16000);

        let mid = &resampled.samples[4000..12000];
        assert!(mid.iter().all(|&s| (s - 0.5).abs() < 1e-2));
    }

    #[test]
    fn test_odd_ratio_length() {
        let buffer = tone(440.0, 0.5, 11025, 22050);
        let resampled = resample(&buffer, 16000).unwrap();
        assert_eq!(resampled.len(), 8000);
    }

    #[test]
    fn test_content_above_nyquist_rejected() {
        // 12 kHz sits above the 8 kHz Nyquist of the output
        let buffer = tone(12000.0, 0.5, 48000, 48000);
        let resampled = resample(&buffer, 16000).unwrap();

        let input_power = mid_power(&buffer.samples);
        let output_power = mid_power(&resampled.samples);
        let attenuation_db = 10.0 * (input_power / output_power.max(1e-20)).log10();
        assert!(attenuation_db >= 30.0, "only {attenuation_db} dB");
    }

    #[test]
    fn test_passband_tone_preserved() {
        let buffer = tone(1000.0, 0.5, 48000, 48000);
        let resampled = resample(&buffer, 16000).unwrap();

        let ratio_db =
            10.0 * (mid_power(&resampled.samples) / mid_power(&buffer.samples)).log10();
        assert!(ratio_db.abs() < 0.5, "passband changed by {ratio_db} dB");
    }

    #[test]
    fn test_output_is_time_aligned() {
        let mut samples = vec![0.0f32; 8000];
        samples[4000] = 1.0;
        let resampled = resample(&SampleBuffer::new(samples, 16000), 8000).unwrap();

        let peak = crate::dsp::normalization::peak_index(&resampled.samples);
        assert!((peak as i64 - 2000).abs() <= 1, "peak at {peak}");
    }

    #[test]
    fn test_fractional_ratio() {
        let buffer = tone(500.0, 0.5, 4000, 16000);
        let out = resample_by_ratio(&buffer.samples, 1.25).unwrap();
        assert_eq!(out.len(), 5000);

        // Mid-section follows the tone at the stretched rate
        let rate = 16000.0 * 1.25;
        for n in 1000..4000 {
            let expected = 0.5 * (2.0 * PI * 500.0 * n as f32 / rate).sin();
            assert!((out[n] - expected).abs() < 1e-2, "sample {n}: {} vs {expected}", out[n]);
        }
        assert!(resample_by_ratio(&buffer.samples, 0.0).is_err());
    }

    #[test]
    fn test_zero_rate_rejected() {
        let buffer = SampleBuffer::new(vec![0.0; 4], 0);
        assert!(resample(&buffer, 16000).is_err());
        let buffer = SampleBuffer::new(vec![0.0; 4], 16000);
        assert!(resample(&buffer, 0).is_err());
    }

    #[test]
    fn test_resample_to_length() {
        let out = resample_to_length(&[0.0, 1.0, 2.0, 3.0], 2);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 2.0);
    }
}
