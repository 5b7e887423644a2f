//! Power-ratio mixing of two equal-length buffers

use crate::dsp::normalization::{mean_power, peak_normalize};
use crate::error::{Result, SynthesisError};
use crate::io::sample_buffer::SampleBuffer;

/// Buffers at or below this mean power are treated as silent
pub const SILENCE_POWER: f64 = 1e-20;

/// Gain applied to `b` so that `P(a) / P(gain · b) = 10^(ratio_db / 10)`
///
/// Returns 0 when `b` is silent, so a silent layer contributes nothing.
pub fn mix_scale(a: &[f32], b: &[f32], ratio_db: f32) -> f64 {
    let power_a = mean_power(a);
    let power_b = mean_power(b);
    if power_b <= SILENCE_POWER {
        return 0.0;
    }
    (power_a / (power_b * 10f64.powf(ratio_db as f64 / 10.0))).sqrt()
}

/// Blend `b` into `a` at `ratio_db` and peak-normalize the sum
///
/// # Errors
///
/// `LengthMismatch` if the buffers differ in length, `SampleRateMismatch` if
/// they differ in rate
pub fn stack(a: &SampleBuffer, b: &SampleBuffer, ratio_db: f32) -> Result<SampleBuffer> {
    if a.len() != b.len() {
        return Err(SynthesisError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    if a.sample_rate != b.sample_rate {
        return Err(SynthesisError::SampleRateMismatch {
            expected: a.sample_rate,
            actual: b.sample_rate,
            context: "stacked buffer".to_string(),
        });
    }

    let scale = mix_scale(&a.samples, &b.samples, ratio_db);
    log::debug!("Stacking at {:.2} dB (scale {:.4e})", ratio_db, scale);

    let mixed: Vec<f32> = a
        .samples
        .iter()
        .zip(b.samples.iter())
        .map(|(&x, &y)| (x as f64 + scale * y as f64) as f32)
        .collect();
    Ok(a.with_samples(peak_normalize(&mixed)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / 16000.0).sin())
            .collect()
    }

    #[test]
    fn test_zero_db_equal_power() {
        let a = sine(440.0, 0.5, 16000);
        let b = sine(1000.0, 0.5, 16000);
        let scale = mix_scale(&a, &b, 0.0);
        let scaled: Vec<f32> = b.iter().map(|&x| (x as f64 * scale) as f32).collect();

        let ratio = mean_power(&a) / mean_power(&scaled);
        assert!((ratio - 1.0).abs() < 1e-4, "power ratio {}", ratio);
        assert!((scale - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_ratio_sets_relative_power() {
        let a = sine(440.0, 0.2, 16000);
        let b = sine(1000.0, 0.9, 16000);
        let scale = mix_scale(&a, &b, 10.0);
        let scaled: Vec<f32> = b.iter().map(|&x| (x as f64 * scale) as f32).collect();

        let ratio_db = 10.0 * (mean_power(&a) / mean_power(&scaled)).log10();
        assert!((ratio_db - 10.0).abs() < 1e-3, "ratio {} dB", ratio_db);
    }

    #[test]
    fn test_stack_normalizes() {
        let a = SampleBuffer::new(sine(440.0, 0.2, 4000), 16000);
        let b = SampleBuffer::new(sine(300.0, 0.1, 4000), 16000);
        let out = stack(&a, &b, 5.0).unwrap();
        assert_eq!(out.len(), 4000);
        assert!((out.peak() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_length_mismatch_is_fatal() {
        let a = SampleBuffer::silence(10, 16000);
        let b = SampleBuffer::silence(11, 16000);
        assert!(matches!(
            stack(&a, &b, 0.0),
            Err(SynthesisError::LengthMismatch { left: 10, right: 11 })
        ));
    }

    #[test]
    fn test_silent_layer_contributes_nothing() {
        let a = SampleBuffer::new(sine(440.0, 0.5, 1000), 16000);
        let floor = SampleBuffer::filled(1000, 1e-14, 16000);
        assert_eq!(mix_scale(&a.samples, &floor.samples, -5.0), 0.0);

        let out = stack(&a, &floor, -5.0).unwrap();
        let expected = peak_normalize(&a.samples);
        assert_eq!(out.samples, expected);
    }
}
