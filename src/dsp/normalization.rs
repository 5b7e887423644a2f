//! Peak normalization and power measurement
//!
//! Convolution, stacking and the phone-band channel all finish by dividing by
//! the absolute peak so that successive stages see full-scale input.
//!
//! # Example
//!
//! ```
//! use farfield_synth::dsp::normalization::peak_normalize;
//!
//! let normalized = peak_normalize(&[0.25, -0.5, 0.1]);
//! assert_eq!(normalized, vec![0.5, -1.0, 0.2]);
//! ```

/// Divide by the maximum absolute value
///
/// Returns the input unchanged (copied) when the peak is zero, so silent
/// buffers never produce NaN.
pub fn peak_normalize(samples: &[f32]) -> Vec<f32> {
    peak_normalize_to(samples, 1.0)
}

/// Scale so that the maximum absolute value equals `target_peak`
///
/// Silent input is returned unchanged.
pub fn peak_normalize_to(samples: &[f32], target_peak: f32) -> Vec<f32> {
    let peak = peak(samples);
    if peak <= 0.0 {
        log::debug!("Peak normalization skipped: buffer is silent");
        return samples.to_vec();
    }
    let gain = target_peak / peak;
    samples.iter().map(|&x| x * gain).collect()
}

/// Largest absolute sample value
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().map(|&x| x.abs()).fold(0.0f32, f32::max)
}

/// Index of the largest absolute value (first occurrence on ties)
///
/// Returns 0 for an empty slice.
pub fn peak_index(samples: &[f32]) -> usize {
    let mut best = 0usize;
    let mut best_value = f32::NEG_INFINITY;
    for (i, &x) in samples.iter().enumerate() {
        let a = x.abs();
        if a > best_value {
            best = i;
            best_value = a;
        }
    }
    best
}

/// Mean signal power (mean of squares), accumulated in f64
pub fn mean_power(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>() / samples.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Generate a test signal: sine wave at 440 Hz
    fn generate_test_signal(length: usize, amplitude: f32, sample_rate: f32) -> Vec<f32> {
        let freq = 440.0;
        (0..length)
            .map(|i| {
                let t = i as f32 / sample_rate;
                amplitude * (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect()
    }

    #[test]
    fn test_peak_normalization() {
        let samples = generate_test_signal(16000, 0.3, 16000.0);
        let normalized = peak_normalize(&samples);

        let new_peak = peak(&normalized);
        assert!(
            (new_peak - 1.0).abs() < 1e-6,
            "Peak normalization failed: expected 1.0, got {:.6}",
            new_peak
        );
    }

    #[test]
    fn test_silent_audio() {
        let samples = vec![0.0f32; 1000];
        let normalized = peak_normalize(&samples);
        assert_eq!(normalized, samples, "Silent audio should pass through");
        assert!(normalized.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_peak_index_first_on_ties() {
        assert_eq!(peak_index(&[0.1, -0.9, 0.9, 0.2]), 1);
        assert_eq!(peak_index(&[]), 0);
    }

    #[test]
    fn test_mean_power() {
        let samples = vec![1.0f32, -1.0, 1.0, -1.0];
        assert!((mean_power(&samples) - 1.0).abs() < 1e-12);
        assert_eq!(mean_power(&[0.0; 8]), 0.0);
        assert_eq!(mean_power(&[]), 0.0);
    }

    #[test]
    fn test_normalize_to_target() {
        let normalized = peak_normalize_to(&[0.5, -0.25], 0.99);
        assert!((normalized[0] - 0.99).abs() < 1e-6);
        assert!((normalized[1] + 0.495).abs() < 1e-6);
    }
}
