//! Telephone band-limiting channel
//!
//! A zero-phase Butterworth band-pass over the classic 300-3400 Hz telephone
//! band, followed by peak normalization just below full scale. It replaces
//! the fabric, mobile and codec stages when the phone-band channel model is
//! selected.

use serde::{Deserialize, Serialize};

use crate::dsp::butterworth::{FilterPhase, SosFilter};
use crate::dsp::normalization::peak_normalize_to;
use crate::error::Result;
use crate::io::sample_buffer::SampleBuffer;

/// Band-pass settings recorded with each phone-band sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhoneBandParameters {
    /// Lower band edge in Hz (default: 300)
    pub low_hz: f32,
    /// Upper band edge in Hz (default: 3400)
    pub high_hz: f32,
    /// Butterworth order of each edge (default: 6)
    pub order: usize,
    /// Output peak after normalization (default: 0.99)
    pub peak: f32,
}

impl Default for PhoneBandParameters {
    fn default() -> Self {
        Self {
            low_hz: 300.0,
            high_hz: 3400.0,
            order: 6,
            peak: 0.99,
        }
    }
}

/// Band-limit `buffer` to the telephone band
///
/// # Errors
///
/// `InvalidConfig` if the band edges do not form a valid design at the
/// buffer's sample rate
pub fn apply_phone_band(buffer: &SampleBuffer, params: &PhoneBandParameters) -> Result<SampleBuffer> {
    let filter = SosFilter::bandpass(
        params.order,
        params.low_hz as f64,
        params.high_hz as f64,
        buffer.sample_rate,
    )?;
    let filtered = filter.apply(&buffer.samples, FilterPhase::ZeroPhase);

    log::debug!(
        "Phone band {}-{} Hz (order {}) on {} samples",
        params.low_hz,
        params.high_hz,
        params.order,
        buffer.len()
    );
    Ok(buffer.with_samples(peak_normalize_to(&filtered, params.peak)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / 16000.0).sin())
            .collect()
    }

    #[test]
    fn test_output_shape_and_peak() {
        let input = SampleBuffer::new(sine(1000.0, 16000), 16000);
        let out = apply_phone_band(&input, &PhoneBandParameters::default()).unwrap();
        assert_eq!(out.len(), input.len());
        assert!((out.peak() - 0.99).abs() < 1e-5, "peak {}", out.peak());
    }

    #[test]
    fn test_out_of_band_tone_is_suppressed() {
        // In-band and out-of-band tones of equal amplitude
        let mixed: Vec<f32> = sine(1000.0, 16000)
            .iter()
            .zip(sine(60.0, 16000).iter())
            .map(|(a, b)| a + b)
            .collect();
        let out = apply_phone_band(
            &SampleBuffer::new(mixed, 16000),
            &PhoneBandParameters::default(),
        )
        .unwrap();
        let in_band = apply_phone_band(
            &SampleBuffer::new(sine(1000.0, 16000), 16000),
            &PhoneBandParameters::default(),
        )
        .unwrap();

        // Compare away from the edges, each normalized by its own mid-section peak
        let mid = 4000..12000;
        let scale_out = crate::dsp::normalization::peak(&out.samples[mid.clone()]);
        let scale_ref = crate::dsp::normalization::peak(&in_band.samples[mid.clone()]);
        let diff: f32 = out.samples[mid.clone()]
            .iter()
            .zip(in_band.samples[mid].iter())
            .map(|(a, b)| (a / scale_out - b / scale_ref).abs())
            .fold(0.0, f32::max);
        assert!(diff < 0.05, "60 Hz residue {}", diff);
    }

    #[test]
    fn test_silence_stays_silent() {
        let out = apply_phone_band(&SampleBuffer::silence(800, 16000), &PhoneBandParameters::default())
            .unwrap();
        assert!(out.samples.iter().all(|&x| x == 0.0));
    }
}
