//! Tempo and pitch collaborators
//!
//! The pipeline only depends on the [`TimeScaler`] trait. The built-in
//! [`OlaTimeScaler`] is a plain Hann-window overlap-add stretcher: good enough
//! for augmentation, not a studio-grade phase vocoder. Pitch shifting is a
//! stretch followed by a linear resample back to the input length.

use std::f64::consts::PI;

use crate::error::{Result, SynthesisError};
use crate::io::resample::resample_to_length;
use crate::io::sample_buffer::SampleBuffer;

/// Pitch-preserving tempo change and length-preserving pitch shift
pub trait TimeScaler: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Change tempo by `rate` (> 1 is faster); output length ≈ `len / rate`
    fn time_stretch(&self, buffer: &SampleBuffer, rate: f32) -> Result<SampleBuffer>;

    /// Shift pitch by `semitones`, keeping the length
    fn pitch_shift(&self, buffer: &SampleBuffer, semitones: i32) -> Result<SampleBuffer>;
}

/// Hann-window overlap-add time scaler
#[derive(Debug, Clone)]
pub struct OlaTimeScaler {
    frame_len: usize,
    synthesis_hop: usize,
}

impl Default for OlaTimeScaler {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl OlaTimeScaler {
    /// Scaler with frames of `frame_len` samples and 75% overlap
    pub fn new(frame_len: usize) -> Self {
        let frame_len = frame_len.max(4);
        Self {
            frame_len,
            synthesis_hop: frame_len / 4,
        }
    }

    fn stretch(&self, samples: &[f32], rate: f64) -> Vec<f32> {
        let out_len = (samples.len() as f64 / rate).round() as usize;
        if samples.is_empty() || out_len == 0 {
            return vec![0.0; out_len];
        }

        let window: Vec<f64> = (0..self.frame_len)
            .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f64 / self.frame_len as f64).cos())
            .collect();
        let analysis_hop = self.synthesis_hop as f64 * rate;

        let mut acc = vec![0.0f64; out_len + self.frame_len];
        let mut weight = vec![0.0f64; out_len + self.frame_len];
        let frames = out_len / self.synthesis_hop + 1;

        for m in 0..frames {
            let in_start = (m as f64 * analysis_hop).round() as usize;
            let out_start = m * self.synthesis_hop;
            for (n, &w) in window.iter().enumerate() {
                let x = samples.get(in_start + n).copied().unwrap_or(0.0) as f64;
                acc[out_start + n] += x * w;
                weight[out_start + n] += w;
            }
        }

        acc.iter()
            .zip(weight.iter())
            .take(out_len)
            .map(|(&a, &w)| if w > 1e-6 { (a / w) as f32 } else { 0.0 })
            .collect()
    }
}

impl TimeScaler for OlaTimeScaler {
    fn name(&self) -> &str {
        "ola"
    }

    fn time_stretch(&self, buffer: &SampleBuffer, rate: f32) -> Result<SampleBuffer> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(SynthesisError::TimeScale(format!(
                "tempo rate must be positive and finite, got {}",
                rate
            )));
        }
        if rate == 1.0 {
            return Ok(buffer.clone());
        }
        log::debug!("OLA time stretch: {} samples at rate {:.4}", buffer.len(), rate);
        Ok(buffer.with_samples(self.stretch(&buffer.samples, rate as f64)))
    }

    fn pitch_shift(&self, buffer: &SampleBuffer, semitones: i32) -> Result<SampleBuffer> {
        if semitones == 0 || buffer.is_empty() {
            return Ok(buffer.clone());
        }
        let factor = 2f64.powf(semitones as f64 / 12.0);
        log::debug!("OLA pitch shift: {} semitones (factor {:.4})", semitones, factor);

        // Stretch by the pitch factor, then squeeze back to the input length
        let stretched = self.stretch(&buffer.samples, 1.0 / factor);
        Ok(buffer.with_samples(resample_to_length(&stretched, buffer.len())))
    }
}
