//! Digital Butterworth filters as cascaded second-order sections
//!
//! An order-N design is built from `N / 2` bilinear-transformed biquads with
//! the Butterworth pole Q values, plus one first-order section when N is odd.
//! Every section is prewarped at the cutoff, so the cascade has the classic
//! -3 dB point at `cutoff_hz`.
//!
//! Filtering is either [`FilterPhase::Causal`] (one forward pass, like a
//! recursive filter running in real time) or [`FilterPhase::ZeroPhase`]
//! (forward-backward with odd-symmetric edge padding). The two are not
//! interchangeable for replay, so the phase is always part of the logged
//! parameters.
//!
//! # Example
//!
//! ```
//! use farfield_synth::dsp::butterworth::{FilterPhase, SosFilter};
//!
//! let filter = SosFilter::lowpass(4, 3000.0, 16000)?;
//! let out = filter.apply(&vec![1.0f32; 256], FilterPhase::Causal);
//! assert_eq!(out.len(), 256);
//! # Ok::<(), farfield_synth::SynthesisError>(())
//! ```

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SynthesisError};

/// Cutoffs are clamped to this fraction of Nyquist
const MAX_NYQUIST_FRACTION: f64 = 0.99;

/// How a filter is run over a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterPhase {
    /// Single forward pass (phase-distorting, causal)
    Causal,
    /// Forward-backward pass (zero phase, squared magnitude response)
    ZeroPhase,
}

/// One section in Direct Form II transposed, normalized so that a0 = 1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    fn lowpass(w0: f64, q: f64) -> Self {
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 - cos_w0) / 2.0 / a0,
            b1: (1.0 - cos_w0) / a0,
            b2: (1.0 - cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn highpass(w0: f64, q: f64) -> Self {
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 + cos_w0) / 2.0 / a0,
            b1: -(1.0 + cos_w0) / a0,
            b2: (1.0 + cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    /// First-order lowpass stored as a degenerate biquad
    fn first_order_lowpass(w0: f64) -> Self {
        let k = (w0 / 2.0).tan();
        Self {
            b0: k / (1.0 + k),
            b1: k / (1.0 + k),
            b2: 0.0,
            a1: (k - 1.0) / (k + 1.0),
            a2: 0.0,
        }
    }

    fn first_order_highpass(w0: f64) -> Self {
        let k = (w0 / 2.0).tan();
        Self {
            b0: 1.0 / (1.0 + k),
            b1: -1.0 / (1.0 + k),
            b2: 0.0,
            a1: (k - 1.0) / (k + 1.0),
            a2: 0.0,
        }
    }

    /// Gain at DC
    fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }

    /// Filter in place starting from the steady state for a constant input
    /// of `initial`; returns the steady-state output fed to the next section
    fn run(&self, samples: &mut [f64], initial: f64) -> f64 {
        let steady = self.dc_gain() * initial;
        let mut z1 = steady - self.b0 * initial;
        let mut z2 = self.b2 * initial - self.a2 * steady;
        for x in samples.iter_mut() {
            let input = *x;
            let y = self.b0 * input + z1;
            z1 = self.b1 * input - self.a1 * y + z2;
            z2 = self.b2 * input - self.a2 * y;
            *x = y;
        }
        steady
    }
}

/// Q of each conjugate pole pair of an order-N Butterworth prototype
fn butterworth_qs(order: usize) -> Vec<f64> {
    (0..order / 2)
        .map(|k| {
            let angle = PI * (order - 1 - 2 * k) as f64 / (2.0 * order as f64);
            1.0 / (2.0 * angle.cos())
        })
        .collect()
}

/// Cascade of second-order sections
#[derive(Debug, Clone, PartialEq)]
pub struct SosFilter {
    sections: Vec<Biquad>,
}

impl SosFilter {
    /// Order-N Butterworth lowpass
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a zero order, non-positive cutoff or zero rate
    pub fn lowpass(order: usize, cutoff_hz: f64, sample_rate: u32) -> Result<Self> {
        let w0 = normalized_cutoff(order, cutoff_hz, sample_rate)?;
        let mut sections: Vec<Biquad> = butterworth_qs(order)
            .into_iter()
            .map(|q| Biquad::lowpass(w0, q))
            .collect();
        if order % 2 == 1 {
            sections.push(Biquad::first_order_lowpass(w0));
        }
        Ok(Self { sections })
    }

    /// Order-N Butterworth highpass
    pub fn highpass(order: usize, cutoff_hz: f64, sample_rate: u32) -> Result<Self> {
        let w0 = normalized_cutoff(order, cutoff_hz, sample_rate)?;
        let mut sections: Vec<Biquad> = butterworth_qs(order)
            .into_iter()
            .map(|q| Biquad::highpass(w0, q))
            .collect();
        if order % 2 == 1 {
            sections.push(Biquad::first_order_highpass(w0));
        }
        Ok(Self { sections })
    }

    /// Band-pass built as an order-N highpass at `low_hz` cascaded with an
    /// order-N lowpass at `high_hz`
    pub fn bandpass(order: usize, low_hz: f64, high_hz: f64, sample_rate: u32) -> Result<Self> {
        if low_hz >= high_hz {
            return Err(SynthesisError::InvalidConfig(format!(
                "band-pass edges must be increasing, got {} Hz..{} Hz",
                low_hz, high_hz
            )));
        }
        let mut sections = Self::highpass(order, low_hz, sample_rate)?.sections;
        sections.extend(Self::lowpass(order, high_hz, sample_rate)?.sections);
        Ok(Self { sections })
    }

    /// Number of cascaded sections
    pub fn num_sections(&self) -> usize {
        self.sections.len()
    }

    /// Run the cascade over `samples`, returning a new buffer
    pub fn apply(&self, samples: &[f32], phase: FilterPhase) -> Vec<f32> {
        match phase {
            FilterPhase::Causal => {
                let mut work: Vec<f64> = samples.iter().map(|&x| x as f64).collect();
                self.run(&mut work, 0.0);
                work.into_iter().map(|x| x as f32).collect()
            }
            FilterPhase::ZeroPhase => self.apply_zero_phase(samples),
        }
    }

    /// Run every section; a non-zero `initial` starts each section in the
    /// steady state for that constant input
    fn run(&self, work: &mut [f64], initial: f64) {
        let mut level = initial;
        for section in &self.sections {
            level = section.run(work, level);
        }
    }

    fn apply_zero_phase(&self, samples: &[f32]) -> Vec<f32> {
        let n = samples.len();
        if n == 0 {
            return Vec::new();
        }

        // Odd-symmetric extension at both edges to limit start-up transients
        let pad = (3 * (2 * self.sections.len() + 1)).min(n - 1);
        let first = samples[0] as f64;
        let last = samples[n - 1] as f64;

        let mut work: Vec<f64> = Vec::with_capacity(n + 2 * pad);
        work.extend((1..=pad).rev().map(|i| 2.0 * first - samples[i] as f64));
        work.extend(samples.iter().map(|&x| x as f64));
        work.extend((1..=pad).map(|i| 2.0 * last - samples[n - 1 - i] as f64));

        let start = work[0];
        self.run(&mut work, start);
        work.reverse();
        let start = work[0];
        self.run(&mut work, start);
        work.reverse();

        work[pad..pad + n].iter().map(|&x| x as f32).collect()
    }
}

/// Validate a design request and return the digital cutoff in rad/sample
fn normalized_cutoff(order: usize, cutoff_hz: f64, sample_rate: u32) -> Result<f64> {
    if order == 0 {
        return Err(SynthesisError::InvalidConfig(
            "filter order must be at least 1".to_string(),
        ));
    }
    if sample_rate == 0 {
        return Err(SynthesisError::InvalidConfig(
            "filter sample rate must be positive".to_string(),
        ));
    }
    if !(cutoff_hz > 0.0) {
        return Err(SynthesisError::InvalidConfig(format!(
            "filter cutoff must be positive, got {} Hz",
            cutoff_hz
        )));
    }

    let nyquist = sample_rate as f64 / 2.0;
    let limit = nyquist * MAX_NYQUIST_FRACTION;
    let cutoff = if cutoff_hz > limit {
        log::debug!(
            "Clamping cutoff {} Hz to {:.1} Hz (Nyquist {} Hz)",
            cutoff_hz,
            limit,
            nyquist
        );
        limit
    } else {
        cutoff_hz
    };

    Ok(2.0 * PI * cutoff / sample_rate as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn rms(x: &[f32]) -> f32 {
        (x.iter().map(|v| v * v).sum::<f32>() / x.len() as f32).sqrt()
    }

    #[test]
    fn test_butterworth_qs() {
        let q2 = butterworth_qs(2);
        assert_eq!(q2.len(), 1);
        assert!((q2[0] - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-9);

        let q3 = butterworth_qs(3);
        assert_eq!(q3.len(), 1);
        assert!((q3[0] - 1.0).abs() < 1e-9);

        let q4 = butterworth_qs(4);
        assert!((q4[0] - 1.306_563).abs() < 1e-5);
        assert!((q4[1] - 0.541_196).abs() < 1e-5);
    }

    #[test]
    fn test_section_counts() {
        assert_eq!(SosFilter::lowpass(2, 1000.0, 16000).unwrap().num_sections(), 1);
        assert_eq!(SosFilter::lowpass(5, 1000.0, 16000).unwrap().num_sections(), 3);
        assert_eq!(
            SosFilter::bandpass(6, 300.0, 3400.0, 16000).unwrap().num_sections(),
            6
        );
    }

    #[test]
    fn test_lowpass_attenuates_stopband() {
        let filter = SosFilter::lowpass(4, 1000.0, 16000).unwrap();
        let pass = filter.apply(&sine(200.0, 16000, 16000), FilterPhase::Causal);
        let stop = filter.apply(&sine(6000.0, 16000, 16000), FilterPhase::Causal);

        let pass_rms = rms(&pass[2000..]);
        let stop_rms = rms(&stop[2000..]);
        assert!(pass_rms > 0.65, "passband rms {}", pass_rms);
        assert!(stop_rms < 0.01, "stopband rms {}", stop_rms);
    }

    #[test]
    fn test_cutoff_is_minus_3db() {
        let filter = SosFilter::lowpass(3, 2000.0, 16000).unwrap();
        let out = filter.apply(&sine(2000.0, 16000, 32000), FilterPhase::Causal);
        let gain = rms(&out[8000..]) / std::f32::consts::FRAC_1_SQRT_2;
        assert!((gain - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.02, "gain {}", gain);
    }

    #[test]
    fn test_zero_phase_has_no_lag() {
        let filter = SosFilter::lowpass(4, 2000.0, 16000).unwrap();
        let input = sine(100.0, 16000, 8000);
        let causal = filter.apply(&input, FilterPhase::Causal);
        let zero = filter.apply(&input, FilterPhase::ZeroPhase);

        assert_eq!(zero.len(), input.len());
        let mid = 4000..4100;
        let zero_err: f32 = mid.clone().map(|i| (zero[i] - input[i]).abs()).fold(0.0, f32::max);
        let causal_err: f32 = mid.map(|i| (causal[i] - input[i]).abs()).fold(0.0, f32::max);
        assert!(zero_err < 0.01, "zero-phase error {}", zero_err);
        assert!(causal_err > zero_err, "causal filter should lag the input");
    }

    #[test]
    fn test_cutoff_at_nyquist_is_clamped() {
        let filter = SosFilter::lowpass(2, 8000.0, 16000).unwrap();
        let out = filter.apply(&sine(440.0, 16000, 1000), FilterPhase::Causal);
        assert!(out.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_invalid_designs() {
        assert!(SosFilter::lowpass(0, 1000.0, 16000).is_err());
        assert!(SosFilter::lowpass(2, 0.0, 16000).is_err());
        assert!(SosFilter::lowpass(2, 1000.0, 0).is_err());
        assert!(SosFilter::bandpass(2, 3400.0, 300.0, 16000).is_err());
    }

    #[test]
    fn test_zero_phase_single_sample() {
        let filter = SosFilter::lowpass(2, 1000.0, 16000).unwrap();
        assert_eq!(filter.apply(&[0.5], FilterPhase::ZeroPhase).len(), 1);
        assert!(filter.apply(&[], FilterPhase::ZeroPhase).is_empty());
    }
}
