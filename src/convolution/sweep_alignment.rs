//! Time alignment of sweep recordings against their reference
//!
//! Recordings made through different media rarely start at the same instant.
//! The lag is estimated in two passes:
//!
//! 1. Coarse: magnitude spectrograms of both sweeps are thresholded, split
//!    into frequency bands and cross-correlated along time. Each band votes
//!    for a lag in hops; outlying votes are dropped and the rest averaged.
//! 2. Fine: the waveform cross-correlation is searched within one hop of the
//!    coarse lag.
//!
//! The recording is then shifted by the lag and trimmed (or zero-padded) to
//! the reference length, ready for [`derive_impulse_response`].
//!
//! [`derive_impulse_response`]: crate::convolution::ir_design::derive_impulse_response

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SynthesisError};
use crate::io::sample_buffer::SampleBuffer;

/// Alignment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepAlignmentSettings {
    /// STFT frame length (default: 2048)
    pub frame_len: usize,
    /// STFT hop; the coarse lag resolution (default: 32)
    pub hop_len: usize,
    /// Bins below this frequency are ignored (default: 2000 Hz)
    pub low_cut_hz: f64,
    /// Spectrogram cells under this multiple of the mean are zeroed (default: 2)
    pub noise_coefficient: f32,
    /// Number of frequency bands; the top band is not used (default: 5)
    pub bands: usize,
}

impl Default for SweepAlignmentSettings {
    fn default() -> Self {
        Self {
            frame_len: 2048,
            hop_len: 32,
            low_cut_hz: 2000.0,
            noise_coefficient: 2.0,
            bands: 5,
        }
    }
}

/// Recording shifted onto the reference timeline
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedRecording {
    /// Shifted recording, same length and rate as the reference
    pub buffer: SampleBuffer,
    /// Samples the recording lagged behind the reference (negative if ahead)
    pub lag: i64,
}

/// Magnitude spectrogram, one row per kept bin
struct Spectrogram {
    rows: Vec<Vec<f32>>,
}

impl Spectrogram {
    fn compute(
        samples: &[f32],
        frames: usize,
        first_bin: usize,
        settings: &SweepAlignmentSettings,
        planner: &mut FftPlanner<f32>,
    ) -> Self {
        let frame_len = settings.frame_len;
        let bins = frame_len / 2 + 1;
        let fft = planner.plan_fft_forward(frame_len);
        let window: Vec<f32> = (0..frame_len)
            .map(|n| {
                0.5 - 0.5 * (2.0 * std::f32::consts::PI * n as f32 / frame_len as f32).cos()
            })
            .collect();

        let mut rows = vec![vec![0.0f32; frames]; bins.saturating_sub(first_bin)];
        let mut frame = vec![Complex::new(0.0f32, 0.0); frame_len];
        for t in 0..frames {
            let start = t * settings.hop_len;
            for (n, slot) in frame.iter_mut().enumerate() {
                let x = samples.get(start + n).copied().unwrap_or(0.0);
                *slot = Complex::new(x * window[n], 0.0);
            }
            fft.process(&mut frame);
            for (row, bin) in rows.iter_mut().zip(first_bin..bins) {
                row[t] = frame[bin].norm();
            }
        }

        let mut spectrogram = Self { rows };
        spectrogram.threshold(settings.noise_coefficient);
        spectrogram
    }

    fn threshold(&mut self, coefficient: f32) {
        let cells: usize = self.rows.iter().map(Vec::len).sum();
        if cells == 0 {
            return;
        }
        let mean = self.rows.iter().flatten().map(|&x| x as f64).sum::<f64>() / cells as f64;
        let floor = (mean * coefficient as f64) as f32;
        for x in self.rows.iter_mut().flatten() {
            if *x < floor {
                *x = 0.0;
            }
        }
    }
}

/// Cross-correlation along time summed over `rows`, indexed by lag + frames - 1
fn band_correlation(
    recorded: &[Vec<f32>],
    reference: &[Vec<f32>],
    frames: usize,
    planner: &mut FftPlanner<f32>,
) -> Vec<f32> {
    let n = (2 * frames - 1).next_power_of_two();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let mut acc = vec![Complex::new(0.0f32, 0.0); n];
    for (rec, refr) in recorded.iter().zip(reference.iter()) {
        let mut a: Vec<Complex<f32>> = rec
            .iter()
            .map(|&x| Complex::new(x, 0.0))
            .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
            .take(n)
            .collect();
        let mut b: Vec<Complex<f32>> = refr
            .iter()
            .map(|&x| Complex::new(x, 0.0))
            .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
            .take(n)
            .collect();
        forward.process(&mut a);
        forward.process(&mut b);
        for ((slot, x), y) in acc.iter_mut().zip(a.iter()).zip(b.iter()) {
            *slot += x * y.conj();
        }
    }
    inverse.process(&mut acc);

    // Circular index L mod n holds the lag L
    (0..2 * frames - 1)
        .map(|i| {
            let lag = i as i64 - (frames as i64 - 1);
            acc[lag.rem_euclid(n as i64) as usize].re
        })
        .collect()
}

/// Lag in hops voted by the bands, outliers dropped
fn coarse_lag_hops(votes: &[i64]) -> Option<f64> {
    if votes.is_empty() {
        return None;
    }
    let n = votes.len() as f64;
    let mean = votes.iter().sum::<i64>() as f64 / n;
    let std = (votes.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n).sqrt();
    let kept: Vec<f64> = votes
        .iter()
        .map(|&v| v as f64)
        .filter(|v| (v - mean).abs() < 1.2 * (std + 1e-4))
        .collect();
    if kept.is_empty() {
        return Some(mean);
    }
    Some(kept.iter().sum::<f64>() / kept.len() as f64)
}

/// Waveform cross-correlation at one lag
fn correlation_at(recorded: &[f32], reference: &[f32], lag: i64) -> f64 {
    reference
        .iter()
        .enumerate()
        .filter_map(|(t, &r)| {
            let i = t as i64 + lag;
            (i >= 0)
                .then(|| recorded.get(i as usize))
                .flatten()
                .map(|&x| x as f64 * r as f64)
        })
        .sum()
}

/// Estimate how many samples `recorded` lags behind `reference`
///
/// # Errors
///
/// `SampleRateMismatch` if the rates differ, `InvalidConfig` for empty
/// input or a zero frame/hop length
pub fn estimate_lag(
    reference: &SampleBuffer,
    recorded: &SampleBuffer,
    settings: &SweepAlignmentSettings,
) -> Result<i64> {
    if reference.sample_rate != recorded.sample_rate {
        return Err(SynthesisError::SampleRateMismatch {
            expected: reference.sample_rate,
            actual: recorded.sample_rate,
            context: "sweep alignment".to_string(),
        });
    }
    if reference.is_empty() || recorded.is_empty() {
        return Err(SynthesisError::InvalidConfig("empty sweep".to_string()));
    }
    if settings.frame_len < 2 || settings.hop_len == 0 || settings.bands == 0 {
        return Err(SynthesisError::InvalidConfig(format!(
            "invalid alignment frame {} / hop {} / bands {}",
            settings.frame_len, settings.hop_len, settings.bands
        )));
    }

    // Both spectrograms share the longer frame count
    let frames = reference.len().max(recorded.len()).div_ceil(settings.hop_len);
    let bin_hz = reference.sample_rate as f64 / settings.frame_len as f64;
    let first_bin = ((settings.low_cut_hz / bin_hz).ceil() as usize).min(settings.frame_len / 2);

    let mut planner = FftPlanner::<f32>::new();
    let spec_ref = Spectrogram::compute(&reference.samples, frames, first_bin, settings, &mut planner);
    let spec_rec = Spectrogram::compute(&recorded.samples, frames, first_bin, settings, &mut planner);

    let rows = spec_ref.rows.len();
    let band_size = rows.div_ceil(settings.bands).max(1);
    let used_bands = settings.bands.saturating_sub(1).max(1);
    let votes: Vec<i64> = (0..used_bands)
        .filter_map(|band| {
            let start = band * band_size;
            let end = (start + band_size).min(rows);
            if start >= end {
                return None;
            }
            let corr = band_correlation(
                &spec_rec.rows[start..end],
                &spec_ref.rows[start..end],
                frames,
                &mut planner,
            );
            let (best, &value) = corr
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))?;
            // A band with nothing above the noise floor has no opinion
            (value > 0.0).then_some(best as i64 - (frames as i64 - 1))
        })
        .collect();

    let coarse = match coarse_lag_hops(&votes) {
        Some(hops) => (hops * settings.hop_len as f64).round() as i64,
        None => {
            log::warn!("No band above the noise floor; searching around zero lag");
            0
        }
    };

    let radius = settings.hop_len as i64;
    let lag = ((coarse - radius)..=(coarse + radius))
        .map(|lag| (lag, correlation_at(&recorded.samples, &reference.samples, lag)))
        .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.abs().cmp(&a.0.abs())))
        .map(|(lag, _)| lag)
        .unwrap_or(coarse);

    log::debug!(
        "Sweep lag: {} bands voted {:?} hops, coarse {} samples, refined {} samples",
        used_bands,
        votes,
        coarse,
        lag
    );
    Ok(lag)
}

/// Shift `recorded` onto the timeline of `reference`
///
/// The leading `lag` samples are dropped (or zeros inserted when the
/// recording is ahead), then the result is cut or zero-padded to the
/// reference length.
///
/// # Errors
///
/// See [`estimate_lag`]
pub fn align_recording(
    reference: &SampleBuffer,
    recorded: &SampleBuffer,
    settings: &SweepAlignmentSettings,
) -> Result<AlignedRecording> {
    let lag = estimate_lag(reference, recorded, settings)?;
    if lag < 0 {
        log::warn!(
            "Recording is {} samples ahead of the reference; padding its start",
            -lag
        );
    }

    let samples = (0..reference.len())
        .map(|t| {
            let i = t as i64 + lag;
            if i < 0 {
                0.0
            } else {
                recorded.samples.get(i as usize).copied().unwrap_or(0.0)
            }
        })
        .collect();

    Ok(AlignedRecording {
        buffer: recorded.with_samples(samples),
        lag,
    })
}
