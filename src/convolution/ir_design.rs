//! Impulse-response derivation from sine-sweep recordings
//!
//! A fabric (or any other medium) is characterized by playing a sweep through
//! it and recording the result next to an unobstructed reference recording.
//! The response is estimated in the frequency domain:
//!
//! 1. Tukey-window both sweeps and FFT them at the next power of two
//! 2. Normalize each spectrum to unit peak magnitude and zero bins below a
//!    relative threshold
//! 3. Regularized deconvolution `H = Y·X* / (|X|² + λ)`
//! 4. Keep the bins up to the target Nyquist (implicit downsampling)
//! 5. Apply the [`LowFrequencyPolicy`] below the suppression frequency
//! 6. Inverse FFT of the Hermitian spectrum, resampled onto the exact target
//!    rate and truncated to a fixed length
//!
//! [`derive_repository`] first shifts every recording onto the reference
//! timeline (see [`sweep_alignment`]). The result is meant to be stored in an
//! IR repository as float WAV.
//!
//! [`sweep_alignment`]: crate::convolution::sweep_alignment

use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::convolution::sweep_alignment::{align_recording, SweepAlignmentSettings};
use crate::error::{Result, SynthesisError};
use crate::io::decoder::decode_audio;
use crate::io::manifest::{AssetManifest, AUDIO_EXTENSIONS};
use crate::io::resample::resample_by_ratio;
use crate::io::sample_buffer::SampleBuffer;
use crate::io::wav::write_wav_float;

/// What happens to the bins below the suppression frequency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", content = "gain", rename_all = "snake_case")]
pub enum LowFrequencyPolicy {
    /// Overwrite the bins with a real gain, discarding their phase
    /// (the historical behaviour, kept for reproducing existing repositories)
    AbsoluteGain(f64),
    /// Multiply the existing bins by a gain, keeping their phase
    ScaleMagnitude(f64),
    /// Leave the low band untouched
    Disabled,
}

impl Default for LowFrequencyPolicy {
    fn default() -> Self {
        LowFrequencyPolicy::AbsoluteGain(0.45)
    }
}

/// Derivation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IrDerivationSettings {
    /// Rate of the derived response (default: 16000)
    pub target_rate: u32,
    /// Tukey taper fraction (default: 0.05)
    pub tukey_alpha: f64,
    /// Bins below this fraction of the peak magnitude are zeroed (default: 1e-6)
    pub threshold_ratio: f64,
    /// Tikhonov regularization λ (default: 1e-3)
    pub regularization: f64,
    /// Upper edge of the low band in Hz (default: 400)
    pub low_frequency_hz: f64,
    /// Treatment of the low band
    pub low_frequency_policy: LowFrequencyPolicy,
    /// Keep only this many taps (default: 600, about 40 ms at 16 kHz)
    pub truncate_to: Option<usize>,
    /// Time-align recordings before derivation (`None` trusts the recordings)
    pub alignment: Option<SweepAlignmentSettings>,
}

impl Default for IrDerivationSettings {
    fn default() -> Self {
        Self {
            target_rate: 16000,
            tukey_alpha: 0.05,
            threshold_ratio: 1e-6,
            regularization: 1e-3,
            low_frequency_hz: 400.0,
            low_frequency_policy: LowFrequencyPolicy::default(),
            truncate_to: Some(600),
            alignment: Some(SweepAlignmentSettings::default()),
        }
    }
}

/// Tukey (tapered cosine) window
///
/// `alpha = 0` is rectangular, `alpha = 1` is Hann.
pub fn tukey_window(len: usize, alpha: f64) -> Vec<f64> {
    if len <= 1 {
        return vec![1.0; len];
    }
    let alpha = alpha.clamp(0.0, 1.0);
    if alpha == 0.0 {
        return vec![1.0; len];
    }
    let width = alpha * (len - 1) as f64 / 2.0;
    (0..len)
        .map(|n| {
            let n = n as f64;
            let last = (len - 1) as f64;
            if n < width {
                0.5 * (1.0 + (PI * (n / width - 1.0)).cos())
            } else if n > last - width {
                0.5 * (1.0 + (PI * ((n - last) / width + 1.0)).cos())
            } else {
                1.0
            }
        })
        .collect()
}

fn windowed_spectrum(
    samples: &[f32],
    window: &[f64],
    fft_len: usize,
    planner: &mut FftPlanner<f64>,
) -> Vec<Complex<f64>> {
    let mut spectrum: Vec<Complex<f64>> = samples
        .iter()
        .zip(window.iter())
        .map(|(&x, &w)| Complex::new(x as f64 * w, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(fft_len)
        .collect();
    planner.plan_fft_forward(fft_len).process(&mut spectrum);
    spectrum
}

/// Scale to unit peak magnitude, then zero bins under `threshold_ratio`
fn normalize_and_threshold(spectrum: &mut [Complex<f64>], threshold_ratio: f64) {
    let peak = spectrum.iter().map(|c| c.norm()).fold(0.0f64, f64::max);
    if peak <= 0.0 {
        return;
    }
    for c in spectrum.iter_mut() {
        *c /= peak;
        if c.norm() < threshold_ratio {
            *c = Complex::new(0.0, 0.0);
        }
    }
}

/// Estimate the response that turns `reference` into `recorded`
///
/// # Arguments
///
/// * `reference` - Sweep recorded without the medium
/// * `recorded` - Same sweep recorded through the medium (same rate and length)
/// * `settings` - Derivation settings
///
/// # Returns
///
/// Impulse response at `settings.target_rate`
///
/// # Errors
///
/// `SampleRateMismatch` / `LengthMismatch` if the sweeps are not aligned,
/// `InvalidConfig` for an empty sweep or a target rate above the sweep rate
pub fn derive_impulse_response(
    reference: &SampleBuffer,
    recorded: &SampleBuffer,
    settings: &IrDerivationSettings,
) -> Result<SampleBuffer> {
    if reference.sample_rate != recorded.sample_rate {
        return Err(SynthesisError::SampleRateMismatch {
            expected: reference.sample_rate,
            actual: recorded.sample_rate,
            context: "recorded sweep".to_string(),
        });
    }
    if reference.len() != recorded.len() {
        return Err(SynthesisError::LengthMismatch {
            left: reference.len(),
            right: recorded.len(),
        });
    }
    if reference.is_empty() {
        return Err(SynthesisError::InvalidConfig("empty sweep".to_string()));
    }
    if settings.target_rate == 0 || settings.target_rate > reference.sample_rate {
        return Err(SynthesisError::InvalidConfig(format!(
            "target rate {} Hz must be in (0, {}] Hz",
            settings.target_rate, reference.sample_rate
        )));
    }

    let source_rate = reference.sample_rate as f64;
    let fft_len = reference.len().next_power_of_two().max(2);
    let window = tukey_window(reference.len(), settings.tukey_alpha);
    let mut planner = FftPlanner::<f64>::new();

    let mut x = windowed_spectrum(&reference.samples, &window, fft_len, &mut planner);
    let mut y = windowed_spectrum(&recorded.samples, &window, fft_len, &mut planner);
    normalize_and_threshold(&mut x, settings.threshold_ratio);
    normalize_and_threshold(&mut y, settings.threshold_ratio);

    // Bins 0..=half span DC to the target Nyquist
    let bin_hz = source_rate / fft_len as f64;
    let half = ((settings.target_rate as f64 / 2.0) / bin_hz).floor() as usize;
    let half = half.clamp(1, fft_len / 2);

    let mut response: Vec<Complex<f64>> = (0..=half)
        .map(|k| y[k] * x[k].conj() / (x[k].norm_sqr() + settings.regularization))
        .collect();

    let suppressed = ((settings.low_frequency_hz / bin_hz).ceil() as usize).min(response.len());
    match settings.low_frequency_policy {
        LowFrequencyPolicy::AbsoluteGain(gain) => {
            for bin in &mut response[..suppressed] {
                *bin = Complex::new(gain, 0.0);
            }
        }
        LowFrequencyPolicy::ScaleMagnitude(gain) => {
            for bin in &mut response[..suppressed] {
                *bin *= gain;
            }
        }
        LowFrequencyPolicy::Disabled => {}
    }

    // Hermitian spectrum at the target rate
    let out_len = 2 * half;
    let mut full = vec![Complex::new(0.0, 0.0); out_len];
    full[0] = Complex::new(response[0].re, 0.0);
    full[half] = Complex::new(response[half].re, 0.0);
    for k in 1..half {
        full[k] = response[k];
        full[out_len - k] = response[k].conj();
    }
    planner.plan_fft_inverse(out_len).process(&mut full);

    let scale = 1.0 / out_len as f64;
    let mut taps: Vec<f32> = full.iter().map(|c| (c.re * scale) as f32).collect();

    // The kept bins land on 2·half·bin_hz, just under the target rate
    let effective_rate = out_len as f64 * bin_hz;
    let target_rate = settings.target_rate as f64;
    if (effective_rate - target_rate).abs() > 1e-6 * target_rate {
        log::debug!(
            "Resampling derived taps from {:.3} Hz to {} Hz",
            effective_rate,
            settings.target_rate
        );
        taps = resample_by_ratio(&taps, target_rate / effective_rate)?;
    }
    if let Some(keep) = settings.truncate_to {
        taps.truncate(keep);
    }

    log::debug!(
        "Derived IR: {} taps at {} Hz ({} bins kept, {} suppressed, {:?})",
        taps.len(),
        settings.target_rate,
        half + 1,
        suppressed,
        settings.low_frequency_policy
    );
    Ok(SampleBuffer::new(taps, settings.target_rate))
}

/// Derive one response per recording in `input_dir` and write them to
/// `output_dir` as float WAV (same stem, `.wav` extension)
///
/// Each recording is time-aligned against the reference and cut to its
/// length unless `settings.alignment` is `None`. The reference file itself
/// is skipped if it lives in `input_dir`.
///
/// # Returns
///
/// Paths of the written responses, in file-name order
pub fn derive_repository(
    reference_path: &Path,
    input_dir: &Path,
    output_dir: &Path,
    settings: &IrDerivationSettings,
) -> Result<Vec<PathBuf>> {
    let reference = decode_audio(reference_path)?;
    let manifest = AssetManifest::scan(input_dir, AUDIO_EXTENSIONS)?;
    fs::create_dir_all(output_dir)?;

    let reference_name = reference_path.file_name().and_then(|n| n.to_str());
    let mut written = Vec::new();
    for name in manifest.entries() {
        if Some(name.as_str()) == reference_name {
            continue;
        }
        let recorded = decode_audio(&manifest.path_of(name))?;
        let recorded = match &settings.alignment {
            Some(alignment) => {
                let aligned = align_recording(&reference, &recorded, alignment)?;
                log::info!("Aligned {} (lag {} samples)", name, aligned.lag);
                aligned.buffer
            }
            None => recorded,
        };
        let ir = derive_impulse_response(&reference, &recorded, settings)?;

        let stem = Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name.as_str());
        let path = output_dir.join(format!("{}.wav", stem));
        write_wav_float(&path, &ir)?;
        log::info!("Derived impulse response {}", path.display());
        written.push(path);
    }
    Ok(written)
}
