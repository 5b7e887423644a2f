//! Fitting a noise buffer to a reference length
//!
//! Stationary noise is looped (or truncated) so it covers the whole
//! reference. Non-stationary noise is delayed by a leading zero pad, then
//! zero-padded or truncated at the tail.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::io::sample_buffer::SampleBuffer;

/// Whether a noise source is present throughout or appears at an offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stationarity {
    /// Continuous background noise
    Stationary,
    /// Noise event starting at a random offset
    NonStationary,
}

/// Concrete sizing of one noise draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseSizing {
    /// Loop or truncate
    Stationary,
    /// Delay by `pad_size` zeros, then fit the tail
    NonStationary {
        /// Leading zeros
        pad_size: usize,
    },
}

impl NoiseSizing {
    /// Draw a sizing; non-stationary pads are uniform in `[0, reference_len)`
    pub fn draw<R: Rng + ?Sized>(stationarity: Stationarity, reference_len: usize, rng: &mut R) -> Self {
        match stationarity {
            Stationarity::Stationary => NoiseSizing::Stationary,
            Stationarity::NonStationary => NoiseSizing::NonStationary {
                pad_size: if reference_len == 0 {
                    0
                } else {
                    rng.random_range(0..reference_len)
                },
            },
        }
    }

    /// Sizing that replays a logged pad (`None` means stationary)
    pub fn from_pad(pad_size: Option<usize>) -> Self {
        match pad_size {
            Some(pad_size) => NoiseSizing::NonStationary { pad_size },
            None => NoiseSizing::Stationary,
        }
    }

    /// Pad to record in the log
    pub fn pad_size(self) -> Option<usize> {
        match self {
            NoiseSizing::Stationary => None,
            NoiseSizing::NonStationary { pad_size } => Some(pad_size),
        }
    }
}

/// Resize `noise` to exactly `reference_len` samples
///
/// # Returns
///
/// `(resized, pad_size_used)`; the pad is `None` for stationary sizing
pub fn size_noise(reference_len: usize, noise: &SampleBuffer, sizing: NoiseSizing) -> (SampleBuffer, Option<usize>) {
    let samples: Vec<f32> = match sizing {
        NoiseSizing::Stationary => {
            if noise.is_empty() {
                log::warn!("Empty stationary noise; substituting silence");
                vec![0.0; reference_len]
            } else {
                noise.samples.iter().copied().cycle().take(reference_len).collect()
            }
        }
        NoiseSizing::NonStationary { pad_size } => {
            let mut padded: Vec<f32> = std::iter::repeat(0.0f32)
                .take(pad_size)
                .chain(noise.samples.iter().copied())
                .take(reference_len)
                .collect();
            padded.resize(reference_len, 0.0);
            padded
        }
    };
    (noise.with_samples(samples), sizing.pad_size())
}
