//! Post-convolution sizing
//!
//! Full convolution grows a buffer by `len(ir) - 1` samples. Alignment brings
//! it back to the pre-convolution length. Room and mobile responses carry a
//! propagation delay, so the samples before the IR peak are dropped first.
//! Fabric responses are treated as delay-free and simply truncated.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::convolution::repository::ImpulseResponse;
use crate::error::SynthesisError;
use crate::io::sample_buffer::SampleBuffer;

/// What a convolution stage simulates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvolutionKind {
    /// Room reverberation
    Room,
    /// Sound passing through fabric (pocket, bag)
    Fabric,
    /// Mobile phone microphone
    Mobile,
}

impl ConvolutionKind {
    /// Whether the IR peak is compensated as a propagation delay
    pub fn compensates_delay(self) -> bool {
        matches!(self, ConvolutionKind::Room | ConvolutionKind::Mobile)
    }

    /// Lower-case name
    pub fn as_str(self) -> &'static str {
        match self {
            ConvolutionKind::Room => "room",
            ConvolutionKind::Fabric => "fabric",
            ConvolutionKind::Mobile => "mobile",
        }
    }
}

impl fmt::Display for ConvolutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConvolutionKind {
    type Err = SynthesisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "room" => Ok(ConvolutionKind::Room),
            "fabric" => Ok(ConvolutionKind::Fabric),
            "mobile" => Ok(ConvolutionKind::Mobile),
            other => Err(SynthesisError::InvalidConfig(format!(
                "unknown convolution kind '{}' (expected room, fabric or mobile)",
                other
            ))),
        }
    }
}

/// Restore a convolved buffer to `size_orig` samples
///
/// Room / mobile: drop `ir.peak_index()` leading samples, then truncate or
/// zero-pad the tail. Fabric: keep the first `size_orig` samples, zero-padding
/// if the buffer is shorter.
pub fn align(
    convolved: &SampleBuffer,
    size_orig: usize,
    kind: ConvolutionKind,
    ir: &ImpulseResponse,
) -> SampleBuffer {
    let skip = if kind.compensates_delay() {
        ir.peak_index()
    } else {
        0
    };
    log::debug!(
        "Aligning {} convolution: {} -> {} samples, skipping {}",
        kind,
        convolved.len(),
        size_orig,
        skip
    );

    let mut samples: Vec<f32> = convolved
        .samples
        .iter()
        .skip(skip)
        .take(size_orig)
        .copied()
        .collect();
    samples.resize(size_orig, 0.0);
    convolved.with_samples(samples)
}
