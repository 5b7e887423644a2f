//! 16-bit PCM quantization round-trip

use crate::codec::Codec;
use crate::error::Result;
use crate::io::sample_buffer::SampleBuffer;

/// Quantizes to 16-bit integers and back
///
/// Matches what a WAV write/read cycle does to a float buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pcm16Codec;

impl Codec for Pcm16Codec {
    fn name(&self) -> &str {
        "pcm16"
    }

    fn round_trip(&self, buffer: &SampleBuffer) -> Result<SampleBuffer> {
        let samples = buffer
            .samples
            .iter()
            .map(|&x| {
                let q = (x.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
                q as f32 / i16::MAX as f32
            })
            .collect();
        Ok(buffer.with_samples(samples))
    }
}
