//! Opus round-trip through libopus

use audiopus::coder::{Decoder, Encoder};
use audiopus::{Application, Bitrate, Channels, SampleRate};

use crate::codec::Codec;
use crate::error::{Result, SynthesisError};
use crate::io::resample::resample;
use crate::io::sample_buffer::SampleBuffer;

/// Largest packet libopus will produce for one frame
const MAX_PACKET: usize = 4000;

/// Opus voice round-trip at 16 kHz, 20 ms frames
#[derive(Debug, Clone)]
pub struct OpusCodec {
    bitrate: i32,
}

impl Default for OpusCodec {
    fn default() -> Self {
        Self::new(24_000)
    }
}

impl OpusCodec {
    /// Codec encoding at `bitrate` bits per second
    pub fn new(bitrate: i32) -> Self {
        Self { bitrate }
    }
}

fn opus_err(stage: &str, e: audiopus::Error) -> SynthesisError {
    SynthesisError::Codec(format!("opus {} failed: {:?}", stage, e))
}

impl Codec for OpusCodec {
    fn name(&self) -> &str {
        "opus"
    }

    fn round_trip(&self, buffer: &SampleBuffer) -> Result<SampleBuffer> {
        const RATE: u32 = 16000;
        const FRAME: usize = 320;

        let input = if buffer.sample_rate == RATE {
            buffer.clone()
        } else {
            resample(buffer, RATE)?
        };

        let mut encoder = Encoder::new(SampleRate::Hz16000, Channels::Mono, Application::Voip)
            .map_err(|e| opus_err("encoder init", e))?;
        encoder
            .set_bitrate(Bitrate::BitsPerSecond(self.bitrate))
            .map_err(|e| opus_err("set bitrate", e))?;
        let mut decoder =
            Decoder::new(SampleRate::Hz16000, Channels::Mono).map_err(|e| opus_err("decoder init", e))?;

        let pcm: Vec<i16> = input
            .samples
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .collect();

        let mut decoded = Vec::with_capacity(pcm.len() + FRAME);
        let mut packet = vec![0u8; MAX_PACKET];
        let mut frame_out = vec![0i16; FRAME];

        for chunk in pcm.chunks(FRAME) {
            // Last frame is zero-padded to a full 20 ms
            let mut frame = [0i16; FRAME];
            frame[..chunk.len()].copy_from_slice(chunk);

            let len = encoder
                .encode(&frame, &mut packet)
                .map_err(|e| opus_err("encode", e))?;
            let written = decoder
                .decode(Some(&packet[..len]), &mut frame_out[..], false)
                .map_err(|e| opus_err("decode", e))?;
            decoded.extend(frame_out[..written].iter().map(|&s| s as f32 / i16::MAX as f32));
        }
        decoded.resize(input.len(), 0.0);

        log::debug!(
            "Opus round-trip: {} samples at {} bit/s",
            input.len(),
            self.bitrate
        );

        let out = SampleBuffer::new(decoded, RATE);
        if buffer.sample_rate == RATE {
            Ok(out)
        } else {
            let mut back = resample(&out, buffer.sample_rate)?;
            back.samples.resize(buffer.len(), 0.0);
            Ok(back)
        }
    }
}
