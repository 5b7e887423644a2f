//! Audio decoding using Symphonia
//!
//! Decodes any container/codec Symphonia supports, downmixes to mono and
//! resamples to the requested pipeline rate.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

use crate::error::{Result, SynthesisError};
use crate::io::resample::resample;
use crate::io::sample_buffer::SampleBuffer;

/// Average all channels of one decoded frame into a mono sample
macro_rules! downmix {
    ($buf:expr, $channels:expr, $convert:expr) => {{
        let buf = $buf;
        let channels = $channels;
        (0..buf.frames())
            .map(|i| {
                (0..channels)
                    .map(|ch| $convert(buf.chan(ch)[i]))
                    .sum::<f32>()
                    / channels as f32
            })
            .collect::<Vec<f32>>()
    }};
}

/// Decode audio file to mono PCM samples at the file's native rate
///
/// # Arguments
///
/// * `path` - Path to audio file
///
/// # Returns
///
/// Mono `SampleBuffer` at the native sample rate
///
/// # Errors
///
/// `MissingAsset` if the file does not exist, `Decoding` if Symphonia cannot
/// probe or decode it
pub fn decode_audio(path: &Path) -> Result<SampleBuffer> {
    if !path.is_file() {
        return Err(SynthesisError::MissingAsset(path.to_path_buf()));
    }

    log::debug!("Decoding audio file: {}", path.display());

    let src = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SynthesisError::Decoding(format!("{}: {}", path.display(), e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| {
            SynthesisError::Decoding(format!("{}: no supported audio track", path.display()))
        })?;

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.ok_or_else(|| {
        SynthesisError::Decoding(format!("{}: unknown sample rate", path.display()))
    })?;
    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SynthesisError::Decoding(format!("{}: {}", path.display(), e)))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(SynthesisError::Decoding(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let channels = decoded.spec().channels.count().max(1);
                let mono = match decoded {
                    AudioBufferRef::F32(buf) => downmix!(buf, channels, |s: f32| s),
                    AudioBufferRef::F64(buf) => downmix!(buf, channels, |s: f64| s as f32),
                    AudioBufferRef::S16(buf) => {
                        downmix!(buf, channels, |s: i16| s as f32 / 32768.0)
                    }
                    AudioBufferRef::S24(buf) => downmix!(
                        buf,
                        channels,
                        |s: symphonia::core::sample::i24| s.inner() as f32 / 8388608.0
                    ),
                    AudioBufferRef::S32(buf) => {
                        downmix!(buf, channels, |s: i32| s as f32 / 2147483648.0)
                    }
                    AudioBufferRef::U8(buf) => {
                        downmix!(buf, channels, |s: u8| (s as f32 - 128.0) / 128.0)
                    }
                    _ => {
                        return Err(SynthesisError::Decoding(format!(
                            "{}: unsupported sample format",
                            path.display()
                        )))
                    }
                };
                samples.extend_from_slice(&mono);
            }
            // Corrupted packets are skipped
            Err(SymphoniaError::DecodeError(msg)) => {
                log::warn!("Skipping undecodable packet in {}: {}", path.display(), msg);
                continue;
            }
            Err(e) => {
                return Err(SynthesisError::Decoding(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            }
        }
    }

    log::debug!(
        "Decoded {}: {} samples at {} Hz",
        path.display(),
        samples.len(),
        sample_rate
    );

    Ok(SampleBuffer::new(samples, sample_rate))
}

/// Decode an audio file and resample it to `target_rate`
///
/// The loader contract of the pipeline: every speech and noise asset enters
/// the pipeline mono and at the pipeline rate.
pub fn load_audio(path: &Path, target_rate: u32) -> Result<SampleBuffer> {
    let decoded = decode_audio(path)?;
    if decoded.sample_rate == target_rate {
        return Ok(decoded);
    }
    log::debug!(
        "Resampling {} from {} Hz to {} Hz",
        path.display(),
        decoded.sample_rate,
        target_rate
    );
    resample(&decoded, target_rate)
}
