//! WAV reading and writing with hound
//!
//! Pipeline outputs are written as 16-bit PCM. Impulse responses are stored as
//! 32-bit float so that replayed convolutions see the exact same taps.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::{Result, SynthesisError};
use crate::io::sample_buffer::SampleBuffer;

/// Write a mono buffer as 16-bit PCM WAV
///
/// Samples are clamped to [-1.0, 1.0] before quantization.
pub fn write_wav(path: &Path, buffer: &SampleBuffer) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &s in &buffer.samples {
        writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    log::debug!(
        "Wrote {} samples at {} Hz to {}",
        buffer.len(),
        buffer.sample_rate,
        path.display()
    );
    Ok(())
}

/// Write a mono buffer as 32-bit float WAV
pub fn write_wav_float(path: &Path, buffer: &SampleBuffer) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &s in &buffer.samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Read a WAV file into a mono buffer (channels are averaged)
///
/// # Errors
///
/// `MissingAsset` if the file does not exist, `Wav` on malformed data
pub fn read_wav(path: &Path) -> Result<SampleBuffer> {
    if !path.is_file() {
        return Err(SynthesisError::MissingAsset(path.to_path_buf()));
    }

    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / max_value))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let channels = spec.channels.max(1) as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(SampleBuffer::new(samples, spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_wav_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ir.wav");
        let ir = SampleBuffer::new(vec![0.0, 0.125, -1.0, 0.333_333], 16000);
        write_wav_float(&path, &ir).unwrap();

        let read = read_wav(&path).unwrap();
        assert_eq!(read, ir);
    }

    #[test]
    fn test_pcm_wav_clamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loud.wav");
        write_wav(&path, &SampleBuffer::new(vec![2.0, -2.0, 0.5], 16000)).unwrap();

        let read = read_wav(&path).unwrap();
        assert_eq!(read.len(), 3);
        assert!(read.samples[0] <= 1.0 && read.samples[0] > 0.99);
        assert!(read.samples[1] >= -1.0 && read.samples[1] < -0.99);
        assert!((read.samples[2] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_read_missing() {
        let result = read_wav(Path::new("/no/such/ir.wav"));
        assert!(matches!(result, Err(SynthesisError::MissingAsset(_))));
    }
}
