//! IR selection and convolution
//!
//! Like the effect engine, convolution is split into a draw step that turns an
//! [`IrSelection`] into a [`ConvolutionRecord`] (the concrete file names) and
//! a deterministic render step that convolves with the recorded responses.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::convolution::alignment::{align, ConvolutionKind};
use crate::convolution::repository::{ImpulseResponse, IrRepository};
use crate::dsp::convolve::convolve_full;
use crate::dsp::normalization::peak_normalize;
use crate::error::{Result, SynthesisError};
use crate::io::sample_buffer::SampleBuffer;

/// How the impulse response of one convolution is chosen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IrSelection {
    /// One response drawn uniformly
    RandomSingle,
    /// Mean of `count` responses drawn with replacement
    RandomMix {
        /// Number of draws
        count: usize,
    },
    /// One named response
    Specific {
        /// File name in the repository
        name: String,
    },
    /// Mean of the named responses
    SpecificMix {
        /// File names in the repository
        names: Vec<String>,
    },
}

/// Selection mode as recorded in the parameter log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvolutionMode {
    /// One response drawn uniformly
    RandomSingle,
    /// Mean of several drawn responses
    RandomMix,
    /// One named response
    Specific,
    /// Mean of named responses
    SpecificMix,
}

impl ConvolutionMode {
    /// Whether the responses are averaged
    pub fn is_mix(self) -> bool {
        matches!(self, ConvolutionMode::RandomMix | ConvolutionMode::SpecificMix)
    }
}

/// Concrete responses used by one convolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvolutionRecord {
    /// Mode the responses were chosen with
    pub mode: ConvolutionMode,
    /// File names, in draw order
    pub irs_used: Vec<String>,
}

impl ConvolutionRecord {
    /// Selection that replays exactly these responses
    pub fn replay_selection(&self) -> IrSelection {
        if self.mode.is_mix() {
            IrSelection::SpecificMix {
                names: self.irs_used.clone(),
            }
        } else {
            IrSelection::Specific {
                name: self.irs_used.first().cloned().unwrap_or_default(),
            }
        }
    }

    /// Same responses under the matching `Specific` / `SpecificMix` mode
    pub fn as_replay(&self) -> Self {
        let mode = if self.mode.is_mix() {
            ConvolutionMode::SpecificMix
        } else {
            ConvolutionMode::Specific
        };
        Self {
            mode,
            irs_used: self.irs_used.clone(),
        }
    }
}

/// Result of a convolution, before alignment
#[derive(Debug, Clone)]
pub struct Convolved {
    /// Peak-normalized full convolution (`len + ir_len - 1` samples)
    pub buffer: SampleBuffer,
    /// Input length before convolution
    pub size_orig: usize,
    /// Response that was applied
    pub ir: ImpulseResponse,
}

/// Convolution stage bound to one repository and one kind
#[derive(Debug, Clone)]
pub struct ConvolutionEngine {
    repository: IrRepository,
    kind: ConvolutionKind,
}

impl ConvolutionEngine {
    /// Engine drawing from `repository`, aligned as `kind`
    pub fn new(repository: IrRepository, kind: ConvolutionKind) -> Self {
        Self { repository, kind }
    }

    /// What this stage simulates
    pub fn kind(&self) -> ConvolutionKind {
        self.kind
    }

    /// Backing repository
    pub fn repository(&self) -> &IrRepository {
        &self.repository
    }

    /// Resolve a selection into concrete file names
    ///
    /// Random modes consume `rng`; specific modes do not.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a mix of zero responses
    pub fn draw<R: Rng + ?Sized>(&self, selection: &IrSelection, rng: &mut R) -> Result<ConvolutionRecord> {
        let record = match selection {
            IrSelection::RandomSingle => ConvolutionRecord {
                mode: ConvolutionMode::RandomSingle,
                irs_used: vec![self.repository.choose(rng)],
            },
            IrSelection::RandomMix { count } => {
                if *count == 0 {
                    return Err(SynthesisError::InvalidConfig(format!(
                        "{} IR mix needs at least one response",
                        self.kind
                    )));
                }
                ConvolutionRecord {
                    mode: ConvolutionMode::RandomMix,
                    irs_used: (0..*count).map(|_| self.repository.choose(rng)).collect(),
                }
            }
            IrSelection::Specific { name } => ConvolutionRecord {
                mode: ConvolutionMode::Specific,
                irs_used: vec![name.clone()],
            },
            IrSelection::SpecificMix { names } => ConvolutionRecord {
                mode: ConvolutionMode::SpecificMix,
                irs_used: names.clone(),
            },
        };
        Ok(record)
    }

    /// Load the recorded responses and convolve `buffer` with them
    ///
    /// # Errors
    ///
    /// `SampleRateMismatch` if the buffer or a response is not at the
    /// repository rate, `MissingAsset` if a recorded response is gone
    pub fn render(&self, buffer: &SampleBuffer, record: &ConvolutionRecord) -> Result<Convolved> {
        if buffer.sample_rate != self.repository.sample_rate() {
            return Err(SynthesisError::SampleRateMismatch {
                expected: self.repository.sample_rate(),
                actual: buffer.sample_rate,
                context: format!("{} convolution input", self.kind),
            });
        }

        let ir = if record.mode.is_mix() {
            self.repository.load_mean(&record.irs_used)?
        } else {
            match record.irs_used.as_slice() {
                [name] => self.repository.load(name)?,
                other => {
                    return Err(SynthesisError::InvalidConfig(format!(
                        "single {} convolution recorded {} responses",
                        self.kind,
                        other.len()
                    )))
                }
            }
        };

        let convolved = peak_normalize(&convolve_full(&buffer.samples, &ir.buffer.samples));
        log::debug!(
            "{} convolution with {}: {} -> {} samples",
            self.kind,
            ir.name,
            buffer.len(),
            convolved.len()
        );

        Ok(Convolved {
            buffer: buffer.with_samples(convolved),
            size_orig: buffer.len(),
            ir,
        })
    }

    /// Draw and render
    pub fn convolve<R: Rng + ?Sized>(
        &self,
        buffer: &SampleBuffer,
        selection: &IrSelection,
        rng: &mut R,
    ) -> Result<(Convolved, ConvolutionRecord)> {
        let record = self.draw(selection, rng)?;
        let convolved = self.render(buffer, &record)?;
        Ok((convolved, record))
    }

    /// Render a record and align the result back to the input length
    pub fn render_aligned(&self, buffer: &SampleBuffer, record: &ConvolutionRecord) -> Result<SampleBuffer> {
        let convolved = self.render(buffer, record)?;
        Ok(align(
            &convolved.buffer,
            convolved.size_orig,
            self.kind,
            &convolved.ir,
        ))
    }

    /// Draw, render and align
    pub fn convolve_aligned<R: Rng + ?Sized>(
        &self,
        buffer: &SampleBuffer,
        selection: &IrSelection,
        rng: &mut R,
    ) -> Result<(SampleBuffer, ConvolutionRecord)> {
        let record = self.draw(selection, rng)?;
        let aligned = self.render_aligned(buffer, &record)?;
        Ok((aligned, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::wav::write_wav_float;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::path::Path;

    fn write_ir(dir: &Path, name: &str, len: usize, peak: usize) {
        let mut taps: Vec<f32> = (0..len).map(|i| 0.1 * (-(i as f32) / 80.0).exp()).collect();
        taps[peak] = 1.0;
        write_wav_float(&dir.join(name), &SampleBuffer::new(taps, 16000)).unwrap();
    }

    fn speech_like(len: usize) -> SampleBuffer {
        SampleBuffer::new(
            (0..len)
                .map(|i| (i as f32 * 0.05).sin() * (i as f32 * 0.0013).cos())
                .collect(),
            16000,
        )
    }

    fn room_engine(dir: &Path) -> ConvolutionEngine {
        let repo = IrRepository::open(dir, 16000).unwrap();
        ConvolutionEngine::new(repo, ConvolutionKind::Room)
    }

    #[test]
    fn test_room_convolution_lengths() {
        let dir = tempfile::tempdir().unwrap();
        write_ir(dir.path(), "room_1.wav", 400, 50);
        let engine = room_engine(dir.path());
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let input = speech_like(16000);
        let (convolved, record) = engine
            .convolve(&input, &IrSelection::RandomSingle, &mut rng)
            .unwrap();
        assert_eq!(convolved.buffer.len(), 16399);
        assert_eq!(convolved.size_orig, 16000);
        assert_eq!(convolved.ir.peak_index(), 50);
        assert!((convolved.buffer.peak() - 1.0).abs() < 1e-6);
        assert_eq!(record.mode, ConvolutionMode::RandomSingle);
        assert_eq!(record.irs_used, vec!["room_1.wav".to_string()]);

        let aligned = align(
            &convolved.buffer,
            convolved.size_orig,
            engine.kind(),
            &convolved.ir,
        );
        assert_eq!(aligned.len(), 16000);
        assert_eq!(&aligned.samples[..], &convolved.buffer.samples[50..16050]);
    }

    #[test]
    fn test_rate_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_ir(dir.path(), "room_1.wav", 64, 3);
        let engine = room_engine(dir.path());
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let input = SampleBuffer::silence(1000, 44100);
        let result = engine.convolve(&input, &IrSelection::RandomSingle, &mut rng);
        assert!(matches!(
            result,
            Err(SynthesisError::SampleRateMismatch {
                expected: 16000,
                actual: 44100,
                ..
            })
        ));
    }

    #[test]
    fn test_replay_matches_random_mix() {
        let dir = tempfile::tempdir().unwrap();
        for (i, peak) in [5usize, 9, 13, 2].iter().enumerate() {
            write_ir(dir.path(), &format!("mobile_{}.wav", i), 100 + i * 30, *peak);
        }
        let repo = IrRepository::open(dir.path(), 16000).unwrap();
        let engine = ConvolutionEngine::new(repo, ConvolutionKind::Mobile);
        let input = speech_like(3000);

        let mut rng = ChaCha8Rng::seed_from_u64(77);
        let (generated, record) = engine
            .convolve_aligned(&input, &IrSelection::RandomMix { count: 4 }, &mut rng)
            .unwrap();
        assert_eq!(record.irs_used.len(), 4);

        let replay = record.as_replay();
        assert_eq!(replay.mode, ConvolutionMode::SpecificMix);
        let replayed = engine.render_aligned(&input, &replay).unwrap();
        assert_eq!(generated, replayed);

        let by_selection = engine
            .convolve_aligned(&input, &record.replay_selection(), &mut rng)
            .unwrap()
            .0;
        assert_eq!(generated, by_selection);
    }

    #[test]
    fn test_silent_input_is_not_normalized() {
        let dir = tempfile::tempdir().unwrap();
        write_ir(dir.path(), "room_1.wav", 32, 0);
        let engine = room_engine(dir.path());
        let record = ConvolutionRecord {
            mode: ConvolutionMode::Specific,
            irs_used: vec!["room_1.wav".to_string()],
        };
        let out = engine.render(&SampleBuffer::silence(200, 16000), &record).unwrap();
        assert_eq!(out.buffer.len(), 231);
        assert!(out.buffer.samples.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_zero_count_mix_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_ir(dir.path(), "room_1.wav", 32, 0);
        let engine = room_engine(dir.path());
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(engine
            .draw(&IrSelection::RandomMix { count: 0 }, &mut rng)
            .is_err());
    }

    #[test]
    fn test_selection_serialization() {
        let json = serde_json::to_string(&IrSelection::RandomMix { count: 4 }).unwrap();
        assert_eq!(json, r#"{"mode":"random_mix","count":4}"#);
    }
}
