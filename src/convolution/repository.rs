//! Fixed-rate impulse-response repositories

use std::path::Path;

use rand::Rng;

use crate::dsp::normalization::peak_index;
use crate::error::{Result, SynthesisError};
use crate::io::manifest::{AssetManifest, IR_EXTENSIONS};
use crate::io::sample_buffer::SampleBuffer;
use crate::io::wav::read_wav;

/// A named impulse response
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseResponse {
    /// File name within its repository, or a synthetic label for mixes
    pub name: String,
    /// Response samples
    pub buffer: SampleBuffer,
}

impl ImpulseResponse {
    /// Wrap a buffer as a named response
    pub fn new(name: impl Into<String>, buffer: SampleBuffer) -> Self {
        Self {
            name: name.into(),
            buffer,
        }
    }

    /// Index of the largest absolute value (first on ties): the propagation
    /// delay baked into the response
    pub fn peak_index(&self) -> usize {
        peak_index(&self.buffer.samples)
    }

    /// Number of taps
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the response has no taps
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Flat directory of impulse responses recorded at one sample rate
#[derive(Debug, Clone)]
pub struct IrRepository {
    manifest: AssetManifest,
    sample_rate: u32,
}

impl IrRepository {
    /// Index the IR files under `root`
    ///
    /// # Errors
    ///
    /// `MissingAsset` if `root` is not a directory, `EmptyRepository` if it
    /// holds no IR file
    pub fn open(root: &Path, sample_rate: u32) -> Result<Self> {
        let manifest = AssetManifest::scan(root, IR_EXTENSIONS)?;
        log::debug!(
            "IR repository {}: {} responses at {} Hz",
            root.display(),
            manifest.len(),
            sample_rate
        );
        Ok(Self {
            manifest,
            sample_rate,
        })
    }

    /// Rate every response in the repository is recorded at
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Repository directory
    pub fn root(&self) -> &Path {
        self.manifest.root()
    }

    /// Indexed file names
    pub fn names(&self) -> &[String] {
        self.manifest.entries()
    }

    /// Draw one file name uniformly
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        self.manifest.choose(rng).to_string()
    }

    /// Load one response by file name
    ///
    /// # Errors
    ///
    /// `MissingAsset` if the file is gone, `SampleRateMismatch` if it was not
    /// recorded at the repository rate
    pub fn load(&self, name: &str) -> Result<ImpulseResponse> {
        let path = self.manifest.path_of(name);
        let buffer = read_wav(&path)?;
        if buffer.sample_rate != self.sample_rate {
            return Err(SynthesisError::SampleRateMismatch {
                expected: self.sample_rate,
                actual: buffer.sample_rate,
                context: format!("impulse response {}", path.display()),
            });
        }
        Ok(ImpulseResponse::new(name, buffer))
    }

    /// Arithmetic mean of the named responses, zero-padded to the longest
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for an empty list, plus any [`IrRepository::load`] error
    pub fn load_mean(&self, names: &[String]) -> Result<ImpulseResponse> {
        if names.is_empty() {
            return Err(SynthesisError::InvalidConfig(
                "an IR mix needs at least one response".to_string(),
            ));
        }

        let responses = names
            .iter()
            .map(|name| self.load(name))
            .collect::<Result<Vec<_>>>()?;
        let len = responses.iter().map(|ir| ir.len()).max().unwrap_or(0);

        let mut sum = vec![0.0f64; len];
        for ir in &responses {
            for (acc, &x) in sum.iter_mut().zip(ir.buffer.samples.iter()) {
                *acc += x as f64;
            }
        }
        let count = responses.len() as f64;
        let samples = sum.into_iter().map(|x| (x / count) as f32).collect();

        Ok(ImpulseResponse::new(
            format!("mean of {}", names.join(", ")),
            SampleBuffer::new(samples, self.sample_rate),
        ))
    }
}
