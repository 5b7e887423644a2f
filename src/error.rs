//! Error types for the synthesis pipeline

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while synthesizing or regenerating samples
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// Input sample rate does not match a fixed-rate repository or stage
    #[error("Sample rate mismatch: expected {expected} Hz, got {actual} Hz ({context})")]
    SampleRateMismatch {
        /// Rate the stage or repository is built on
        expected: u32,
        /// Rate that was supplied
        actual: u32,
        /// Where the mismatch was detected
        context: String,
    },

    /// Two buffers that must be blended have different lengths
    #[error("Buffer length mismatch: {left} vs {right}")]
    LengthMismatch {
        /// Length of the first buffer
        left: usize,
        /// Length of the second buffer
        right: usize,
    },

    /// Invalid configuration value (unknown mode, inverted range, ...)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Asset directory contains no file with a recognized extension
    #[error("No usable assets in {}", .0.display())]
    EmptyRepository(PathBuf),

    /// Asset referenced by a parameter log entry does not exist
    #[error("Missing asset: {}", .0.display())]
    MissingAsset(PathBuf),

    /// Audio decoding error
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// Lossy codec round-trip failed
    #[error("Codec error: {0}")]
    Codec(String),

    /// Codec round-trip did not finish within the configured timeout
    #[error("Codec '{codec}' timed out after {timeout_ms} ms")]
    CodecTimeout {
        /// Codec name
        codec: String,
        /// Timeout that elapsed
        timeout_ms: u128,
    },

    /// Sample-rate conversion failed
    #[error("Resampling error: {0}")]
    Resample(String),

    /// Time-stretch or pitch-shift collaborator failed
    #[error("Time scaling error: {0}")]
    TimeScale(String),

    /// Parameter log (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// WAV read/write error
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SynthesisError {
    /// Whether this error concerns a single asset and can be recovered from by
    /// skipping the sample that referenced it
    pub fn is_asset_error(&self) -> bool {
        matches!(
            self,
            SynthesisError::MissingAsset(_) | SynthesisError::Decoding(_)
        )
    }
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, SynthesisError>;
