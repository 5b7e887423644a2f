//! # Farfield Synth
//!
//! A deterministic, replayable pipeline that turns clean speech into
//! far-field, noisy, band-limited recordings for training noise-robust
//! speech models.
//!
//! ## Features
//!
//! - **Effects**: echo, tempo, pitch and low-pass with drawn-then-rendered parameters
//! - **Convolution**: room, fabric and mobile impulse responses, single or mixed,
//!   aligned back to the input length
//! - **Noise**: stationary and non-stationary stacks drawn from noise repositories
//! - **Channel**: fabric + mobile + lossy codec, or a telephone band-pass
//! - **Replay**: every draw is logged; a batch log regenerates the batch
//!
//! ## Quick Start
//!
//! ```no_run
//! use farfield_synth::{BatchLog, Pipeline, SynthesisConfig};
//!
//! let config = SynthesisConfig {
//!     seed: 1234,
//!     ..SynthesisConfig::default()
//! };
//! let pipeline = Pipeline::new(config)?;
//!
//! // Draw and write 10 samples
//! let report = pipeline.generate(10)?;
//!
//! // Later: rebuild them from the log alone
//! let log = BatchLog::load(&report.log_path)?;
//! let regenerated = pipeline.regenerate(&log)?;
//! println!("{} regenerated, {} skipped", regenerated.regenerated.len(), regenerated.skipped.len());
//! # Ok::<(), farfield_synth::SynthesisError>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! speech → effects → room IR → ┬→ + stationary noise ─┐
//!                              └→ + non-stationary ───┴→ mix → fabric IR → mobile IR → codec
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod config;
pub mod convolution;
pub mod dsp;
pub mod effects;
pub mod error;
pub mod io;
pub mod noise;
pub mod pipeline;

// Re-export main types
pub use codec::{Codec, Pcm16Codec};
pub use config::{ChannelModel, CodecKind, SynthesisConfig};
pub use convolution::{ConvolutionEngine, ConvolutionKind, IrSelection};
pub use effects::{EffectEngine, EffectParameters, TimeScaler};
pub use error::{Result, SynthesisError};
pub use io::sample_buffer::SampleBuffer;
pub use noise::{NoiseBuilder, NoiseSourceLog};
pub use pipeline::{BatchLog, ParameterLogEntry, Pipeline, StageRecord};
