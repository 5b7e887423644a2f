//! Impulse-response convolution stages
//!
//! - **repository**: fixed-rate IR directories and named responses
//! - **engine**: IR selection (random, mixed, replayed) and convolution
//! - **alignment**: delay-compensated resizing back to the input length
//! - **ir_design**: deriving responses from sine-sweep recordings
//! - **sweep_alignment**: shifting sweep recordings onto the reference timeline

pub mod alignment;
pub mod engine;
pub mod ir_design;
pub mod repository;
pub mod sweep_alignment;

pub use alignment::{align, ConvolutionKind};
pub use engine::{ConvolutionEngine, ConvolutionMode, ConvolutionRecord, Convolved, IrSelection};
pub use ir_design::{derive_impulse_response, IrDerivationSettings, LowFrequencyPolicy};
pub use repository::{ImpulseResponse, IrRepository};
pub use sweep_alignment::{align_recording, AlignedRecording, SweepAlignmentSettings};
