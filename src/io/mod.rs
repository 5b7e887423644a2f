//! Audio I/O modules
//!
//! Decoding with Symphonia, WAV output with hound, asset manifests and
//! load-time resampling.

pub mod decoder;
pub mod manifest;
pub mod resample;
pub mod sample_buffer;
pub mod wav;
