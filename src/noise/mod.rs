//! Background-noise synthesis
//!
//! - **sizer**: fit a noise draw to the reference length
//! - **stacker**: mix two buffers at a power ratio
//! - **builder**: draw, render, size and stack `k` noise sources

pub mod builder;
pub mod sizer;
pub mod stacker;

pub use builder::{NoiseBuilder, NoiseSourceLog, NOISE_FLOOR};
pub use sizer::{size_noise, NoiseSizing, Stationarity};
pub use stacker::{mix_scale, stack};
