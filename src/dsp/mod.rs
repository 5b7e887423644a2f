//! Signal-processing primitives shared by the pipeline stages
//!
//! - **butterworth**: cascaded-biquad Butterworth low/high/band-pass filters
//! - **convolve**: full linear convolution (direct or FFT)
//! - **normalization**: peak normalization and power measurement

pub mod butterworth;
pub mod convolve;
pub mod normalization;
