//! Full linear convolution
//!
//! Short kernels use the direct sum; longer ones go through rustfft with the
//! transform length rounded up to a power of two. Both paths return
//! `len(signal) + len(kernel) - 1` samples.
//!
//! # Example
//!
//! ```
//! use farfield_synth::dsp::convolve::convolve_full;
//!
//! let out = convolve_full(&[1.0, 2.0, 3.0], &[0.0, 1.0, 0.5]);
//! assert_eq!(out.len(), 5);
//! assert!((out[1] - 1.0).abs() < 1e-6);
//! assert!((out[4] - 1.5).abs() < 1e-6);
//! ```

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Kernels at or below this length are convolved directly
const DIRECT_KERNEL_LIMIT: usize = 64;

/// Full linear convolution of `signal` with `kernel`
///
/// Returns an empty vector when either input is empty.
pub fn convolve_full(signal: &[f32], kernel: &[f32]) -> Vec<f32> {
    if signal.is_empty() || kernel.is_empty() {
        return Vec::new();
    }

    if kernel.len().min(signal.len()) <= DIRECT_KERNEL_LIMIT {
        convolve_direct(signal, kernel)
    } else {
        convolve_fft(signal, kernel)
    }
}

/// Direct-form convolution, O(N·M)
pub fn convolve_direct(signal: &[f32], kernel: &[f32]) -> Vec<f32> {
    if signal.is_empty() || kernel.is_empty() {
        return Vec::new();
    }
    let out_len = signal.len() + kernel.len() - 1;
    let mut out = vec![0.0f64; out_len];
    for (i, &x) in signal.iter().enumerate() {
        if x == 0.0 {
            continue;
        }
        for (j, &h) in kernel.iter().enumerate() {
            out[i + j] += x as f64 * h as f64;
        }
    }
    out.into_iter().map(|v| v as f32).collect()
}

/// FFT convolution, computed in f64
pub fn convolve_fft(signal: &[f32], kernel: &[f32]) -> Vec<f32> {
    if signal.is_empty() || kernel.is_empty() {
        return Vec::new();
    }
    let out_len = signal.len() + kernel.len() - 1;
    let fft_len = out_len.next_power_of_two();

    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(fft_len);
    let inverse = planner.plan_fft_inverse(fft_len);

    let mut a: Vec<Complex<f64>> = signal
        .iter()
        .map(|&x| Complex::new(x as f64, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(fft_len)
        .collect();
    let mut b: Vec<Complex<f64>> = kernel
        .iter()
        .map(|&x| Complex::new(x as f64, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(fft_len)
        .collect();

    forward.process(&mut a);
    forward.process(&mut b);
    for (x, y) in a.iter_mut().zip(b.iter()) {
        *x *= *y;
    }
    inverse.process(&mut a);

    // rustfft does not normalize the inverse transform
    let scale = 1.0 / fft_len as f64;
    a.iter().take(out_len).map(|c| (c.re * scale) as f32).collect()
}
