//! Echo synthesis as a fold over (delay, decay) pairs

use crate::effects::engine::EchoParameters;
use crate::error::{Result, SynthesisError};

/// Single delayed, attenuated copy of `samples`
///
/// The copy is shifted right by `floor(delay_seconds * sample_rate)` samples
/// and scaled by `decay`. A delay at or beyond the buffer length yields an
/// all-zero buffer of the same length.
pub fn echo_generator(samples: &[f32], sample_rate: u32, delay_seconds: f32, decay: f32) -> Vec<f32> {
    let delay_samples = (delay_seconds.max(0.0) as f64 * sample_rate as f64).floor() as usize;
    let mut echo = vec![0.0f32; samples.len()];
    if delay_samples < samples.len() {
        for (out, &x) in echo[delay_samples..].iter_mut().zip(samples.iter()) {
            *out = x * decay;
        }
    }
    echo
}

/// Add every echo in `params` to the signal, in order
///
/// Each step echoes the running accumulator (so later echoes also repeat the
/// earlier ones) and returns a new buffer.
///
/// # Errors
///
/// `InvalidConfig` if the delay and decay lists differ in length
pub fn apply_echoes(samples: &[f32], sample_rate: u32, params: &EchoParameters) -> Result<Vec<f32>> {
    if params.delays_seconds.len() != params.decays.len() {
        return Err(SynthesisError::InvalidConfig(format!(
            "echo has {} delays but {} decays",
            params.delays_seconds.len(),
            params.decays.len()
        )));
    }

    let out = params
        .delays_seconds
        .iter()
        .zip(params.decays.iter())
        .fold(samples.to_vec(), |acc, (&delay, &decay)| {
            let echo = echo_generator(&acc, sample_rate, delay, decay);
            acc.iter().zip(echo.iter()).map(|(a, e)| a + e).collect()
        });

    log::debug!(
        "Applied {} echoes at {} Hz",
        params.delays_seconds.len(),
        sample_rate
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_beyond_length_is_silent() {
        let samples = vec![0.5f32; 100];
        // 100 samples at 1 kHz = 0.1 s; delay 0.1 s puts the echo at index 100
        let echo = echo_generator(&samples, 1000, 0.1, 0.2);
        assert_eq!(echo.len(), 100);
        assert!(echo.iter().all(|&x| x == 0.0));

        let echo = echo_generator(&samples, 1000, 5.0, 0.2);
        assert!(echo.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_echo_shift_and_scale() {
        let samples: Vec<f32> = (1..=10).map(|i| i as f32).collect();
        let echo = echo_generator(&samples, 1000, 0.003, 0.5);
        assert_eq!(&echo[..3], &[0.0, 0.0, 0.0]);
        assert_eq!(echo[3], 0.5);
        assert_eq!(echo[9], 3.5);
    }

    #[test]
    fn test_zero_delay_scales_in_place() {
        let echo = echo_generator(&[1.0, -2.0], 16000, 0.0, 0.1);
        assert!((echo[0] - 0.1).abs() < 1e-7);
        assert!((echo[1] + 0.2).abs() < 1e-7);
    }

    #[test]
    fn test_fold_echoes_accumulator() {
        let mut impulse = vec![0.0f32; 10];
        impulse[0] = 1.0;
        let params = EchoParameters {
            delays_seconds: vec![0.002, 0.004],
            decays: vec![0.5, 0.25],
        };
        let out = apply_echoes(&impulse, 1000, &params).unwrap();

        // first step: 1 at 0, 0.5 at 2; second step echoes both by 4
        assert_eq!(out[0], 1.0);
        assert_eq!(out[2], 0.5);
        assert_eq!(out[4], 0.25);
        assert_eq!(out[6], 0.125);
        assert_eq!(out.len(), 10);
    }

    #[test]
    fn test_mismatched_lists_rejected() {
        let params = EchoParameters {
            delays_seconds: vec![0.1, 0.2],
            decays: vec![0.1],
        };
        assert!(apply_echoes(&[0.0; 8], 16000, &params).is_err());
    }
}
