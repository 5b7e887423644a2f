//! Effect parameter draws and deterministic rendering
//!
//! An effect call is split in two:
//!
//! 1. [`EffectEngine::draw`] consumes randomness and returns the concrete
//!    [`EffectParameters`] (never the configured ranges)
//! 2. [`EffectEngine::render`] is a pure function of a buffer and those
//!    parameters
//!
//! Generation calls both through [`EffectEngine::apply`]; replay calls
//! `render` with the logged parameters.

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::EffectConfig;
use crate::dsp::butterworth::{FilterPhase, SosFilter};
use crate::effects::echo::apply_echoes;
use crate::effects::time_scale::{OlaTimeScaler, TimeScaler};
use crate::error::Result;
use crate::io::sample_buffer::SampleBuffer;

/// Drawn echo values; both lists are sorted ascending and equally long
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoParameters {
    /// Delay of each echo in seconds
    pub delays_seconds: Vec<f32>,
    /// Gain of each echo
    pub decays: Vec<f32>,
}

/// Drawn low-pass values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LowPassParameters {
    /// Butterworth order
    pub order: usize,
    /// Cutoff in Hz as drawn (clamping happens at design time)
    pub cutoff_hz: u32,
    /// How the filter was run
    pub phase: FilterPhase,
}

/// Everything needed to re-render one effect call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectParameters {
    /// Echo, absent when disabled or when zero echoes were drawn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<EchoParameters>,
    /// Tempo rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo_rate: Option<f32>,
    /// Pitch shift in semitones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch_steps: Option<i32>,
    /// Low-pass filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_pass: Option<LowPassParameters>,
}

impl EffectParameters {
    /// Whether rendering these parameters leaves the buffer untouched
    pub fn is_identity(&self) -> bool {
        self.echo.is_none()
            && self.tempo_rate.is_none()
            && self.pitch_steps.is_none()
            && self.low_pass.is_none()
    }
}

/// Applies echo, tempo, pitch and low-pass effects
#[derive(Clone)]
pub struct EffectEngine {
    time_scaler: Arc<dyn TimeScaler>,
}

impl fmt::Debug for EffectEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectEngine")
            .field("time_scaler", &self.time_scaler.name())
            .finish()
    }
}

impl Default for EffectEngine {
    fn default() -> Self {
        Self::new(Arc::new(OlaTimeScaler::default()))
    }
}

impl EffectEngine {
    /// Engine delegating tempo and pitch to `time_scaler`
    pub fn new(time_scaler: Arc<dyn TimeScaler>) -> Self {
        Self { time_scaler }
    }

    /// Draw concrete parameters for every effect enabled in `config`
    ///
    /// Draw order is fixed (echo count, delays, decays, tempo, pitch, filter
    /// order, cutoff) so one seed always yields the same parameters.
    pub fn draw<R: Rng + ?Sized>(config: &EffectConfig, rng: &mut R) -> EffectParameters {
        let echo = config.echo.as_ref().and_then(|echo| {
            let count = echo.count.draw(rng);
            if count == 0 {
                return None;
            }
            let mut delays_seconds: Vec<f32> = (0..count)
                .map(|i| echo.delay_step_ms.draw(rng) * (i + 1) as f32 / 1000.0)
                .collect();
            delays_seconds.sort_by(f32::total_cmp);
            let mut decays: Vec<f32> = (0..count).map(|_| echo.decay.draw(rng)).collect();
            decays.sort_by(f32::total_cmp);
            Some(EchoParameters {
                delays_seconds,
                decays,
            })
        });

        let tempo_rate = config.tempo_rate.map(|range| range.draw(rng));
        let pitch_steps = config.pitch_steps.map(|range| range.draw(rng));
        let low_pass = config.low_pass.as_ref().map(|lp| LowPassParameters {
            order: lp.order.draw(rng),
            cutoff_hz: lp.cutoff_hz.draw(rng),
            phase: lp.phase,
        });

        EffectParameters {
            echo,
            tempo_rate,
            pitch_steps,
            low_pass,
        }
    }

    /// Render `params` onto a copy of `buffer`
    ///
    /// Effects run in the order echo, tempo, pitch, low-pass. The output
    /// length changes only with tempo.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for malformed echo lists or filter designs,
    /// `TimeScale` if the time-scaling collaborator fails
    pub fn render(&self, buffer: &SampleBuffer, params: &EffectParameters) -> Result<SampleBuffer> {
        let mut out = buffer.clone();

        if let Some(echo) = &params.echo {
            out = out.with_samples(apply_echoes(&out.samples, out.sample_rate, echo)?);
        }

        if let Some(rate) = params.tempo_rate {
            out = self.time_scaler.time_stretch(&out, rate)?;
        }

        if let Some(steps) = params.pitch_steps {
            out = self.time_scaler.pitch_shift(&out, steps)?;
        }

        if let Some(lp) = params.low_pass {
            let filter = SosFilter::lowpass(lp.order, lp.cutoff_hz as f64, out.sample_rate)?;
            out = out.with_samples(filter.apply(&out.samples, lp.phase));
            log::debug!(
                "Low-pass order {} at {} Hz ({:?})",
                lp.order,
                lp.cutoff_hz,
                lp.phase
            );
        }

        Ok(out)
    }

    /// Draw parameters from `config` and render them
    pub fn apply<R: Rng + ?Sized>(
        &self,
        buffer: &SampleBuffer,
        config: &EffectConfig,
        rng: &mut R,
    ) -> Result<(SampleBuffer, EffectParameters)> {
        let params = Self::draw(config, rng);
        let out = self.render(buffer, &params)?;
        Ok((out, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EchoConfig, LowPassConfig, ParamRange};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn all_effects() -> EffectConfig {
        EffectConfig {
            echo: Some(EchoConfig {
                count: ParamRange::new(1, 3),
                ..EchoConfig::default()
            }),
            low_pass: Some(LowPassConfig::speech()),
            ..EffectConfig::clean_speech()
        }
    }

    fn noise_buffer(len: usize) -> SampleBuffer {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        SampleBuffer::new((0..len).map(|_| rng.random_range(-0.5..0.5)).collect(), 16000)
    }

    #[test]
    fn test_draw_returns_values_not_ranges() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let config = EffectConfig {
            echo: Some(EchoConfig {
                count: ParamRange::fixed(3),
                ..EchoConfig::default()
            }),
            ..EffectConfig::stationary_noise()
        };
        let params = EffectEngine::draw(&config, &mut rng);

        let echo = params.echo.expect("three echoes drawn");
        assert_eq!(echo.delays_seconds.len(), 3);
        assert_eq!(echo.decays.len(), 3);
        assert!(echo.delays_seconds.windows(2).all(|w| w[0] <= w[1]));
        assert!(echo.decays.windows(2).all(|w| w[0] <= w[1]));
        assert!(echo.delays_seconds[0] >= 0.05 && echo.delays_seconds[2] <= 0.45);
        assert!(echo.decays.iter().all(|&d| (0.1..=0.2).contains(&d)));

        let lp = params.low_pass.expect("low-pass enabled");
        assert!((2..=5).contains(&lp.order));
        assert!((4000..=8000).contains(&lp.cutoff_hz));
        assert!(params.tempo_rate.is_none());
        assert!(params.pitch_steps.is_none());
    }

    #[test]
    fn test_zero_echo_count_records_nothing() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let config = EffectConfig {
            echo: Some(EchoConfig {
                count: ParamRange::fixed(0),
                ..EchoConfig::default()
            }),
            ..EffectConfig::default()
        };
        let params = EffectEngine::draw(&config, &mut rng);
        assert!(params.is_identity());
    }

    #[test]
    fn test_same_seed_same_parameters() {
        let config = all_effects();
        let a = EffectEngine::draw(&config, &mut ChaCha8Rng::seed_from_u64(11));
        let b = EffectEngine::draw(&config, &mut ChaCha8Rng::seed_from_u64(11));
        assert_eq!(a, b);
    }

    #[test]
    fn test_render_is_deterministic_and_pure() {
        let engine = EffectEngine::default();
        let input = noise_buffer(4000);
        let snapshot = input.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(21);

        let (out, params) = engine
            .apply(&input, &all_effects(), &mut rng)
            .unwrap();
        let replayed = engine.render(&input, &params).unwrap();

        assert_eq!(input, snapshot, "caller buffer must not change");
        assert_eq!(out, replayed);
    }

    #[test]
    fn test_tempo_changes_length_only() {
        let engine = EffectEngine::default();
        let input = noise_buffer(8000);
        let params = EffectParameters {
            tempo_rate: Some(0.8),
            ..EffectParameters::default()
        };
        let out = engine.render(&input, &params).unwrap();
        assert_eq!(out.len(), 10000);
        assert_eq!(out.sample_rate, 16000);
    }

    #[test]
    fn test_low_pass_parameters_roundtrip_json() {
        let params = EffectParameters {
            low_pass: Some(LowPassParameters {
                order: 3,
                cutoff_hz: 6123,
                phase: FilterPhase::Causal,
            }),
            ..EffectParameters::default()
        };
        let json = serde_json::to_string(&params).unwrap();
        assert!(!json.contains("tempo_rate"), "{}", json);
        let back: EffectParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }
}
