//! Configuration parameters for sample synthesis
//!
//! Every randomized stage draws from an inclusive [`ParamRange`]. The defaults
//! reproduce the reference far-field recipe; a JSON file can override any
//! subset of fields via [`SynthesisConfig::from_json_file`].

use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};

use rand::distr::uniform::SampleUniform;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::dsp::butterworth::FilterPhase;
use crate::error::{Result, SynthesisError};

/// Inclusive range a stage parameter is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange<T> {
    /// Lower bound (inclusive)
    pub min: T,
    /// Upper bound (inclusive)
    pub max: T,
}

impl<T> ParamRange<T>
where
    T: SampleUniform + PartialOrd + Copy + Debug,
{
    /// Range `[min, max]`
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    /// Degenerate range that always yields `value`
    pub const fn fixed(value: T) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    /// Draw one value uniformly
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> T {
        if self.min == self.max {
            return self.min;
        }
        rng.random_range(self.min..=self.max)
    }

    /// Reject inverted ranges
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.min > self.max {
            return Err(SynthesisError::InvalidConfig(format!(
                "{}: min {:?} exceeds max {:?}",
                name, self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Echo ranges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoConfig {
    /// Number of echoes (default: 0..=3)
    pub count: ParamRange<usize>,
    /// Delay step in milliseconds; echo `i` is delayed by `step * (i + 1)`
    /// (default: 50..150)
    pub delay_step_ms: ParamRange<f32>,
    /// Echo gain (default: 0.1..0.2)
    pub decay: ParamRange<f32>,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            count: ParamRange::new(0, 3),
            delay_step_ms: ParamRange::new(50.0, 150.0),
            decay: ParamRange::new(0.1, 0.2),
        }
    }
}

/// Butterworth low-pass ranges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowPassConfig {
    /// Filter order (default: 2..=5)
    pub order: ParamRange<usize>,
    /// Cutoff in whole Hz
    pub cutoff_hz: ParamRange<u32>,
    /// How the filter is run
    pub phase: FilterPhase,
}

impl LowPassConfig {
    /// Ranges used on speech (cutoff 2000..=8000 Hz)
    pub fn speech() -> Self {
        Self {
            order: ParamRange::new(2, 5),
            cutoff_hz: ParamRange::new(2000, 8000),
            phase: FilterPhase::Causal,
        }
    }

    /// Ranges used on stationary noise (cutoff 4000..=8000 Hz)
    pub fn noise() -> Self {
        Self {
            cutoff_hz: ParamRange::new(4000, 8000),
            ..Self::speech()
        }
    }
}

/// Which effects one EffectEngine call site enables, with their ranges
///
/// A `None` field disables that effect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectConfig {
    /// Echo ranges
    pub echo: Option<EchoConfig>,
    /// Tempo rate range (default: 0.8..1.2)
    pub tempo_rate: Option<ParamRange<f32>>,
    /// Pitch shift in semitones (default: -4..=4)
    pub pitch_steps: Option<ParamRange<i32>>,
    /// Low-pass ranges
    pub low_pass: Option<LowPassConfig>,
}

impl EffectConfig {
    /// Tempo and pitch only, applied to the clean speech
    pub fn clean_speech() -> Self {
        Self {
            tempo_rate: Some(ParamRange::new(0.8, 1.2)),
            pitch_steps: Some(ParamRange::new(-4, 4)),
            ..Self::default()
        }
    }

    /// Echo and low-pass, applied to each stationary noise draw
    pub fn stationary_noise() -> Self {
        Self {
            echo: Some(EchoConfig::default()),
            low_pass: Some(LowPassConfig::noise()),
            ..Self::default()
        }
    }

    /// Echo only, applied to each non-stationary noise draw
    pub fn non_stationary_noise() -> Self {
        Self {
            echo: Some(EchoConfig::default()),
            ..Self::default()
        }
    }

    /// Whether no effect is enabled
    pub fn is_empty(&self) -> bool {
        self.echo.is_none()
            && self.tempo_rate.is_none()
            && self.pitch_steps.is_none()
            && self.low_pass.is_none()
    }

    fn validate(&self, name: &str) -> Result<()> {
        if let Some(echo) = &self.echo {
            echo.count.validate(&format!("{}.echo.count", name))?;
            echo.delay_step_ms.validate(&format!("{}.echo.delay_step_ms", name))?;
            echo.decay.validate(&format!("{}.echo.decay", name))?;
            if echo.delay_step_ms.min < 0.0 {
                return Err(SynthesisError::InvalidConfig(format!(
                    "{}.echo.delay_step_ms must be non-negative",
                    name
                )));
            }
        }
        if let Some(rate) = &self.tempo_rate {
            rate.validate(&format!("{}.tempo_rate", name))?;
            if rate.min <= 0.0 {
                return Err(SynthesisError::InvalidConfig(format!(
                    "{}.tempo_rate must be positive",
                    name
                )));
            }
        }
        if let Some(steps) = &self.pitch_steps {
            steps.validate(&format!("{}.pitch_steps", name))?;
        }
        if let Some(low_pass) = &self.low_pass {
            low_pass.order.validate(&format!("{}.low_pass.order", name))?;
            low_pass
                .cutoff_hz
                .validate(&format!("{}.low_pass.cutoff_hz", name))?;
            if low_pass.order.min == 0 || low_pass.cutoff_hz.min == 0 {
                return Err(SynthesisError::InvalidConfig(format!(
                    "{}.low_pass order and cutoff must be positive",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Noise stage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Stationary draws per sample (default: 1..=2)
    pub stationary_draws: ParamRange<usize>,
    /// Non-stationary draws per sample (default: 0..=2)
    pub non_stationary_draws: ParamRange<usize>,
    /// Ratio used to fold each additional draw into its stack (default: -5..5 dB)
    pub stack_ratio_db: ParamRange<f32>,
    /// Effects applied to stationary draws
    pub stationary_effects: EffectConfig,
    /// Effects applied to non-stationary draws
    pub non_stationary_effects: EffectConfig,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            stationary_draws: ParamRange::new(1, 2),
            non_stationary_draws: ParamRange::new(0, 2),
            stack_ratio_db: ParamRange::new(-5.0, 5.0),
            stationary_effects: EffectConfig::stationary_noise(),
            non_stationary_effects: EffectConfig::non_stationary_noise(),
        }
    }
}

/// Ratios of the two combine stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixConfig {
    /// Stationary to non-stationary noise ratio (default: -5..20 dB)
    pub noise_to_noise_db: ParamRange<f32>,
    /// Speech to noise ratio (default: -5..20 dB)
    pub speech_to_noise_db: ParamRange<f32>,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            noise_to_noise_db: ParamRange::new(-5.0, 20.0),
            speech_to_noise_db: ParamRange::new(-5.0, 20.0),
        }
    }
}

/// Convolution stage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvolutionConfig {
    /// Rate every IR repository is recorded at (default: 16000)
    pub ir_sample_rate: u32,
    /// Probability that the fabric stage mixes IRs instead of using one (default: 0.9)
    pub fabric_mix_probability: f64,
    /// IRs averaged by a fabric mix (default: 4)
    pub fabric_mix_count: usize,
    /// IRs averaged by a mobile mix (default: 4)
    pub mobile_mix_count: usize,
}

impl Default for ConvolutionConfig {
    fn default() -> Self {
        Self {
            ir_sample_rate: 16000,
            fabric_mix_probability: 0.9,
            fabric_mix_count: 4,
            mobile_mix_count: 4,
        }
    }
}

/// Tail of the pipeline after speech and noise are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelModel {
    /// Fabric IR, mobile IR, then a lossy codec round-trip
    #[default]
    FabricMobileCodec,
    /// Telephone band-pass (300-3400 Hz) only
    PhoneBand,
}

/// Lossy codec used for the round-trip stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecKind {
    /// 16-bit PCM quantization (always available)
    Pcm16,
    /// Opus at 24 kbit/s (requires the `opus` feature)
    Opus,
}

impl Default for CodecKind {
    /// Opus when it is compiled in, PCM otherwise
    fn default() -> Self {
        if cfg!(feature = "opus") {
            CodecKind::Opus
        } else {
            CodecKind::Pcm16
        }
    }
}

/// Synthesis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    // Asset repositories
    /// Clean speech directory
    pub speech_dir: PathBuf,
    /// Room impulse responses
    pub room_ir_dir: PathBuf,
    /// Fabric impulse responses
    pub fabric_ir_dir: PathBuf,
    /// Mobile phone microphone impulse responses
    pub mobile_ir_dir: PathBuf,
    /// Stationary noise directory
    pub stationary_noise_dir: PathBuf,
    /// Non-stationary noise directory
    pub non_stationary_noise_dir: PathBuf,
    /// Root of `clean/`, `dirty/`, `regenerated/` and the batch logs
    pub output_dir: PathBuf,

    // Batch
    /// Pipeline sample rate; assets are resampled to it on load (default: 16000)
    pub sample_rate: u32,
    /// Batch seed; each sample derives its own generator from it
    pub seed: u64,
    /// Worker threads (default: 0 = CPUs - 1, at least 1)
    pub jobs: usize,
    /// Codec round-trip timeout in milliseconds (default: 30000)
    pub codec_timeout_ms: u64,

    // Stages
    /// Effects applied to the clean speech
    pub speech_effects: EffectConfig,
    /// Noise stage settings
    pub noise: NoiseConfig,
    /// Combine ratios
    pub mix: MixConfig,
    /// Convolution stage settings
    pub convolution: ConvolutionConfig,
    /// Pipeline tail
    pub channel: ChannelModel,
    /// Codec for the round-trip stage
    pub codec: CodecKind,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        let data = PathBuf::from("data");
        let irs = data.join("impulse_responses");
        Self {
            speech_dir: data.join("speech"),
            room_ir_dir: irs.join("room"),
            fabric_ir_dir: irs.join("fabric"),
            mobile_ir_dir: irs.join("mobile"),
            stationary_noise_dir: data.join("stationary_noise"),
            non_stationary_noise_dir: data.join("non_stationary_noise"),
            output_dir: PathBuf::from("output"),
            sample_rate: 16000,
            seed: 0,
            jobs: 0,
            codec_timeout_ms: 30_000,
            speech_effects: EffectConfig::clean_speech(),
            noise: NoiseConfig::default(),
            mix: MixConfig::default(),
            convolution: ConvolutionConfig::default(),
            channel: ChannelModel::default(),
            codec: CodecKind::default(),
        }
    }
}

impl SynthesisConfig {
    /// Load a JSON config; missing fields keep their defaults
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `Serialization` if it is not valid
    /// JSON for this schema, `InvalidConfig` if validation fails
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        log::debug!("Loaded synthesis config from {}", path.display());
        Ok(config)
    }

    /// Reject zero rates, inverted ranges and out-of-range probabilities
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(SynthesisError::InvalidConfig(
                "sample_rate must be positive".to_string(),
            ));
        }
        if self.convolution.ir_sample_rate == 0 {
            return Err(SynthesisError::InvalidConfig(
                "convolution.ir_sample_rate must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.convolution.fabric_mix_probability) {
            return Err(SynthesisError::InvalidConfig(format!(
                "convolution.fabric_mix_probability must be in [0, 1], got {}",
                self.convolution.fabric_mix_probability
            )));
        }
        if self.convolution.fabric_mix_count == 0 || self.convolution.mobile_mix_count == 0 {
            return Err(SynthesisError::InvalidConfig(
                "convolution mix counts must be at least 1".to_string(),
            ));
        }

        self.speech_effects.validate("speech_effects")?;
        self.noise.stationary_draws.validate("noise.stationary_draws")?;
        self.noise
            .non_stationary_draws
            .validate("noise.non_stationary_draws")?;
        self.noise.stack_ratio_db.validate("noise.stack_ratio_db")?;
        self.noise
            .stationary_effects
            .validate("noise.stationary_effects")?;
        self.noise
            .non_stationary_effects
            .validate("noise.non_stationary_effects")?;
        self.mix.noise_to_noise_db.validate("mix.noise_to_noise_db")?;
        self.mix.speech_to_noise_db.validate("mix.speech_to_noise_db")?;
        Ok(())
    }

    /// Worker count after resolving the `0 = auto` default
    pub fn worker_count(&self) -> usize {
        if self.jobs > 0 {
            return self.jobs;
        }
        std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1).max(1))
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_default_config_is_valid() {
        let config = SynthesisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.channel, ChannelModel::FabricMobileCodec);
        assert!(config.speech_effects.echo.is_none());
        assert!(config.noise.non_stationary_effects.low_pass.is_none());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let mut config = SynthesisConfig::default();
        config.mix.speech_to_noise_db = ParamRange::new(10.0, -10.0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("speech_to_noise_db"), "{}", err);
    }

    #[test]
    fn test_zero_rate_rejected() {
        let config = SynthesisConfig {
            sample_rate: 0,
            ..SynthesisConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SynthesisError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_draw_stays_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let range = ParamRange::new(-4, 4);
        for _ in 0..200 {
            let v = range.draw(&mut rng);
            assert!((-4..=4).contains(&v));
        }
        assert_eq!(ParamRange::fixed(1.25f32).draw(&mut rng), 1.25);
    }

    #[test]
    fn test_low_pass_presets() {
        assert_eq!(LowPassConfig::speech().cutoff_hz, ParamRange::new(2000, 8000));
        assert_eq!(LowPassConfig::noise().cutoff_hz, ParamRange::new(4000, 8000));
        assert_eq!(LowPassConfig::noise().order, ParamRange::new(2, 5));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "seed": 42, "channel": "phone_band", "codec": "pcm16" }"#).unwrap();

        let config = SynthesisConfig::from_json_file(&path).unwrap();
        assert_eq!(config.seed, 42);
        assert_eq!(config.channel, ChannelModel::PhoneBand);
        assert_eq!(config.codec, CodecKind::Pcm16);
        assert_eq!(config.noise, NoiseConfig::default());
    }

    #[test]
    fn test_worker_count() {
        let config = SynthesisConfig {
            jobs: 3,
            ..SynthesisConfig::default()
        };
        assert_eq!(config.worker_count(), 3);
        assert!(SynthesisConfig::default().worker_count() >= 1);
    }
}
