//! Drawing and stacking noise sources
//!
//! A noise stack is built from `k` draws out of one noise repository. Each
//! draw is loaded at the pipeline rate, run through the effect engine, sized
//! against the reference, and folded into the running stack at its own ratio.
//! Every choice lands in a [`NoiseSourceLog`] so the stack can be replayed.

use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{EffectConfig, ParamRange};
use crate::effects::engine::{EffectEngine, EffectParameters};
use crate::error::{Result, SynthesisError};
use crate::io::decoder::load_audio;
use crate::io::manifest::AssetManifest;
use crate::io::sample_buffer::SampleBuffer;
use crate::noise::sizer::{size_noise, NoiseSizing, Stationarity};
use crate::noise::stacker::stack;

/// Value filling an empty (k = 0) noise stack
pub const NOISE_FLOOR: f32 = 1e-14;

/// Record of one noise draw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseSourceLog {
    /// File name within the noise repository
    pub noise_name: String,
    /// Effects rendered onto the draw
    pub effects: EffectParameters,
    /// Leading zeros (non-stationary draws only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pad_size: Option<usize>,
    /// Ratio used to fold the draw into the stack (absent for the first draw)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_ratio_db: Option<f32>,
}

/// Builds noise stacks from one repository
#[derive(Debug, Clone)]
pub struct NoiseBuilder {
    manifest: AssetManifest,
    stationarity: Stationarity,
    effects: EffectConfig,
    stack_ratio_db: ParamRange<f32>,
    sample_rate: u32,
}

impl NoiseBuilder {
    /// Builder over an already-scanned repository
    pub fn new(
        manifest: AssetManifest,
        stationarity: Stationarity,
        effects: EffectConfig,
        stack_ratio_db: ParamRange<f32>,
        sample_rate: u32,
    ) -> Self {
        Self {
            manifest,
            stationarity,
            effects,
            stack_ratio_db,
            sample_rate,
        }
    }

    /// Repository directory
    pub fn root(&self) -> &Path {
        self.manifest.root()
    }

    /// Stationary or non-stationary
    pub fn stationarity(&self) -> Stationarity {
        self.stationarity
    }

    /// Draw `draws` sources and stack them against `reference`
    ///
    /// # Arguments
    ///
    /// * `reference` - Buffer the stack must match in length
    /// * `draws` - Number of sources `k`; 0 yields a near-silent floor
    /// * `engine` - Effect engine rendering each draw
    /// * `rng` - Per-sample generator
    ///
    /// # Returns
    ///
    /// `(noise, logs)` with one log per draw, in draw order
    pub fn build<R: Rng + ?Sized>(
        &self,
        reference: &SampleBuffer,
        draws: usize,
        engine: &EffectEngine,
        rng: &mut R,
    ) -> Result<(SampleBuffer, Vec<NoiseSourceLog>)> {
        let mut layers = Vec::with_capacity(draws);
        let mut logs = Vec::with_capacity(draws);

        for index in 0..draws {
            let noise_name = self.manifest.choose(rng).to_string();
            let noise = load_audio(&self.manifest.path_of(&noise_name), self.sample_rate)?;
            let (noise, effects) = engine.apply(&noise, &self.effects, rng)?;
            let sizing = NoiseSizing::draw(self.stationarity, reference.len(), rng);
            let (sized, pad_size) = size_noise(reference.len(), &noise, sizing);
            let stack_ratio_db = if index == 0 {
                None
            } else {
                Some(self.stack_ratio_db.draw(rng))
            };

            log::debug!(
                "{:?} noise draw {}: {} (pad {:?}, ratio {:?})",
                self.stationarity,
                index,
                noise_name,
                pad_size,
                stack_ratio_db
            );
            layers.push((sized, stack_ratio_db));
            logs.push(NoiseSourceLog {
                noise_name,
                effects,
                pad_size,
                stack_ratio_db,
            });
        }

        let noise = fold_layers(reference, layers)?;
        Ok((noise, logs))
    }

    /// Rebuild a stack from its logs without drawing anything
    ///
    /// # Errors
    ///
    /// `MissingAsset` if a logged source is gone, `InvalidConfig` if a log
    /// after the first lacks its stack ratio or a non-stationary log lacks
    /// its pad size
    pub fn replay(
        &self,
        reference: &SampleBuffer,
        logs: &[NoiseSourceLog],
        engine: &EffectEngine,
    ) -> Result<SampleBuffer> {
        let layers = logs
            .iter()
            .map(|log| {
                let noise = load_audio(&self.manifest.path_of(&log.noise_name), self.sample_rate)?;
                let noise = engine.render(&noise, &log.effects)?;
                let sizing = match self.stationarity {
                    Stationarity::Stationary => NoiseSizing::Stationary,
                    Stationarity::NonStationary => {
                        let pad = log.pad_size.ok_or_else(|| {
                            SynthesisError::InvalidConfig(format!(
                                "non-stationary noise source {} has no pad size",
                                log.noise_name
                            ))
                        })?;
                        NoiseSizing::from_pad(Some(pad))
                    }
                };
                let (sized, _) = size_noise(reference.len(), &noise, sizing);
                Ok((sized, log.stack_ratio_db))
            })
            .collect::<Result<Vec<_>>>()?;
        fold_layers(reference, layers)
    }
}

/// Fold sized layers into one stack, in order
fn fold_layers(reference: &SampleBuffer, layers: Vec<(SampleBuffer, Option<f32>)>) -> Result<SampleBuffer> {
    let mut layers = layers.into_iter();
    let Some((first, _)) = layers.next() else {
        return Ok(SampleBuffer::filled(reference.len(), NOISE_FLOOR, reference.sample_rate));
    };

    layers.enumerate().try_fold(first, |acc, (index, (layer, ratio))| {
        let ratio = ratio.ok_or_else(|| {
            SynthesisError::InvalidConfig(format!(
                "noise layer {} has no stack ratio",
                index + 1
            ))
        })?;
        stack(&acc, &layer, ratio)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::wav::write_wav;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn noise_repo(dir: &Path) -> AssetManifest {
        for (i, len) in [6000usize, 9000, 20000].iter().enumerate() {
            let mut rng = ChaCha8Rng::seed_from_u64(i as u64);
            let samples = (0..*len).map(|_| rng.random_range(-0.3f32..0.3)).collect();
            write_wav(
                &dir.join(format!("noise_{}.wav", i)),
                &SampleBuffer::new(samples, 16000),
            )
            .unwrap();
        }
        std::fs::write(dir.join("notes.txt"), b"not audio").unwrap();
        AssetManifest::scan(dir, crate::io::manifest::AUDIO_EXTENSIONS).unwrap()
    }

    fn builder(manifest: AssetManifest, stationarity: Stationarity) -> NoiseBuilder {
        let effects = match stationarity {
            Stationarity::Stationary => EffectConfig::stationary_noise(),
            Stationarity::NonStationary => EffectConfig::non_stationary_noise(),
        };
        NoiseBuilder::new(manifest, stationarity, effects, ParamRange::new(-5.0, 5.0), 16000)
    }

    #[test]
    fn test_zero_draws_is_near_silent() {
        let dir = tempfile::tempdir().unwrap();
        let builder = builder(noise_repo(dir.path()), Stationarity::Stationary);
        let reference = SampleBuffer::silence(16000, 16000);
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let (noise, logs) = builder
            .build(&reference, 0, &EffectEngine::default(), &mut rng)
            .unwrap();
        assert!(logs.is_empty());
        assert_eq!(noise.len(), 16000);
        assert!(noise.samples.iter().all(|&x| x.abs() < 1e-6));
    }

    #[test]
    fn test_single_draw_is_not_stacked() {
        let dir = tempfile::tempdir().unwrap();
        let builder = builder(noise_repo(dir.path()), Stationarity::NonStationary);
        let reference = SampleBuffer::silence(16000, 16000);
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let (noise, logs) = builder
            .build(&reference, 1, &EffectEngine::default(), &mut rng)
            .unwrap();
        assert_eq!(noise.len(), 16000);
        assert_eq!(logs.len(), 1);
        assert!(logs[0].pad_size.is_some());
        assert!(logs[0].stack_ratio_db.is_none());
        assert!(logs[0].noise_name.ends_with(".wav"));
    }

    #[test]
    fn test_stack_replays_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let engine = EffectEngine::default();
        let reference = SampleBuffer::silence(12000, 16000);

        for stationarity in [Stationarity::Stationary, Stationarity::NonStationary] {
            let builder = builder(noise_repo(dir.path()), stationarity);
            let mut rng = ChaCha8Rng::seed_from_u64(41);
            let (noise, logs) = builder.build(&reference, 3, &engine, &mut rng).unwrap();

            assert_eq!(logs.len(), 3);
            assert!(logs[1].stack_ratio_db.is_some());
            assert!(logs[2].stack_ratio_db.is_some());
            assert!((noise.peak() - 1.0).abs() < 1e-6);

            let replayed = builder.replay(&reference, &logs, &engine).unwrap();
            assert_eq!(noise, replayed, "{:?} replay diverged", stationarity);
        }
    }

    #[test]
    fn test_replay_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let builder = builder(noise_repo(dir.path()), Stationarity::Stationary);
        let logs = vec![NoiseSourceLog {
            noise_name: "deleted.wav".to_string(),
            effects: EffectParameters::default(),
            pad_size: None,
            stack_ratio_db: None,
        }];
        let result = builder.replay(
            &SampleBuffer::silence(100, 16000),
            &logs,
            &EffectEngine::default(),
        );
        assert!(matches!(result, Err(SynthesisError::MissingAsset(_))));
    }

    #[test]
    fn test_replay_non_stationary_without_pad() {
        let dir = tempfile::tempdir().unwrap();
        let engine = EffectEngine::default();
        let reference = SampleBuffer::silence(12000, 16000);
        let builder = builder(noise_repo(dir.path()), Stationarity::NonStationary);
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let (_, mut logs) = builder.build(&reference, 2, &engine, &mut rng).unwrap();

        logs[1].pad_size = None;
        let result = builder.replay(&reference, &logs, &engine);
        assert!(matches!(result, Err(SynthesisError::InvalidConfig(_))));
    }
}
