//! Parameter logs
//!
//! Every randomized choice of one sample is captured in a
//! [`ParameterLogEntry`] as an ordered list of [`StageRecord`]s. A batch is
//! persisted once as a JSON array (`experiment_log_<yymmdd_HHMMSS>.json`);
//! while the batch runs, each finished entry is also appended to a JSONL
//! [`Journal`] so a crashed batch still leaves its completed entries behind.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::convolution::engine::ConvolutionRecord;
use crate::effects::engine::EffectParameters;
use crate::effects::phone_band::PhoneBandParameters;
use crate::error::{Result, SynthesisError};
use crate::noise::builder::NoiseSourceLog;

/// Version written into every entry; bumped on incompatible layout changes
pub const SCHEMA_VERSION: u32 = 1;

/// One pipeline stage with the values it used
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageRecord {
    /// Tempo and pitch effects on the clean speech
    CleanSpeech {
        /// Drawn effect values
        effects: EffectParameters,
    },
    /// Room reverberation
    RoomReverb {
        /// Responses used
        convolution: ConvolutionRecord,
    },
    /// Stationary noise stack
    StationaryNoise {
        /// One log per draw, in draw order
        sources: Vec<NoiseSourceLog>,
    },
    /// Non-stationary noise stack
    NonStationaryNoise {
        /// One log per draw, in draw order
        sources: Vec<NoiseSourceLog>,
    },
    /// The two combine ratios
    CombineNoise {
        /// Stationary over non-stationary noise, dB
        noise_to_noise_db: f32,
        /// Speech over combined noise, dB
        speech_to_noise_db: f32,
    },
    /// Fabric (clothing) coloration
    Fabric {
        /// Responses used
        convolution: ConvolutionRecord,
    },
    /// Mobile microphone coloration
    Mobile {
        /// Responses used
        convolution: ConvolutionRecord,
    },
    /// Lossy codec round-trip
    Codec {
        /// Codec name
        codec: String,
    },
    /// Telephone band-pass
    PhoneBand {
        /// Filter settings
        params: PhoneBandParameters,
    },
}

impl StageRecord {
    /// Short stage name for log messages
    pub fn name(&self) -> &'static str {
        match self {
            StageRecord::CleanSpeech { .. } => "clean_speech",
            StageRecord::RoomReverb { .. } => "room_reverb",
            StageRecord::StationaryNoise { .. } => "stationary_noise",
            StageRecord::NonStationaryNoise { .. } => "non_stationary_noise",
            StageRecord::CombineNoise { .. } => "combine_noise",
            StageRecord::Fabric { .. } => "fabric",
            StageRecord::Mobile { .. } => "mobile",
            StageRecord::Codec { .. } => "codec",
            StageRecord::PhoneBand { .. } => "phone_band",
        }
    }
}

/// Repository an asset reference points into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetRole {
    /// Clean speech
    Speech,
    /// Room impulse responses
    RoomIr,
    /// Fabric impulse responses
    FabricIr,
    /// Mobile impulse responses
    MobileIr,
    /// Stationary noise
    StationaryNoise,
    /// Non-stationary noise
    NonStationaryNoise,
}

/// Everything needed to regenerate one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterLogEntry {
    /// Layout version ([`SCHEMA_VERSION`] when written)
    pub schema_version: u32,
    /// Position in the batch
    pub serial: usize,
    /// Seed of the per-sample generator
    pub seed: u64,
    /// Output file name (shared by `clean/`, `dirty/` and `regenerated/`)
    pub file_name: String,
    /// Speech file name within the speech repository
    pub source_speech: String,
    /// Pipeline sample rate
    pub sample_rate: u32,
    /// Length of the output in samples
    pub sample_len: usize,
    /// Stages in execution order
    pub stages: Vec<StageRecord>,
}

impl ParameterLogEntry {
    /// Empty entry at the start of an iteration
    pub fn new(serial: usize, seed: u64, source_speech: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            serial,
            seed,
            file_name: format!("{}.wav", serial),
            source_speech: source_speech.into(),
            sample_rate,
            sample_len: 0,
            stages: Vec::new(),
        }
    }

    /// Append a stage record
    pub fn push(&mut self, stage: StageRecord) {
        self.stages.push(stage);
    }

    /// Every asset the entry references, speech first
    pub fn assets(&self) -> Vec<(AssetRole, &str)> {
        let mut assets = vec![(AssetRole::Speech, self.source_speech.as_str())];
        for stage in &self.stages {
            match stage {
                StageRecord::RoomReverb { convolution } => assets.extend(
                    convolution.irs_used.iter().map(|n| (AssetRole::RoomIr, n.as_str())),
                ),
                StageRecord::Fabric { convolution } => assets.extend(
                    convolution.irs_used.iter().map(|n| (AssetRole::FabricIr, n.as_str())),
                ),
                StageRecord::Mobile { convolution } => assets.extend(
                    convolution.irs_used.iter().map(|n| (AssetRole::MobileIr, n.as_str())),
                ),
                StageRecord::StationaryNoise { sources } => assets.extend(
                    sources
                        .iter()
                        .map(|s| (AssetRole::StationaryNoise, s.noise_name.as_str())),
                ),
                StageRecord::NonStationaryNoise { sources } => assets.extend(
                    sources
                        .iter()
                        .map(|s| (AssetRole::NonStationaryNoise, s.noise_name.as_str())),
                ),
                StageRecord::CleanSpeech { .. }
                | StageRecord::CombineNoise { .. }
                | StageRecord::Codec { .. }
                | StageRecord::PhoneBand { .. } => {}
            }
        }
        assets
    }
}

/// All entries of one batch, in serial order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchLog {
    /// Entries sorted by serial
    pub entries: Vec<ParameterLogEntry>,
}

impl BatchLog {
    /// Batch log from entries (sorted by serial)
    pub fn new(mut entries: Vec<ParameterLogEntry>) -> Self {
        entries.sort_by_key(|e| e.serial);
        Self { entries }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch produced nothing
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the log as pretty JSON to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        log::info!("Saved {} log entries to {}", self.len(), path.display());
        Ok(())
    }

    /// Write the log into `dir` under the stem `stem` (see [`log_stem`])
    ///
    /// # Returns
    ///
    /// Path of the written `<stem>.json`
    pub fn persist(&self, dir: &Path, stem: &str) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", stem));
        self.save(&path)?;
        Ok(path)
    }

    /// Read a batch log written by [`BatchLog::save`]
    ///
    /// # Errors
    ///
    /// `Serialization` for malformed JSON, `InvalidConfig` for entries
    /// written by a newer schema
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let log: Self = serde_json::from_reader(BufReader::new(file))?;
        check_schema(&log.entries)?;
        log::debug!("Loaded {} log entries from {}", log.len(), path.display());
        Ok(log)
    }
}

fn check_schema(entries: &[ParameterLogEntry]) -> Result<()> {
    match entries.iter().find(|e| e.schema_version > SCHEMA_VERSION) {
        Some(entry) => Err(SynthesisError::InvalidConfig(format!(
            "log entry {} uses schema {} (supported: {})",
            entry.serial, entry.schema_version, SCHEMA_VERSION
        ))),
        None => Ok(()),
    }
}

/// Timestamped file stem for a new batch in `dir`
///
/// `experiment_log_<yymmdd_HHMMSS>`, with a numeric suffix if a log with
/// that stem already exists.
pub fn log_stem(dir: &Path) -> String {
    let base = chrono::Local::now()
        .format("experiment_log_%y%m%d_%H%M%S")
        .to_string();
    let taken = |stem: &str| {
        dir.join(format!("{}.json", stem)).exists() || dir.join(format!("{}.jsonl", stem)).exists()
    };
    if !taken(&base) {
        return base;
    }
    (1..)
        .map(|n| format!("{}_{}", base, n))
        .find(|stem| !taken(stem))
        .unwrap_or(base)
}

/// Append-only JSONL journal shared by the batch workers
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl Journal {
    /// Create (or truncate) the journal at `path`
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Journal file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry and flush it to disk
    pub fn append(&self, entry: &ParameterLogEntry) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }

    /// Read a journal back, in completion order
    pub fn read(path: &Path) -> Result<Vec<ParameterLogEntry>> {
        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        check_schema(&entries)?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convolution::engine::ConvolutionMode;
    use crate::effects::engine::EchoParameters;

    fn sample_entry(serial: usize) -> ParameterLogEntry {
        let mut entry = ParameterLogEntry::new(serial, 0xDEAD_BEEF + serial as u64, "speech_a.wav", 16000);
        entry.push(StageRecord::CleanSpeech {
            effects: EffectParameters {
                tempo_rate: Some(0.934_172_4),
                pitch_steps: Some(-3),
                ..EffectParameters::default()
            },
        });
        entry.push(StageRecord::RoomReverb {
            convolution: ConvolutionRecord {
                mode: ConvolutionMode::RandomSingle,
                irs_used: vec!["room_3.wav".to_string()],
            },
        });
        entry.push(StageRecord::StationaryNoise {
            sources: vec![
                NoiseSourceLog {
                    noise_name: "fan.wav".to_string(),
                    effects: EffectParameters {
                        echo: Some(EchoParameters {
                            delays_seconds: vec![0.061_234, 0.173_9],
                            decays: vec![0.113, 0.187_654_3],
                        }),
                        ..EffectParameters::default()
                    },
                    pad_size: None,
                    stack_ratio_db: None,
                },
                NoiseSourceLog {
                    noise_name: "hum.wav".to_string(),
                    effects: EffectParameters::default(),
                    pad_size: None,
                    stack_ratio_db: Some(-3.217_7),
                },
            ],
        });
        entry.push(StageRecord::NonStationaryNoise { sources: vec![] });
        entry.push(StageRecord::CombineNoise {
            noise_to_noise_db: 12.345_678,
            speech_to_noise_db: -4.999_9,
        });
        entry.push(StageRecord::Fabric {
            convolution: ConvolutionRecord {
                mode: ConvolutionMode::RandomMix,
                irs_used: vec!["f1.wav".to_string(), "f1.wav".to_string(), "f2.wav".to_string()],
            },
        });
        entry.push(StageRecord::Codec {
            codec: "pcm16".to_string(),
        });
        entry.sample_len = 16000;
        entry
    }

    #[test]
    fn test_entry_json_is_lossless() {
        let entry = sample_entry(7);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"stage\":\"room_reverb\""), "{}", json);
        let back: ParameterLogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_assets_lists_every_reference() {
        let entry = sample_entry(0);
        let assets = entry.assets();
        assert_eq!(assets[0], (AssetRole::Speech, "speech_a.wav"));
        assert!(assets.contains(&(AssetRole::RoomIr, "room_3.wav")));
        assert!(assets.contains(&(AssetRole::StationaryNoise, "hum.wav")));
        assert_eq!(
            assets.iter().filter(|(role, _)| *role == AssetRole::FabricIr).count(),
            3
        );
    }

    #[test]
    fn test_batch_log_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let log = BatchLog::new(vec![sample_entry(2), sample_entry(0), sample_entry(1)]);
        assert_eq!(log.entries[0].serial, 0);

        let stem = log_stem(dir.path());
        assert!(stem.starts_with("experiment_log_"));
        let path = log.persist(dir.path(), &stem).unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().ends_with(".json"));

        // Top level is a plain array
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.trim_start().starts_with('['));

        assert_eq!(BatchLog::load(&path).unwrap(), log);
        assert_ne!(log_stem(dir.path()), stem);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut entry = sample_entry(0);
        entry.schema_version = SCHEMA_VERSION + 1;
        let path = dir.path().join("log.json");
        BatchLog::new(vec![entry]).save(&path).unwrap();
        assert!(matches!(
            BatchLog::load(&path),
            Err(SynthesisError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_journal_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::create(&dir.path().join("run.jsonl")).unwrap();
        journal.append(&sample_entry(1)).unwrap();
        journal.append(&sample_entry(0)).unwrap();

        let entries = Journal::read(journal.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].serial, 1);
        assert_eq!(entries[1], sample_entry(0));
    }
}
