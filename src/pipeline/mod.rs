//! Pipeline orchestration
//!
//! - **orchestrator**: stage sequencing, batch generation and regeneration
//! - **log**: parameter log entries, batch logs and the JSONL journal

pub mod log;
pub mod orchestrator;

pub use self::log::{
    log_stem, AssetRole, BatchLog, Journal, ParameterLogEntry, StageRecord, SCHEMA_VERSION,
};
pub use orchestrator::{
    derive_seed, GenerationReport, Pipeline, RegenerationReport, SkippedEntry, SynthesizedSample,
};
