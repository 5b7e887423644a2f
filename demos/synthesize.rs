//! Example: Generate or regenerate a corrupted-speech batch
//!
//! Usage:
//!   cargo run --release --example synthesize -- [--config synth.json] [--jobs N] generate <n>
//!   cargo run --release --example synthesize -- [--config synth.json] regenerate <log.json>
//!   cargo run --release --example synthesize -- derive-irs <sweep.wav> <recordings_dir> <out_dir>
//!
//! Notes:
//! - Without `--config`, directories default to `data/...` and output goes to `output/`.
//! - Set `RUST_LOG=info` (or `debug`) to follow the batch.

use farfield_synth::convolution::ir_design::derive_repository;
use farfield_synth::convolution::IrDerivationSettings;
use farfield_synth::{BatchLog, Pipeline, SynthesisConfig};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Instant;

const USAGE: &str = "Usage: synthesize [--config FILE] [--jobs N] generate <n>\n\
                     \x20      synthesize [--config FILE] [--jobs N] regenerate <log.json>\n\
                     \x20      synthesize derive-irs <sweep.wav> <recordings_dir> <out_dir>\n\
                     \n\
                     --config FILE  JSON config (missing fields keep their defaults)\n\
                     --jobs N       Parallel workers (default: CPU-1)\n";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let mut config_path: Option<PathBuf> = None;
    let mut jobs: Option<usize> = None;
    let mut positional: Vec<String> = Vec::new();

    while let Some(a) = args.first().cloned() {
        args.remove(0);
        match a.as_str() {
            "--config" => {
                let v = args.first().ok_or("--config requires a value")?.clone();
                args.remove(0);
                config_path = Some(PathBuf::from(v));
            }
            "--jobs" => {
                let v = args
                    .first()
                    .ok_or("--jobs requires a value")?
                    .parse::<usize>()?;
                args.remove(0);
                jobs = Some(std::cmp::max(1, v));
            }
            "--help" | "-h" => {
                eprintln!("{}", USAGE);
                return Ok(());
            }
            _ => positional.push(a),
        }
    }

    let mut config = match &config_path {
        Some(path) => SynthesisConfig::from_json_file(path)?,
        None => SynthesisConfig::default(),
    };
    if let Some(jobs) = jobs {
        config.jobs = jobs;
    }

    let t0 = Instant::now();
    match positional.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["generate", n] => {
            let n = n.parse::<usize>()?;
            let pipeline = Pipeline::new(config)?;
            let report = pipeline.generate(n)?;
            println!(
                "Generated {} samples in {:.2}s",
                report.log.len(),
                t0.elapsed().as_secs_f64()
            );
            println!("  log:     {}", report.log_path.display());
            println!("  journal: {}", report.journal_path.display());
        }
        ["regenerate", log_path] => {
            let log = BatchLog::load(Path::new(log_path))?;
            let pipeline = Pipeline::new(config)?;
            let report = pipeline.regenerate(&log)?;
            println!(
                "Regenerated {} of {} samples in {:.2}s",
                report.regenerated.len(),
                log.len(),
                t0.elapsed().as_secs_f64()
            );
            for skipped in &report.skipped {
                println!("  skipped {} ({}): {}", skipped.serial, skipped.file_name, skipped.reason);
            }
        }
        ["derive-irs", sweep, recordings, out_dir] => {
            let written = derive_repository(
                Path::new(sweep),
                Path::new(recordings),
                Path::new(out_dir),
                &IrDerivationSettings::default(),
            )?;
            println!("Derived {} impulse responses into {}", written.len(), out_dir);
        }
        _ => {
            eprintln!("ERROR: unknown command.\n\n{}", USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}
