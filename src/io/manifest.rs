//! Pre-built manifests of usable asset files
//!
//! A manifest lists the files of a flat asset directory whose extension is
//! recognized, sorted by name. Random selection always draws from a manifest,
//! so an empty or junk-only directory fails when the manifest is built
//! instead of stalling a draw loop.

use std::fs;
use std::path::{Path, PathBuf};

use rand::Rng;

use crate::error::{Result, SynthesisError};

/// Extensions accepted for speech and noise audio
pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "flac", "mp3", "ogg"];

/// Extensions accepted for impulse responses
pub const IR_EXTENSIONS: &[&str] = &["wav"];

/// Sorted list of usable files in one directory
#[derive(Debug, Clone)]
pub struct AssetManifest {
    root: PathBuf,
    entries: Vec<String>,
}

impl AssetManifest {
    /// Scan `root` for files whose extension is in `extensions`
    ///
    /// Matching is case-insensitive and done on the real extension, so
    /// `not-a-wav-file.txt` is rejected.
    ///
    /// # Errors
    ///
    /// `MissingAsset` if `root` is not a directory, `EmptyRepository` if no
    /// file qualifies
    pub fn scan(root: &Path, extensions: &[&str]) -> Result<Self> {
        if !root.is_dir() {
            return Err(SynthesisError::MissingAsset(root.to_path_buf()));
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            let recognized = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| extensions.iter().any(|known| e.eq_ignore_ascii_case(known)))
                .unwrap_or(false);
            if !recognized {
                log::debug!("Ignoring unrecognized asset {}", path.display());
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                entries.push(name.to_string());
            }
        }

        if entries.is_empty() {
            return Err(SynthesisError::EmptyRepository(root.to_path_buf()));
        }
        entries.sort();

        log::debug!("Manifest of {}: {} assets", root.display(), entries.len());
        Ok(Self {
            root: root.to_path_buf(),
            entries,
        })
    }

    /// Directory the manifest was built from
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File names in sorted order
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Number of usable assets (always ≥ 1)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; an empty manifest cannot be built
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Draw one file name uniformly
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        &self.entries[rng.random_range(0..self.entries.len())]
    }

    /// Full path of a file name relative to the manifest root
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

/// Check that every named asset exists under `root`
///
/// # Errors
///
/// `MissingAsset` naming the first file that is absent
pub fn ensure_assets_exist<'a, I>(root: &Path, names: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    for name in names {
        let path = root.join(name);
        if !path.is_file() {
            return Err(SynthesisError::MissingAsset(path));
        }
    }
    Ok(())
}
