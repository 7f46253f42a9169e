use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::decode::decode_track;
use super::extract::FeatureExtractor;
use super::features::FeatureSet;
use crate::error::{Result, StemvizError};

/// Artifact format version - increment when the layout or analysis changes
const CACHE_VERSION: u32 = 1;

/// Extension appended to the stem's file name for its sidecar artifact.
const CACHE_EXTENSION: &str = "stv";

/// On-disk form of a [`FeatureSet`].
///
/// Artifacts without the validation fields (only the three series) still
/// load. Anything missing a series, such as a bare `{"rms": [...]}` file,
/// fails to parse and is rebuilt.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    frame_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,
    loudness: Vec<f32>,
    avg_loudness: Vec<f32>,
    spectrum: Vec<Vec<f32>>,
}

/// Why a readable artifact was not used.
#[derive(Debug, PartialEq, Eq)]
enum Stale {
    Version(u32),
    FrameRate(u32),
    Fingerprint,
}

impl std::fmt::Display for Stale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stale::Version(v) => write!(f, "format version {} != {}", v, CACHE_VERSION),
            Stale::FrameRate(fps) => write!(f, "cached at {}fps", fps),
            Stale::Fingerprint => write!(f, "source file changed"),
        }
    }
}

/// Persists feature sets next to their source stems.
#[derive(Clone, Copy, Debug)]
pub struct FeatureCache {
    enabled: bool,
    refresh: bool,
}

impl Default for FeatureCache {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh: false,
        }
    }
}

impl FeatureCache {
    pub fn new(enabled: bool, refresh: bool) -> Self {
        Self { enabled, refresh }
    }

    /// Sidecar artifact path: the stem's file name with `.stv` appended.
    pub fn cache_path(track_path: &Path) -> PathBuf {
        let mut name = track_path.as_os_str().to_owned();
        name.push(".");
        name.push(CACHE_EXTENSION);
        PathBuf::from(name)
    }

    /// Returns the cached features for `track_path` at `frame_rate`, or
    /// decodes and extracts them and writes the artifact.
    pub fn load_or_compute(
        &self,
        track_path: &Path,
        frame_rate: u32,
        extractor: &dyn FeatureExtractor,
    ) -> Result<FeatureSet> {
        if !track_path.is_file() {
            return Err(StemvizError::SourceNotFound(track_path.to_path_buf()));
        }

        if !self.enabled {
            let track = decode_track(track_path)?;
            return extractor.extract(&track, frame_rate);
        }

        let cache_path = Self::cache_path(track_path);
        let fingerprint = fingerprint(track_path)?;

        if cache_path.exists() && !self.refresh {
            match read_cached(&cache_path, frame_rate, &fingerprint) {
                Ok(Some(features)) => {
                    log::info!("Cache hit: {}", cache_path.display());
                    return Ok(features);
                }
                Ok(None) => {}
                Err(err) => log::warn!("{}; recomputing", err),
            }
        }

        log::info!("Analyzing {}", track_path.display());
        let track = decode_track(track_path)?;
        let features = extractor.extract(&track, frame_rate)?;

        if let Err(err) = write_entry(&cache_path, &features, &fingerprint) {
            log::warn!("Failed to write cache {}: {}", cache_path.display(), err);
        }

        Ok(features)
    }
}

/// SHA-256 of the source file, hex encoded.
fn fingerprint(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| StemvizError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = file.read(&mut buffer).map_err(|e| StemvizError::io(path, e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn read_entry(cache_path: &Path) -> Result<CacheEntry> {
    let file = File::open(cache_path).map_err(|e| StemvizError::io(cache_path, e))?;
    let entry: CacheEntry =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| StemvizError::CacheCorrupt {
            path: cache_path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(entry)
}

/// `Ok(None)` when the artifact is readable but stale.
fn read_cached(cache_path: &Path, frame_rate: u32, fingerprint: &str) -> Result<Option<FeatureSet>> {
    let entry = read_entry(cache_path)?;
    if let Err(stale) = check_entry(&entry, frame_rate, fingerprint) {
        log::info!("Cache stale ({}): {}", stale, cache_path.display());
        return Ok(None);
    }
    if entry.version.is_none() {
        log::warn!(
            "{}: legacy cache without frame rate, using it unchecked",
            cache_path.display()
        );
    }
    into_features(entry, frame_rate, cache_path).map(Some)
}

/// Legacy entries (no version) pass unchecked.
fn check_entry(entry: &CacheEntry, frame_rate: u32, fingerprint: &str) -> std::result::Result<(), Stale> {
    let Some(version) = entry.version else {
        return Ok(());
    };
    if version != CACHE_VERSION {
        return Err(Stale::Version(version));
    }
    if let Some(cached_rate) = entry.frame_rate {
        if cached_rate != frame_rate {
            return Err(Stale::FrameRate(cached_rate));
        }
    }
    if entry.fingerprint.as_deref() != Some(fingerprint) {
        return Err(Stale::Fingerprint);
    }
    Ok(())
}

fn into_features(entry: CacheEntry, frame_rate: u32, cache_path: &Path) -> Result<FeatureSet> {
    FeatureSet::new(
        entry.frame_rate.unwrap_or(frame_rate),
        entry.loudness,
        entry.avg_loudness,
        entry.spectrum,
    )
    .map_err(|reason| StemvizError::CacheCorrupt {
        path: cache_path.to_path_buf(),
        reason,
    })
}

/// Writes to a temp file in the same directory, then renames it over the
/// artifact so readers never see a partial file.
fn write_entry(cache_path: &Path, features: &FeatureSet, fingerprint: &str) -> Result<()> {
    let dir = cache_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let entry = CacheEntry {
        version: Some(CACHE_VERSION),
        frame_rate: Some(features.frame_rate()),
        fingerprint: Some(fingerprint.to_string()),
        loudness: features.loudness().to_vec(),
        avg_loudness: features.avg_loudness().to_vec(),
        spectrum: features.spectrum().to_vec(),
    };

    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StemvizError::io(dir, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer(&mut writer, &entry).map_err(|e| StemvizError::io(tmp.path(), e.into()))?;
        writer.flush().map_err(|e| StemvizError::io(tmp.path(), e))?;
    }
    tmp.persist(cache_path)
        .map_err(|e| StemvizError::io(cache_path, e.error))?;

    log::debug!("Wrote cache {}", cache_path.display());
    Ok(())
}
