use std::path::PathBuf;

use thiserror::Error;

/// Failures while turning a stem into features.
///
/// Every variant names the offending track so a broken stem is reported
/// rather than silently rendered as silence.
#[derive(Debug, Error)]
pub enum StemvizError {
    #[error("{track}: invalid audio format: {reason}")]
    InvalidFormat { track: String, reason: String },

    #[error("source track not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("cache artifact {} is corrupt: {reason}", path.display())]
    CacheCorrupt { path: PathBuf, reason: String },

    #[error("{track}: failed to decode audio: {reason}")]
    Decode { track: String, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StemvizError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StemvizError>;
