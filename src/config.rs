use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::scene::LayerConfig;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub stems: Vec<StemConfig>,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_pix_fmt")]
    pub pix_fmt: String,
    /// Video length in seconds; the longest stem when absent.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub audio: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StemConfig {
    pub name: String,
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            crf: default_crf(),
            codec: default_codec(),
            pix_fmt: default_pix_fmt(),
            duration: None,
            audio: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
        }
    }
}

pub fn default_width() -> u32 { 1920 }
pub fn default_height() -> u32 { 1080 }
pub fn default_fps() -> u32 { 30 }
pub fn default_crf() -> u32 { 25 }
pub fn default_codec() -> String { "libx264".into() }
pub fn default_pix_fmt() -> String { "yuv420p".into() }
fn default_cache_enabled() -> bool { true }

/// Reads a project file and resolves relative stem and audio paths
/// against the file's directory.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    for stem in &mut config.stems {
        stem.path = resolve(base, &stem.path);
    }
    if let Some(audio) = config.output.audio.take() {
        config.output.audio = Some(resolve(base, &audio));
    }

    config.validate()?;
    Ok(config)
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.stems.is_empty() {
            anyhow::bail!("No stems configured; add [[stems]] entries with a name and path");
        }
        let mut seen = HashSet::new();
        for stem in &self.stems {
            if !seen.insert(stem.name.as_str()) {
                anyhow::bail!("Duplicate stem name '{}'", stem.name);
            }
        }
        if self.output.fps == 0 {
            anyhow::bail!("output.fps must be positive");
        }
        if let Some(duration) = self.output.duration {
            if !(duration.is_finite() && duration >= 0.0) {
                anyhow::bail!("output.duration must be a non-negative number of seconds");
            }
        }
        Ok(())
    }

    pub fn stem_names(&self) -> Vec<String> {
        self.stems.iter().map(|s| s.name.clone()).collect()
    }
}
