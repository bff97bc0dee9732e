use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::template::DEFAULT_TEMPLATE;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Engine-wide knobs, read from an optional TOML file. Missing keys take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub templates_dir: PathBuf,
    pub default_template: String,
    /// Tesseract language string passed to every region.
    pub languages: String,
    pub tessdata_dir: Option<PathBuf>,
    /// Either side above this many pixels marks the image as a camera photo.
    pub photo_threshold_px: u32,
    /// Pages are down-scaled so neither side exceeds this.
    pub max_side_px: u32,
    /// Acceptance bar (0–100) for words in the whole-page fallback.
    pub fallback_min_confidence: f32,
    pub fallback_min_word_len: usize,
    pub deskew: bool,
    /// Batch concurrency; `None` uses the available CPU parallelism.
    pub workers: Option<usize>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("templates"),
            default_template: DEFAULT_TEMPLATE.to_string(),
            languages: "ron+eng".to_string(),
            tessdata_dir: None,
            photo_threshold_px: 1500,
            max_side_px: 2800,
            fallback_min_confidence: 40.0,
            fallback_min_word_len: 2,
            deskew: false,
            workers: None,
        }
    }
}

impl EngineSettings {
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn worker_count(&self) -> usize {
        self.workers
            .filter(|n| *n > 0)
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
    }
}
