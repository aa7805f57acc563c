use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_CROP_SCALE, DEFAULT_TIMELAPSE_FPS, DEFAULT_TIMELAPSE_SIZE};
use crate::error::{OrreryError, Result};
use crate::timelapse::TIMELAPSE_CLASS_PATH;

/// Static configuration read by registry lookups and pipeline runs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    /// Pipeline short name -> class path.
    #[serde(default = "default_pipelines")]
    pub pipelines: BTreeMap<String, String>,
    #[serde(default)]
    pub timelapse: TimelapseSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pipelines: default_pipelines(),
            timelapse: TimelapseSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| OrreryError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| OrreryError::Config(e.to_string()))
    }
}

fn default_pipelines() -> BTreeMap<String, String> {
    BTreeMap::from([("timelapse".to_string(), TIMELAPSE_CLASS_PATH.to_string())])
}

/// Output container for timelapse animations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelapseFormat {
    #[default]
    Gif,
    Mp4,
    Webm,
}

impl TimelapseFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Gif => "gif",
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }
}

impl std::fmt::Display for TimelapseFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimelapseSettings {
    #[serde(default)]
    pub format: TimelapseFormat,
    #[serde(default = "default_fps")]
    pub fps: f64,
    /// Edge length in pixels of every encoded frame.
    #[serde(default = "default_size")]
    pub size: u32,
    /// Fraction of each axis kept when the `crop` flag is set.
    #[serde(default = "default_crop_scale")]
    pub crop_scale: f64,
}

impl Default for TimelapseSettings {
    fn default() -> Self {
        Self {
            format: TimelapseFormat::default(),
            fps: DEFAULT_TIMELAPSE_FPS,
            size: DEFAULT_TIMELAPSE_SIZE,
            crop_scale: DEFAULT_CROP_SCALE,
        }
    }
}

fn default_fps() -> f64 {
    DEFAULT_TIMELAPSE_FPS
}

fn default_size() -> u32 {
    DEFAULT_TIMELAPSE_SIZE
}

fn default_crop_scale() -> f64 {
    DEFAULT_CROP_SCALE
}
