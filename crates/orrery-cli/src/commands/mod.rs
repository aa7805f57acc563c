pub mod config;
pub mod info;
pub mod pipelines;
pub mod run;

use std::path::Path;

use anyhow::{Context, Result};
use orrery_core::config::Settings;

/// Settings from `path`, or the defaults.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => Settings::load(path)
            .with_context(|| format!("Failed to read settings {}", path.display())),
        None => Ok(Settings::default()),
    }
}
