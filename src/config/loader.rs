//! Settings file loading.

use std::fs;
use std::path::Path;

use log::debug;

use super::Settings;
use crate::error::ConfigError;

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

/// Read and parse the settings file at `path`.
///
/// Only the file format is checked here. Routing validation happens when the
/// routing table is built.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    debug!(target: "portia_router::config", "Loading settings from {}", path.display());
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Settings::from_toml_str(&text)
}
