//! Standard locations for the config file and presets

use std::path::PathBuf;

const APP_DIR: &str = "pitch-flattener";

/// `<config dir>/pitch-flattener`, falling back to the working directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Config file path for a given file name
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}

/// Root of the factory and user preset folders
pub fn default_presets_dir() -> PathBuf {
    default_config_dir().join("presets")
}
