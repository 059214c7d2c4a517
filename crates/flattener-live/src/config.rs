//! Host configuration
//!
//! Stored as YAML in the user's config directory.
//! Default location: ~/.config/pitch-flattener/config.yaml

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use flattener_core::config::default_config_path;
use flattener_core::FlattenerConfig;

use crate::audio::AudioConfig;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Devices and stream settings
    pub audio: AudioConfig,
    /// Flattener settings restored at startup and saved on exit
    pub flattener: FlattenerConfig,
    /// Preset applied last, shown in `status`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_preset: Option<String>,
}

pub fn live_config_path() -> PathBuf {
    default_config_path("config.yaml")
}
