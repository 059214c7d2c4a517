//! Configuration: YAML settings, standard paths and presets
//!
//! ```ignore
//! use flattener_core::config::{load_config, save_config, default_config_path, FlattenerConfig};
//!
//! let path = default_config_path("config.yaml");
//! let config: FlattenerConfig = load_config(&path);
//! save_config(&config, &path)?;
//! ```

mod io;
mod paths;
mod presets;
mod settings;

pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path, default_presets_dir};
pub use presets::{PresetEntry, PresetSource, PresetStore, DEFAULT_PRESET_NAME};
pub use settings::{
    DetectionConfig, FlattenConfig, FlattenerConfig, OutputConfig, TrackingConfig,
    MAX_LOOKAHEAD_MULTIPLIER, MIN_LOOKAHEAD_MULTIPLIER, MIN_VOLUME_THRESHOLD_DB,
};
