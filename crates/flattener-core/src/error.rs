//! Error types for the control side of the flattener
//!
//! The real-time path never returns errors; these cover engine construction,
//! the command queue and preset handling.

use thiserror::Error;

/// Errors that can occur outside the audio callback
#[derive(Error, Debug)]
pub enum FlattenError {
    /// The reconfiguration queue to the audio thread is full
    #[error("Engine command queue is full")]
    CommandQueueFull,

    /// Sample rate is zero or unreasonably large
    #[error("Invalid sample rate: {0}Hz")]
    InvalidSampleRate(u32),

    /// Block size is zero or exceeds the pre-allocated maximum
    #[error("Invalid block size: {0} frames (max {max})", max = crate::types::MAX_BLOCK_SIZE)]
    InvalidBlockSize(usize),

    /// No factory or user preset with this name
    #[error("Preset not found: {0}")]
    PresetNotFound(String),

    /// Factory presets cannot be overwritten or deleted
    #[error("Preset is read-only: {0}")]
    ReadOnlyPreset(String),

    /// Preset names must be non-empty and must not contain path separators
    #[error("Invalid preset name: {0:?}")]
    InvalidPresetName(String),

    /// Preset file could not be parsed or serialized
    #[error("Preset YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Filesystem failure while handling presets
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for control-side operations
pub type FlattenResult<T> = Result<T, FlattenError>;
