//! Audio host error types

use thiserror::Error;

/// Errors that can occur while opening or running the duplex streams
#[derive(Error, Debug)]
pub enum AudioError {
    /// No default device for the requested direction
    #[error("No default {0} device")]
    NoDefaultDevice(&'static str),

    /// Device not found by name
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to query device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Failed to build audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Input and output devices could not agree on a sample rate
    #[error("Sample rate mismatch: input={input}Hz, output={output}Hz")]
    SampleRateMismatch { input: u32, output: u32 },

    /// The flatten engine rejected the negotiated stream parameters
    #[error("Engine setup failed: {0}")]
    Engine(#[from] flattener_core::FlattenError),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
