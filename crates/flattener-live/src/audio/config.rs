//! Audio host configuration
//!
//! Device selection and stream settings for the duplex host.

use serde::{Deserialize, Serialize};

/// Largest host buffer the callback pre-allocates for (frames)
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Buffer size used when none is requested (frames)
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Sample rate requested when none is configured
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Preferred buffer size for the streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Use [`DEFAULT_BUFFER_SIZE`]
    #[default]
    Default,
    /// Request a specific size in frames (clamped to 64..=MAX_BUFFER_SIZE)
    Fixed(u32),
}

impl BufferSize {
    /// Buffer size in frames
    pub fn frames(&self) -> u32 {
        match self {
            BufferSize::Default => DEFAULT_BUFFER_SIZE,
            BufferSize::Fixed(frames) => (*frames).clamp(64, MAX_BUFFER_SIZE as u32),
        }
    }

    /// One-way latency in milliseconds at `sample_rate`
    pub fn latency_ms(&self, sample_rate: u32) -> f32 {
        (self.frames() as f32 / sample_rate as f32) * 1000.0
    }
}

/// Stream settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture device name (None = system default)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_device: Option<String>,
    /// Playback device name (None = system default)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_device: Option<String>,
    pub buffer_size: BufferSize,
    /// Preferred sample rate (None = [`DEFAULT_SAMPLE_RATE`])
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
}

impl AudioConfig {
    pub fn target_sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }
}
