//! Flattener configuration
//!
//! Everything a user can tune, grouped by concern and serialised as YAML.
//! Missing fields take their defaults, so old config files keep loading.

use serde::{Deserialize, Serialize};

use crate::detection::{
    Algorithm, DioConfig, FrequencyBounds, DEFAULT_YIN_THRESHOLD, MAX_FREQ_CEIL, MIN_FREQ_FLOOR,
};
use crate::ratio::{MAX_SMOOTHING_MS, MIN_SMOOTHING_MS};

/// Lowest volume gate in dB
pub const MIN_VOLUME_THRESHOLD_DB: f32 = -100.0;

/// Lookahead multiplier range (in units of the maximum block size)
pub const MIN_LOOKAHEAD_MULTIPLIER: f32 = 1.0;
pub const MAX_LOOKAHEAD_MULTIPLIER: f32 = 8.0;

/// What the input is flattened towards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlattenConfig {
    /// Reference pitch when nothing is latched or overridden
    /// Default: 440.0 Hz
    pub target_pitch: f32,

    /// Use `override_freq` as the reference regardless of the latch
    /// Default: false
    pub manual_override: bool,

    /// Default: 440.0 Hz
    pub override_freq: f32,

    /// Lock onto the first settled base pitch and flatten towards it
    /// Default: true
    pub latch_enabled: bool,

    /// Always correct fully, ignoring the sensitivity dead zone
    /// Default: false
    pub hard_flatten: bool,

    /// Soft flatten dead zone in percent of the locked pitch
    /// Default: 1.0
    pub sensitivity_pct: f32,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        Self {
            target_pitch: 440.0,
            manual_override: false,
            override_freq: 440.0,
            latch_enabled: true,
            hard_flatten: false,
            sensitivity_pct: 1.0,
        }
    }
}

/// Stability tracking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Detection range lower bound. Default: 50.0 Hz
    pub min_freq: f32,
    /// Detection range upper bound. Default: 2000.0 Hz
    pub max_freq: f32,
    /// Low-confidence pitches commit after this long. Default: 500 ms
    pub hold_ms: f32,
    /// Candidates this far from the last accepted pitch are rejected. Default: 300 Hz
    pub jump_threshold_hz: f32,
    /// Confidence needed for an immediate commit. Default: 0.35
    pub min_confidence: f32,
    /// Share of the previous smoothed pitch kept per commit. Default: 0.8
    pub pitch_smoothing: f32,
    /// Silence longer than this returns the tracker to neutral. Default: 2000 ms
    pub silence_reset_ms: f32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            min_freq: 50.0,
            max_freq: 2000.0,
            hold_ms: 500.0,
            jump_threshold_hz: 300.0,
            min_confidence: 0.35,
            pitch_smoothing: 0.8,
            silence_reset_ms: 2000.0,
        }
    }
}

/// Detection front end and estimator choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub algorithm: Algorithm,
    /// YIN absolute threshold. Default: 0.15
    pub yin_threshold: f32,
    /// Time between estimates. Default: 10 ms
    pub interval_ms: f32,
    /// Blocks quieter than this are treated as silence. Default: -40 dB
    pub volume_threshold_db: f32,
    /// Default: 40 Hz
    pub highpass_hz: f32,
    /// Default: 6000 Hz
    pub lowpass_hz: f32,
    pub dio: DioConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Yin,
            yin_threshold: DEFAULT_YIN_THRESHOLD,
            interval_ms: 10.0,
            volume_threshold_db: -40.0,
            highpass_hz: 40.0,
            lowpass_hz: 6000.0,
            dio: DioConfig::default(),
        }
    }
}

/// Ratio smoothing, lookahead and output mix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Ratio smoothing time constant. Default: 150 ms
    pub smoothing_ms: f32,
    /// Wet share of the output, 0 = dry. Default: 1.0
    pub mix: f32,
    /// Lookahead length in maximum blocks. Default: 2.0
    pub lookahead_multiplier: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            smoothing_ms: 150.0,
            mix: 1.0,
            lookahead_multiplier: 2.0,
        }
    }
}

/// Complete flattener configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlattenerConfig {
    pub flatten: FlattenConfig,
    pub tracking: TrackingConfig,
    pub detection: DetectionConfig,
    pub output: OutputConfig,
}

impl FlattenerConfig {
    /// Detection range after clamping
    pub fn bounds(&self) -> FrequencyBounds {
        FrequencyBounds::new(self.tracking.min_freq, self.tracking.max_freq).clamped()
    }

    /// Copy with every value clamped into its supported range
    pub fn sanitized(&self) -> Self {
        let bounds = self.bounds();
        Self {
            flatten: FlattenConfig {
                target_pitch: self.flatten.target_pitch.clamp(MIN_FREQ_FLOOR, MAX_FREQ_CEIL),
                manual_override: self.flatten.manual_override,
                override_freq: self.flatten.override_freq.clamp(MIN_FREQ_FLOOR, MAX_FREQ_CEIL),
                latch_enabled: self.flatten.latch_enabled,
                hard_flatten: self.flatten.hard_flatten,
                sensitivity_pct: self.flatten.sensitivity_pct.clamp(0.0, 100.0),
            },
            tracking: TrackingConfig {
                min_freq: bounds.min_hz,
                max_freq: bounds.max_hz,
                hold_ms: self.tracking.hold_ms.clamp(0.0, 5000.0),
                jump_threshold_hz: self.tracking.jump_threshold_hz.clamp(1.0, MAX_FREQ_CEIL),
                min_confidence: self.tracking.min_confidence.clamp(0.0, 1.0),
                pitch_smoothing: self.tracking.pitch_smoothing.clamp(0.0, 0.99),
                silence_reset_ms: self.tracking.silence_reset_ms.clamp(10.0, 60_000.0),
            },
            detection: DetectionConfig {
                algorithm: self.detection.algorithm,
                yin_threshold: self.detection.yin_threshold.clamp(0.01, 0.5),
                interval_ms: self.detection.interval_ms.clamp(1.0, 100.0),
                volume_threshold_db: self.detection.volume_threshold_db.clamp(MIN_VOLUME_THRESHOLD_DB, 0.0),
                highpass_hz: self.detection.highpass_hz.clamp(20.0, 1000.0),
                lowpass_hz: self.detection.lowpass_hz.clamp(500.0, 20_000.0),
                dio: self.detection.dio.sanitized(),
            },
            output: OutputConfig {
                smoothing_ms: self.output.smoothing_ms.clamp(MIN_SMOOTHING_MS, MAX_SMOOTHING_MS),
                mix: self.output.mix.clamp(0.0, 1.0),
                lookahead_multiplier: self
                    .output
                    .lookahead_multiplier
                    .clamp(MIN_LOOKAHEAD_MULTIPLIER, MAX_LOOKAHEAD_MULTIPLIER),
            },
        }
    }
}
