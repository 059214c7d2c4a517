//! Lock-free parameters shared between the control thread and the engine
//!
//! The control thread stores; the engine takes one [`ParamSnapshot`] per
//! block so every stage of a block sees the same values. All accesses use
//! `Ordering::Relaxed`: each value is independent and only visibility is
//! needed.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::FlattenerConfig;
use crate::detection::{EstimatorTuning, FrequencyBounds};
use crate::ratio::RatioSettings;
use crate::tracking::TrackerSettings;

/// f32 stored as its bit pattern in an `AtomicU32`
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    #[inline]
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Per-block parameters, written by `FlattenController`
pub struct FlattenParams {
    pub target_pitch: AtomicF32,
    pub manual_override: AtomicBool,
    pub override_freq: AtomicF32,
    pub latch_enabled: AtomicBool,
    pub hard_flatten: AtomicBool,
    pub sensitivity_pct: AtomicF32,

    pub min_freq: AtomicF32,
    pub max_freq: AtomicF32,
    pub hold_ms: AtomicF32,
    pub jump_threshold_hz: AtomicF32,
    pub min_confidence: AtomicF32,
    pub pitch_smoothing: AtomicF32,
    pub silence_reset_ms: AtomicF32,

    pub yin_threshold: AtomicF32,
    pub interval_ms: AtomicF32,
    pub volume_threshold_db: AtomicF32,
    pub highpass_hz: AtomicF32,
    pub lowpass_hz: AtomicF32,

    pub smoothing_ms: AtomicF32,
    pub mix: AtomicF32,

    /// Full reset request, consumed at the next block start
    pub reset: AtomicBool,
    /// Momentary latch reset, consumed at the next block start
    pub reset_latch: AtomicBool,
}

impl FlattenParams {
    pub fn new(config: &FlattenerConfig) -> Self {
        let params = Self {
            target_pitch: AtomicF32::default(),
            manual_override: AtomicBool::new(false),
            override_freq: AtomicF32::default(),
            latch_enabled: AtomicBool::new(true),
            hard_flatten: AtomicBool::new(false),
            sensitivity_pct: AtomicF32::default(),
            min_freq: AtomicF32::default(),
            max_freq: AtomicF32::default(),
            hold_ms: AtomicF32::default(),
            jump_threshold_hz: AtomicF32::default(),
            min_confidence: AtomicF32::default(),
            pitch_smoothing: AtomicF32::default(),
            silence_reset_ms: AtomicF32::default(),
            yin_threshold: AtomicF32::default(),
            interval_ms: AtomicF32::default(),
            volume_threshold_db: AtomicF32::default(),
            highpass_hz: AtomicF32::default(),
            lowpass_hz: AtomicF32::default(),
            smoothing_ms: AtomicF32::default(),
            mix: AtomicF32::default(),
            reset: AtomicBool::new(false),
            reset_latch: AtomicBool::new(false),
        };
        params.apply(config);
        params
    }

    /// Store every per-block value from `config` (sanitized first)
    pub fn apply(&self, config: &FlattenerConfig) {
        let c = config.sanitized();

        self.target_pitch.store(c.flatten.target_pitch);
        self.manual_override.store(c.flatten.manual_override, Ordering::Relaxed);
        self.override_freq.store(c.flatten.override_freq);
        self.latch_enabled.store(c.flatten.latch_enabled, Ordering::Relaxed);
        self.hard_flatten.store(c.flatten.hard_flatten, Ordering::Relaxed);
        self.sensitivity_pct.store(c.flatten.sensitivity_pct);

        self.min_freq.store(c.tracking.min_freq);
        self.max_freq.store(c.tracking.max_freq);
        self.hold_ms.store(c.tracking.hold_ms);
        self.jump_threshold_hz.store(c.tracking.jump_threshold_hz);
        self.min_confidence.store(c.tracking.min_confidence);
        self.pitch_smoothing.store(c.tracking.pitch_smoothing);
        self.silence_reset_ms.store(c.tracking.silence_reset_ms);

        self.yin_threshold.store(c.detection.yin_threshold);
        self.interval_ms.store(c.detection.interval_ms);
        self.volume_threshold_db.store(c.detection.volume_threshold_db);
        self.highpass_hz.store(c.detection.highpass_hz);
        self.lowpass_hz.store(c.detection.lowpass_hz);

        self.smoothing_ms.store(c.output.smoothing_ms);
        self.mix.store(c.output.mix);
    }

    /// Read all per-block values at once
    pub fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot {
            target_pitch: self.target_pitch.load(),
            manual_override: self.manual_override.load(Ordering::Relaxed),
            override_freq: self.override_freq.load(),
            latch_enabled: self.latch_enabled.load(Ordering::Relaxed),
            hard_flatten: self.hard_flatten.load(Ordering::Relaxed),
            sensitivity_pct: self.sensitivity_pct.load(),
            min_freq: self.min_freq.load(),
            max_freq: self.max_freq.load(),
            hold_ms: self.hold_ms.load(),
            jump_threshold_hz: self.jump_threshold_hz.load(),
            min_confidence: self.min_confidence.load(),
            pitch_smoothing: self.pitch_smoothing.load(),
            silence_reset_ms: self.silence_reset_ms.load(),
            yin_threshold: self.yin_threshold.load(),
            interval_ms: self.interval_ms.load(),
            volume_threshold_db: self.volume_threshold_db.load(),
            highpass_hz: self.highpass_hz.load(),
            lowpass_hz: self.lowpass_hz.load(),
            smoothing_ms: self.smoothing_ms.load(),
            mix: self.mix.load(),
        }
    }

    /// Consume a pending full reset
    #[inline]
    pub fn take_reset(&self) -> bool {
        self.reset.swap(false, Ordering::Relaxed)
    }

    /// Consume a pending latch reset
    #[inline]
    pub fn take_reset_latch(&self) -> bool {
        self.reset_latch.swap(false, Ordering::Relaxed)
    }
}

impl Default for FlattenParams {
    fn default() -> Self {
        Self::new(&FlattenerConfig::default())
    }
}

/// Values of [`FlattenParams`] for one block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSnapshot {
    pub target_pitch: f32,
    pub manual_override: bool,
    pub override_freq: f32,
    pub latch_enabled: bool,
    pub hard_flatten: bool,
    pub sensitivity_pct: f32,
    pub min_freq: f32,
    pub max_freq: f32,
    pub hold_ms: f32,
    pub jump_threshold_hz: f32,
    pub min_confidence: f32,
    pub pitch_smoothing: f32,
    pub silence_reset_ms: f32,
    pub yin_threshold: f32,
    pub interval_ms: f32,
    pub volume_threshold_db: f32,
    pub highpass_hz: f32,
    pub lowpass_hz: f32,
    pub smoothing_ms: f32,
    pub mix: f32,
}

impl ParamSnapshot {
    pub fn bounds(&self) -> FrequencyBounds {
        FrequencyBounds::new(self.min_freq, self.max_freq).clamped()
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            jump_threshold_hz: self.jump_threshold_hz,
            min_confidence: self.min_confidence,
            pitch_smoothing: self.pitch_smoothing,
            hold_ms: self.hold_ms,
            silence_reset_ms: self.silence_reset_ms,
        }
    }

    pub fn ratio_settings(&self) -> RatioSettings {
        RatioSettings {
            target_pitch: self.target_pitch,
            manual_override: self.manual_override,
            override_freq: self.override_freq,
            latch_enabled: self.latch_enabled,
            hard_flatten: self.hard_flatten,
            sensitivity_pct: self.sensitivity_pct,
            smoothing_ms: self.smoothing_ms,
        }
    }

    pub fn tuning(&self, gate_open: bool) -> EstimatorTuning {
        EstimatorTuning {
            bounds: self.bounds(),
            interval_ms: self.interval_ms,
            yin_threshold: self.yin_threshold,
            gate_open,
        }
    }
}
