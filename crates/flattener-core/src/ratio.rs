//! Flatten ratio computation and glide
//!
//! The ratio is source/target: 0.5 means the input sits an octave below the
//! reference, so the shifter must scale pitch by 1/0.5 = 2.

use crate::tracking::LatchState;

pub const MIN_RATIO: f32 = 0.25;
pub const MAX_RATIO: f32 = 4.0;

/// Relative change needed before a new ratio is issued
pub const RATIO_ISSUE_THRESHOLD: f32 = 0.05;

pub const MIN_SMOOTHING_MS: f32 = 5.0;
pub const MAX_SMOOTHING_MS: f32 = 2000.0;

/// Glide rate limit in ratio units per second
const GLIDE_MAX_RATE: f32 = 0.5;

/// Snap distance for the glide
const GLIDE_EPSILON: f32 = 1e-5;

/// Controller inputs read from the parameter snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioSettings {
    pub target_pitch: f32,
    pub manual_override: bool,
    pub override_freq: f32,
    pub latch_enabled: bool,
    pub hard_flatten: bool,
    /// Soft flatten dead zone in percent
    pub sensitivity_pct: f32,
    pub smoothing_ms: f32,
}

impl Default for RatioSettings {
    fn default() -> Self {
        Self {
            target_pitch: 440.0,
            manual_override: false,
            override_freq: 440.0,
            latch_enabled: true,
            hard_flatten: false,
            sensitivity_pct: 1.0,
            smoothing_ms: 150.0,
        }
    }
}

impl RatioSettings {
    /// Frequency the input is flattened towards
    pub fn reference_frequency(&self, latch: LatchState) -> f32 {
        match latch {
            LatchState::Locked(freq) if self.latch_enabled && !self.manual_override => freq,
            _ if self.manual_override => self.override_freq,
            _ => self.target_pitch,
        }
    }

    /// Soft flatten applies only against a live lock
    fn soft_flatten(&self, latch: LatchState) -> bool {
        self.latch_enabled && latch.is_locked() && !self.manual_override && !self.hard_flatten
    }

    fn smoothing_secs(&self) -> f32 {
        self.smoothing_ms.clamp(MIN_SMOOTHING_MS, MAX_SMOOTHING_MS) / 1000.0
    }
}

/// A ratio change for the engine to glide towards
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioCommand {
    /// Compensated pitch the ratio was computed from (0 = no pitch)
    pub source_pitch: f32,
    /// Reference frequency the ratio was computed against
    pub target_pitch: f32,
    /// source / target after smoothing and clamping
    pub ratio: f32,
    /// Ratio issued before this one, `None` on the first issue
    pub previous_ratio: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct PitchRatioController {
    smoothed_ratio: f32,
    last_issued: Option<f32>,
}

impl Default for PitchRatioController {
    fn default() -> Self {
        Self::new()
    }
}

impl PitchRatioController {
    pub fn new() -> Self {
        Self {
            smoothed_ratio: 1.0,
            last_issued: None,
        }
    }

    #[inline]
    pub fn smoothed_ratio(&self) -> f32 {
        self.smoothed_ratio
    }

    pub fn last_issued(&self) -> Option<f32> {
        self.last_issued
    }

    /// Return the smoothing state to unity (latch reset, silence reset)
    pub fn reset_smoothing(&mut self) {
        self.smoothed_ratio = 1.0;
    }

    /// Full reset; the next update issues unconditionally
    pub fn reset(&mut self) {
        self.smoothed_ratio = 1.0;
        self.last_issued = None;
    }

    /// Run once per block with the compensated pitch (0 = no pitch)
    pub fn update(
        &mut self,
        compensated: f32,
        latch: LatchState,
        settings: &RatioSettings,
        block_secs: f32,
    ) -> Option<RatioCommand> {
        let reference = settings.reference_frequency(latch);

        if compensated <= 0.0 || reference <= 0.0 {
            self.smoothed_ratio = 1.0;
            if self.last_issued == Some(1.0) {
                return None;
            }
            let previous_ratio = self.last_issued.replace(1.0);
            return Some(RatioCommand {
                source_pitch: 0.0,
                target_pitch: reference,
                ratio: 1.0,
                previous_ratio,
            });
        }

        let raw = if settings.soft_flatten(latch) {
            let ratio = compensated / reference;
            let variation_pct = (1.0 - ratio).abs() * 100.0;
            if variation_pct > settings.sensitivity_pct {
                ratio
            } else {
                1.0
            }
        } else {
            compensated / reference
        };

        let keep = (-block_secs.max(0.0) / settings.smoothing_secs()).exp();
        self.smoothed_ratio += (raw - self.smoothed_ratio) * (1.0 - keep);
        self.smoothed_ratio = self.smoothed_ratio.clamp(MIN_RATIO, MAX_RATIO);

        let issue = match self.last_issued {
            None => true,
            Some(last) => (self.smoothed_ratio - last).abs() / last > RATIO_ISSUE_THRESHOLD,
        };
        if !issue {
            return None;
        }
        let previous_ratio = self.last_issued.replace(self.smoothed_ratio);
        Some(RatioCommand {
            source_pitch: compensated,
            target_pitch: reference,
            ratio: self.smoothed_ratio,
            previous_ratio,
        })
    }
}

/// Rate-limited approach from the applied ratio to the issued one
#[derive(Debug, Clone)]
pub struct RatioGlide {
    applied: f32,
    target: f32,
}

impl Default for RatioGlide {
    fn default() -> Self {
        Self {
            applied: 1.0,
            target: 1.0,
        }
    }
}

impl RatioGlide {
    #[inline]
    pub fn applied(&self) -> f32 {
        self.applied
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn set_target(&mut self, ratio: f32) {
        self.target = ratio.clamp(MIN_RATIO, MAX_RATIO);
    }

    /// Largest per-block change for a block of `block_secs`
    #[inline]
    pub fn max_step(block_secs: f32) -> f32 {
        GLIDE_MAX_RATE * block_secs
    }

    /// Advance one block; returns the new applied ratio when it changed
    pub fn step(&mut self, block_secs: f32, smoothing_ms: f32) -> Option<f32> {
        let distance = self.target - self.applied;
        if distance == 0.0 {
            return None;
        }
        if distance.abs() < GLIDE_EPSILON {
            self.applied = self.target;
            return Some(self.applied);
        }

        let smoothing_secs = smoothing_ms.clamp(MIN_SMOOTHING_MS, MAX_SMOOTHING_MS) / 1000.0;
        let alpha = 1.0 - (-block_secs.max(0.0) / smoothing_secs).exp();
        let limit = Self::max_step(block_secs);
        self.applied += (distance * alpha).clamp(-limit, limit);
        Some(self.applied)
    }

    pub fn reset(&mut self) {
        self.applied = 1.0;
        self.target = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK_SECS: f32 = 512.0 / 48000.0;

    fn unlatched() -> RatioSettings {
        RatioSettings {
            latch_enabled: false,
            ..RatioSettings::default()
        }
    }

    #[test]
    fn test_reference_frequency_priority() {
        let mut settings = RatioSettings::default();
        let locked = LatchState::Locked(300.0);
        assert_eq!(settings.reference_frequency(locked), 300.0);
        assert_eq!(settings.reference_frequency(LatchState::Unlocked), 440.0);

        settings.manual_override = true;
        settings.override_freq = 250.0;
        assert_eq!(settings.reference_frequency(locked), 250.0);

        settings.manual_override = false;
        settings.latch_enabled = false;
        assert_eq!(settings.reference_frequency(locked), 440.0);
    }

    #[test]
    fn test_issued_ratio_converges_an_octave_below_target() {
        let mut controller = PitchRatioController::new();
        let settings = unlatched();
        let mut last = None;
        for _ in 0..400 {
            if let Some(command) = controller.update(220.0, LatchState::Unlocked, &settings, BLOCK_SECS) {
                last = Some(command.ratio);
            }
        }
        assert!((controller.smoothed_ratio() - 0.5).abs() < 1e-3);
        let issued = last.unwrap_or(0.0);
        assert!((issued - 0.5).abs() / issued <= RATIO_ISSUE_THRESHOLD, "issued {}", issued);
    }

    #[test]
    fn test_first_call_always_issues() {
        let mut controller = PitchRatioController::new();
        let command = controller.update(440.0, LatchState::Unlocked, &unlatched(), BLOCK_SECS);
        assert_eq!(command.map(|c| c.ratio), Some(1.0));
        assert!(controller
            .update(441.0, LatchState::Unlocked, &unlatched(), BLOCK_SECS)
            .is_none());
    }

    #[test]
    fn test_command_records_source_and_target() {
        let mut controller = PitchRatioController::new();
        let settings = RatioSettings {
            smoothing_ms: 5.0,
            ..RatioSettings::default()
        };
        let locked = LatchState::Locked(300.0);

        let first = controller.update(330.0, locked, &settings, BLOCK_SECS).unwrap();
        assert_eq!(first.source_pitch, 330.0);
        assert_eq!(first.target_pitch, 300.0);
        assert_eq!(first.previous_ratio, None);

        let mut next = None;
        for _ in 0..20 {
            if let Some(command) = controller.update(400.0, locked, &settings, BLOCK_SECS) {
                next = Some(command);
                break;
            }
        }
        let next = next.unwrap();
        assert_eq!(next.source_pitch, 400.0);
        assert_eq!(next.previous_ratio, Some(first.ratio));
        assert!(next.ratio > first.ratio);

        // Losing the pitch issues unity with no source
        let silent = controller.update(0.0, locked, &settings, BLOCK_SECS).unwrap();
        assert_eq!(silent.source_pitch, 0.0);
        assert_eq!(silent.ratio, 1.0);
    }

    #[test]
    fn test_ratio_always_within_bounds() {
        let settings = RatioSettings {
            target_pitch: 40.0,
            smoothing_ms: 5.0,
            ..unlatched()
        };
        let mut controller = PitchRatioController::new();
        for &pitch in &[4000.0f32, 10.0, 2000.0, 1.0, 3999.0] {
            for _ in 0..100 {
                controller.update(pitch, LatchState::Unlocked, &settings, BLOCK_SECS);
                let ratio = controller.smoothed_ratio();
                assert!((MIN_RATIO..=MAX_RATIO).contains(&ratio), "ratio {}", ratio);
            }
        }
        assert_eq!(controller.smoothed_ratio(), MAX_RATIO);
    }

    #[test]
    fn test_soft_flatten_dead_zone() {
        let settings = RatioSettings {
            sensitivity_pct: 2.0,
            smoothing_ms: 5.0,
            ..RatioSettings::default()
        };
        let locked = LatchState::Locked(300.0);

        let mut controller = PitchRatioController::new();
        for _ in 0..50 {
            controller.update(303.0, locked, &settings, BLOCK_SECS);
        }
        assert!((controller.smoothed_ratio() - 1.0).abs() < 1e-6);

        for _ in 0..50 {
            controller.update(330.0, locked, &settings, BLOCK_SECS);
        }
        assert!((controller.smoothed_ratio() - 1.1).abs() < 1e-3);

        // Hard flatten ignores the dead zone
        let hard = RatioSettings {
            hard_flatten: true,
            ..settings
        };
        for _ in 0..50 {
            controller.update(303.0, locked, &hard, BLOCK_SECS);
        }
        assert!((controller.smoothed_ratio() - 1.01).abs() < 1e-3);
    }

    #[test]
    fn test_no_pitch_returns_to_unity() {
        let mut controller = PitchRatioController::new();
        let settings = unlatched();
        for _ in 0..200 {
            controller.update(220.0, LatchState::Unlocked, &settings, BLOCK_SECS);
        }
        let command = controller.update(0.0, LatchState::Unlocked, &settings, BLOCK_SECS);
        assert_eq!(command.map(|c| c.ratio), Some(1.0));
        assert_eq!(controller.smoothed_ratio(), 1.0);
        assert!(controller.update(0.0, LatchState::Unlocked, &settings, BLOCK_SECS).is_none());
    }

    #[test]
    fn test_glide_is_rate_limited() {
        let mut glide = RatioGlide::default();
        glide.set_target(0.5);
        let limit = RatioGlide::max_step(BLOCK_SECS);

        let mut previous = glide.applied();
        let mut steps = 0;
        while let Some(applied) = glide.step(BLOCK_SECS, 150.0) {
            assert!((applied - previous).abs() <= limit + 1e-6);
            previous = applied;
            steps += 1;
            if steps > 10_000 {
                break;
            }
        }
        assert_eq!(glide.applied(), 0.5);
        // 0.5 ratio units at 0.5/s takes at least a second
        assert!(steps as f32 * BLOCK_SECS >= 1.0);
    }

    #[test]
    fn test_glide_target_clamped() {
        let mut glide = RatioGlide::default();
        glide.set_target(9.0);
        assert_eq!(glide.target(), MAX_RATIO);
        glide.reset();
        assert_eq!(glide.applied(), 1.0);
        assert!(glide.step(BLOCK_SECS, 150.0).is_none());
    }
}
