//! Jump rejection, confidence scoring and hold-time debounced smoothing

/// Deltas below this count as "very stable"
const STABLE_DELTA_HZ: f32 = 20.0;

/// Cap for the stability counter; confidence = count / cap
const MAX_STABLE_COUNT: u32 = 10;

/// Per-block tracker settings read from the parameter atomics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerSettings {
    pub jump_threshold_hz: f32,
    pub min_confidence: f32,
    /// Fraction of the previous smoothed value kept on each commit
    pub pitch_smoothing: f32,
    pub hold_ms: f32,
    pub silence_reset_ms: f32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            jump_threshold_hz: 300.0,
            min_confidence: 0.35,
            pitch_smoothing: 0.8,
            hold_ms: 500.0,
            silence_reset_ms: 2000.0,
        }
    }
}

/// What the tracker did with one candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackerEvent {
    /// `smoothed_pitch` moved to the contained value
    Committed(f32),
    /// Accepted but debounced: confidence too low and hold not expired
    Held,
    /// Jump at or above the threshold, discarded
    Rejected,
    /// No pitch, still inside the silence window
    Silence,
    /// The silence window just elapsed and the tracker returned to neutral
    SilenceReset,
}

/// Stability tracker fed once per analysis cycle
#[derive(Debug, Clone)]
pub struct PitchStabilityTracker {
    sample_rate: u32,
    last_valid_pitch: f32,
    stable_count: u32,
    frames_since_last_accepted: u32,
    smoothed_pitch: f32,
    silence_samples: u64,
    consecutive_rejections: u32,
    /// Diagnostic: total rejected jumps since construction
    rejected_jumps: u64,
}

impl PitchStabilityTracker {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            last_valid_pitch: 0.0,
            stable_count: 0,
            frames_since_last_accepted: 0,
            smoothed_pitch: 0.0,
            silence_samples: 0,
            consecutive_rejections: 0,
            rejected_jumps: 0,
        }
    }

    /// Current smoothed pitch, 0 when neutral
    #[inline]
    pub fn smoothed_pitch(&self) -> f32 {
        self.smoothed_pitch
    }

    #[inline]
    pub fn last_valid_pitch(&self) -> f32 {
        self.last_valid_pitch
    }

    /// Confidence in `[0, 1]`
    #[inline]
    pub fn confidence(&self) -> f32 {
        self.stable_count as f32 / MAX_STABLE_COUNT as f32
    }

    #[inline]
    pub fn rejected_jumps(&self) -> u64 {
        self.rejected_jumps
    }

    /// Return to neutral; the rejected-jump counter is kept
    pub fn reset(&mut self) {
        self.last_valid_pitch = 0.0;
        self.stable_count = 0;
        self.frames_since_last_accepted = 0;
        self.smoothed_pitch = 0.0;
        self.silence_samples = 0;
        self.consecutive_rejections = 0;
    }

    /// Feed one candidate (0 = no pitch) covering `cadence_samples` of audio
    pub fn observe(&mut self, candidate: f32, cadence_samples: usize, settings: &TrackerSettings) -> TrackerEvent {
        if candidate <= 0.0 {
            return self.observe_silence(cadence_samples, settings);
        }
        self.silence_samples = 0;

        let cadence_ms = cadence_samples as f32 * 1000.0 / self.sample_rate as f32;
        let hold_frames = if cadence_ms > 0.0 {
            (settings.hold_ms.max(0.0) / cadence_ms) as u32
        } else {
            0
        };

        if self.last_valid_pitch <= 0.0 {
            return self.initialize(candidate);
        }

        let delta = (candidate - self.last_valid_pitch).abs();
        if delta >= settings.jump_threshold_hz {
            // A run of consistent "jumps" longer than the hold time is a real change
            if self.consecutive_rejections >= hold_frames.max(1) {
                return self.initialize(candidate);
            }
            self.consecutive_rejections += 1;
            self.rejected_jumps += 1;
            return TrackerEvent::Rejected;
        }
        self.consecutive_rejections = 0;

        if delta < STABLE_DELTA_HZ {
            self.stable_count = (self.stable_count + 1).min(MAX_STABLE_COUNT);
        } else {
            self.stable_count = self.stable_count.saturating_sub(1);
        }
        self.frames_since_last_accepted += 1;

        if self.confidence() >= settings.min_confidence || self.frames_since_last_accepted > hold_frames {
            let keep = settings.pitch_smoothing.clamp(0.0, 0.99);
            self.smoothed_pitch += (candidate - self.smoothed_pitch) * (1.0 - keep);
            self.last_valid_pitch = candidate;
            self.frames_since_last_accepted = 0;
            TrackerEvent::Committed(self.smoothed_pitch)
        } else {
            TrackerEvent::Held
        }
    }

    fn initialize(&mut self, candidate: f32) -> TrackerEvent {
        self.last_valid_pitch = candidate;
        self.smoothed_pitch = candidate;
        self.stable_count = 0;
        self.frames_since_last_accepted = 0;
        self.consecutive_rejections = 0;
        TrackerEvent::Committed(candidate)
    }

    fn observe_silence(&mut self, cadence_samples: usize, settings: &TrackerSettings) -> TrackerEvent {
        // Rejections either side of a gap are not one run
        self.consecutive_rejections = 0;

        let limit = (settings.silence_reset_ms.max(0.0) as f64 * self.sample_rate as f64 / 1000.0) as u64;
        let before = self.silence_samples;
        self.silence_samples = self.silence_samples.saturating_add(cadence_samples as u64);

        if before < limit && self.silence_samples >= limit {
            self.last_valid_pitch = 0.0;
            self.stable_count = 0;
            self.frames_since_last_accepted = 0;
            self.smoothed_pitch = 0.0;
            return TrackerEvent::SilenceReset;
        }
        TrackerEvent::Silence
    }
}
