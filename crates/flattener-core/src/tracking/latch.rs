//! Base-pitch latch
//!
//! Watches committed pitches and locks onto the first stretch of five that
//! agree to within 10Hz mean absolute deviation. Once locked it only
//! unlocks through [`BasePitchLatch::reset`].

/// Number of committed values considered for locking
pub const LATCH_WINDOW: usize = 5;

/// Mean absolute deviation below which the window counts as settled
pub const LATCH_MAX_DEVIATION_HZ: f32 = 10.0;

/// Latch state as seen by the ratio controller and telemetry
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LatchState {
    #[default]
    Unlocked,
    Locked(f32),
}

impl LatchState {
    #[inline]
    pub fn is_locked(&self) -> bool {
        matches!(self, LatchState::Locked(_))
    }

    /// Locked frequency, or 0 when unlocked
    #[inline]
    pub fn frequency(&self) -> f32 {
        match self {
            LatchState::Locked(freq) => *freq,
            LatchState::Unlocked => 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BasePitchLatch {
    state: LatchState,
    recent: [f32; LATCH_WINDOW],
    len: usize,
    next: usize,
}

impl BasePitchLatch {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> LatchState {
        self.state
    }

    /// Observe a committed smoothed pitch; returns true on the transition to locked
    pub fn observe(&mut self, committed: f32) -> bool {
        if self.state.is_locked() || committed <= 0.0 {
            return false;
        }

        self.recent[self.next] = committed;
        self.next = (self.next + 1) % LATCH_WINDOW;
        self.len = (self.len + 1).min(LATCH_WINDOW);
        if self.len < LATCH_WINDOW {
            return false;
        }

        let mean = self.recent.iter().sum::<f32>() / LATCH_WINDOW as f32;
        let deviation = self.recent.iter().map(|v| (v - mean).abs()).sum::<f32>() / LATCH_WINDOW as f32;
        if deviation < LATCH_MAX_DEVIATION_HZ {
            self.state = LatchState::Locked(mean);
            return true;
        }
        false
    }

    /// Unlock and forget the observation window
    pub fn reset(&mut self) {
        self.state = LatchState::Unlocked;
        self.recent = [0.0; LATCH_WINDOW];
        self.len = 0;
        self.next = 0;
    }
}
