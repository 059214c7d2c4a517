//! Doppler-style compensation for sliding pitch
//!
//! A one-pole damped pitch follows steady notes. When the trajectory shows a
//! fast glide the trailing average is used instead so the ratio lags the
//! slide rather than chasing every block.

/// Blocks kept in the trajectory
pub const TRAJECTORY_CAPACITY: usize = 20;

/// Entries needed before velocity is trusted
const MIN_TRAJECTORY: usize = 5;

/// Entries averaged for the trailing average
const TRAILING_WINDOW: usize = 10;

/// Damping weight kept from the previous value
const DAMPING: f32 = 0.8;

/// Above this |velocity| (Hz/s) the trailing average wins
const VELOCITY_THRESHOLD_HZ_PER_SEC: f32 = 20.0;

/// Fixed-capacity history of damped pitches, oldest first
#[derive(Debug, Clone)]
pub struct PitchTrajectory {
    values: [f32; TRAJECTORY_CAPACITY],
    start: usize,
    len: usize,
}

impl Default for PitchTrajectory {
    fn default() -> Self {
        Self {
            values: [0.0; TRAJECTORY_CAPACITY],
            start: 0,
            len: 0,
        }
    }
}

impl PitchTrajectory {
    pub fn push(&mut self, value: f32) {
        if self.len < TRAJECTORY_CAPACITY {
            self.values[(self.start + self.len) % TRAJECTORY_CAPACITY] = value;
            self.len += 1;
        } else {
            self.values[self.start] = value;
            self.start = (self.start + 1) % TRAJECTORY_CAPACITY;
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Entry `back` places from the newest (0 = newest)
    fn recent(&self, back: usize) -> f32 {
        self.values[(self.start + self.len - 1 - back) % TRAJECTORY_CAPACITY]
    }

    /// Mean of the newest `count` entries
    pub fn trailing_average(&self, count: usize) -> f32 {
        let count = count.min(self.len);
        if count == 0 {
            return 0.0;
        }
        (0..count).map(|back| self.recent(back)).sum::<f32>() / count as f32
    }

    pub fn clear(&mut self) {
        self.start = 0;
        self.len = 0;
    }
}

/// Motion estimate for one block
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DopplerEstimate {
    /// Pitch handed to the ratio controller
    pub compensated: f32,
    pub velocity: f32,
    pub acceleration: f32,
}

#[derive(Debug, Clone, Default)]
pub struct DopplerCompensator {
    damped: f32,
    trajectory: PitchTrajectory,
}

impl DopplerCompensator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the block's smoothed pitch; `block_secs` is the block duration
    pub fn update(&mut self, pitch: f32, block_secs: f32) -> DopplerEstimate {
        if pitch <= 0.0 {
            self.damped = 0.0;
            return DopplerEstimate::default();
        }

        self.damped = if self.damped > 0.0 {
            DAMPING * self.damped + (1.0 - DAMPING) * pitch
        } else {
            pitch
        };
        self.trajectory.push(self.damped);

        if self.trajectory.len() < MIN_TRAJECTORY || block_secs <= 0.0 {
            return DopplerEstimate {
                compensated: self.damped,
                ..DopplerEstimate::default()
            };
        }

        let t = &self.trajectory;
        let velocity = (t.recent(0) - t.recent(1)) / block_secs;
        let previous_velocity = (t.recent(1) - t.recent(2)) / block_secs;
        let acceleration = (velocity - previous_velocity) / block_secs;

        let compensated = if velocity.abs() > VELOCITY_THRESHOLD_HZ_PER_SEC {
            t.trailing_average(TRAILING_WINDOW)
        } else {
            self.damped
        };

        DopplerEstimate {
            compensated,
            velocity,
            acceleration,
        }
    }

    #[inline]
    pub fn damped(&self) -> f32 {
        self.damped
    }

    pub fn trajectory(&self) -> &PitchTrajectory {
        &self.trajectory
    }

    /// Clear damping and trajectory (latch reset, silence reset)
    pub fn reset(&mut self) {
        self.damped = 0.0;
        self.trajectory.clear();
    }
}
