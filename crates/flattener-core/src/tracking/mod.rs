//! Pitch tracking between raw estimates and the ratio controller
//!
//! Raw estimate → [`PitchStabilityTracker`] (jump rejection, confidence,
//! smoothing) → [`BasePitchLatch`] (locks on a settled base pitch) and
//! [`DopplerCompensator`] (damping and glide handling).

mod doppler;
mod latch;
mod stability;

pub use doppler::{DopplerCompensator, DopplerEstimate, PitchTrajectory, TRAJECTORY_CAPACITY};
pub use latch::{BasePitchLatch, LatchState, LATCH_MAX_DEVIATION_HZ, LATCH_WINDOW};
pub use stability::{PitchStabilityTracker, TrackerEvent, TrackerSettings};
