//! Engine state published for the control thread
//!
//! The audio thread stores into [`FlattenAtomics`] once per block; readers
//! take a [`TelemetrySnapshot`] without locking. Fields are independent, so
//! a snapshot may mix values from adjacent blocks. The raw estimate is the
//! exception: its frequency and frame index are always read as a pair.

use std::sync::atomic::{fence, AtomicBool, AtomicU32, AtomicU64, Ordering};

use super::params::AtomicF32;
use crate::detection::{Algorithm, PitchEstimate};

/// A [`PitchEstimate`] that readers always see whole
///
/// Sequence-locked: one writer (the audio thread) never waits, readers retry
/// while a store is in flight.
pub struct AtomicPitchEstimate {
    sequence: AtomicU64,
    frequency_bits: AtomicU32,
    frame_index: AtomicU64,
}

impl AtomicPitchEstimate {
    pub fn new(estimate: PitchEstimate) -> Self {
        Self {
            sequence: AtomicU64::new(0),
            frequency_bits: AtomicU32::new(estimate.frequency_hz.to_bits()),
            frame_index: AtomicU64::new(estimate.frame_index),
        }
    }

    /// Publish a new estimate; single writer only
    pub fn store(&self, estimate: PitchEstimate) {
        let sequence = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(sequence.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        self.frequency_bits
            .store(estimate.frequency_hz.to_bits(), Ordering::Relaxed);
        self.frame_index.store(estimate.frame_index, Ordering::Relaxed);
        self.sequence.store(sequence.wrapping_add(2), Ordering::Release);
    }

    pub fn load(&self) -> PitchEstimate {
        loop {
            let before = self.sequence.load(Ordering::Acquire);
            if before & 1 == 0 {
                let frequency_hz = f32::from_bits(self.frequency_bits.load(Ordering::Relaxed));
                let frame_index = self.frame_index.load(Ordering::Relaxed);
                fence(Ordering::Acquire);
                if self.sequence.load(Ordering::Relaxed) == before {
                    return PitchEstimate {
                        frequency_hz,
                        frame_index,
                    };
                }
            }
            std::hint::spin_loop();
        }
    }
}

impl Default for AtomicPitchEstimate {
    fn default() -> Self {
        Self::new(PitchEstimate::default())
    }
}

/// Lock-free telemetry written by the engine
pub struct FlattenAtomics {
    /// Smoothed pitch from the stability tracker (0 = none)
    pub detected_pitch: AtomicF32,
    /// Most recent raw estimate with its analysis frame
    pub raw_estimate: AtomicPitchEstimate,
    /// Reference frequency the ratio is computed against
    pub effective_target: AtomicF32,
    /// Last ratio issued by the controller
    pub issued_ratio: AtomicF32,
    /// Ratio currently applied after the glide
    pub applied_ratio: AtomicF32,
    pub latch_locked: AtomicBool,
    pub locked_frequency: AtomicF32,
    /// Input RMS in dB
    pub input_level_db: AtomicF32,
    pub rejected_jumps: AtomicU64,
    pub starved_blocks: AtomicU64,
    pub warmed_up: AtomicBool,
    pub dio_prebuffering: AtomicBool,
    /// True while the DIO estimator is active
    pub dio_active: AtomicBool,
    pub blocks_processed: AtomicU64,
}

impl FlattenAtomics {
    pub fn new() -> Self {
        Self {
            detected_pitch: AtomicF32::new(0.0),
            raw_estimate: AtomicPitchEstimate::default(),
            effective_target: AtomicF32::new(0.0),
            issued_ratio: AtomicF32::new(1.0),
            applied_ratio: AtomicF32::new(1.0),
            latch_locked: AtomicBool::new(false),
            locked_frequency: AtomicF32::new(0.0),
            input_level_db: AtomicF32::new(-100.0),
            rejected_jumps: AtomicU64::new(0),
            starved_blocks: AtomicU64::new(0),
            warmed_up: AtomicBool::new(false),
            dio_prebuffering: AtomicBool::new(false),
            dio_active: AtomicBool::new(false),
            blocks_processed: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn detected_pitch(&self) -> f32 {
        self.detected_pitch.load()
    }

    #[inline]
    pub fn applied_ratio(&self) -> f32 {
        self.applied_ratio.load()
    }

    #[inline]
    pub fn is_latched(&self) -> bool {
        self.latch_locked.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn blocks_processed(&self) -> u64 {
        self.blocks_processed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            detected_pitch: self.detected_pitch.load(),
            raw_estimate: self.raw_estimate.load(),
            effective_target: self.effective_target.load(),
            issued_ratio: self.issued_ratio.load(),
            applied_ratio: self.applied_ratio.load(),
            latch_locked: self.latch_locked.load(Ordering::Relaxed),
            locked_frequency: self.locked_frequency.load(),
            input_level_db: self.input_level_db.load(),
            rejected_jumps: self.rejected_jumps.load(Ordering::Relaxed),
            starved_blocks: self.starved_blocks.load(Ordering::Relaxed),
            warmed_up: self.warmed_up.load(Ordering::Relaxed),
            dio_prebuffering: self.dio_prebuffering.load(Ordering::Relaxed),
            algorithm: if self.dio_active.load(Ordering::Relaxed) {
                Algorithm::Dio
            } else {
                Algorithm::Yin
            },
            blocks_processed: self.blocks_processed.load(Ordering::Relaxed),
        }
    }
}

impl Default for FlattenAtomics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`FlattenAtomics`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySnapshot {
    pub detected_pitch: f32,
    pub raw_estimate: PitchEstimate,
    pub effective_target: f32,
    pub issued_ratio: f32,
    pub applied_ratio: f32,
    pub latch_locked: bool,
    pub locked_frequency: f32,
    pub input_level_db: f32,
    pub rejected_jumps: u64,
    pub starved_blocks: u64,
    pub warmed_up: bool,
    pub dio_prebuffering: bool,
    pub algorithm: Algorithm,
    pub blocks_processed: u64,
}

impl TelemetrySnapshot {
    /// Semitones the shifter is currently moving the input by
    pub fn correction_semitones(&self) -> f32 {
        if self.applied_ratio > 0.0 {
            -12.0 * self.applied_ratio.log2()
        } else {
            0.0
        }
    }
}
