//! Pitch detection
//!
//! Two interchangeable estimators behind a tagged union:
//! - **YIN**: autocorrelation-difference, cheap, accurate on clean material
//! - **DIO**: multi-band event-interval analysis over a rolling window,
//!   robust on noisy material at the cost of a prebuffer delay
//!
//! The variant is chosen when the estimator is built. Switching algorithm
//! means building a new `PitchEstimator` off the audio thread and swapping
//! it in through the engine command queue.

mod dio;
mod filter;
mod yin;

use serde::{Deserialize, Serialize};

pub use dio::{DioConfig, DioEstimator, DIO_MAX_BUFFER_SECS, DIO_MIN_BUFFER_SECS};
pub use filter::DetectionFilter;
pub use yin::{YinEstimator, DEFAULT_YIN_THRESHOLD, YIN_SANITY_MAX_HZ, YIN_SANITY_MIN_HZ};

/// Lowest detection frequency accepted from configuration
pub const MIN_FREQ_FLOOR: f32 = 20.0;
/// Highest detection frequency accepted from configuration
pub const MAX_FREQ_CEIL: f32 = 4000.0;

/// Detection algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Algorithm {
    /// Autocorrelation-difference (YIN)
    #[default]
    Yin,
    /// Multi-band periodicity (DIO)
    Dio,
}

impl Algorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Yin => "YIN",
            Algorithm::Dio => "DIO",
        }
    }
}

/// Detection frequency range in Hz
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyBounds {
    pub min_hz: f32,
    pub max_hz: f32,
}

impl FrequencyBounds {
    pub fn new(min_hz: f32, max_hz: f32) -> Self {
        Self { min_hz, max_hz }
    }

    /// Clamp into `[MIN_FREQ_FLOOR, MAX_FREQ_CEIL]` with `max > min`
    pub fn clamped(&self) -> Self {
        let min_hz = self.min_hz.clamp(MIN_FREQ_FLOOR, MAX_FREQ_CEIL - 1.0);
        let max_hz = self.max_hz.clamp(min_hz + 1.0, MAX_FREQ_CEIL);
        Self { min_hz, max_hz }
    }

    #[inline]
    pub fn contains(&self, frequency: f32) -> bool {
        frequency >= self.min_hz && frequency <= self.max_hz
    }
}

/// One analysis result
///
/// `frequency_hz` is 0 when the analysis found no pitch. `frame_index`
/// counts analyses and never goes backwards, even across estimator swaps.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PitchEstimate {
    pub frequency_hz: f32,
    pub frame_index: u64,
}

impl PitchEstimate {
    #[inline]
    pub fn is_voiced(&self) -> bool {
        self.frequency_hz > 0.0
    }
}

/// Convert an analysis interval to a hop in samples
pub(crate) fn interval_to_hop(sample_rate: u32, interval_ms: f32) -> usize {
    let hop = (sample_rate as f32 * interval_ms.clamp(1.0, 100.0) / 1000.0).round() as usize;
    hop.max(16)
}

/// Per-block inputs shared by both estimator variants
#[derive(Debug, Clone, Copy)]
pub struct EstimatorTuning {
    pub bounds: FrequencyBounds,
    pub interval_ms: f32,
    pub yin_threshold: f32,
    /// False when the block is below the volume gate
    pub gate_open: bool,
}

/// The active pitch estimator
pub enum PitchEstimator {
    Yin(YinEstimator),
    Dio(DioEstimator),
}

impl PitchEstimator {
    /// Build the estimator for `algorithm` (allocates)
    pub fn build(
        algorithm: Algorithm,
        sample_rate: u32,
        interval_ms: f32,
        dio: DioConfig,
        bounds: FrequencyBounds,
    ) -> Self {
        match algorithm {
            Algorithm::Yin => PitchEstimator::Yin(YinEstimator::new(sample_rate, interval_ms)),
            Algorithm::Dio => PitchEstimator::Dio(DioEstimator::new(sample_rate, dio, bounds)),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            PitchEstimator::Yin(_) => Algorithm::Yin,
            PitchEstimator::Dio(_) => Algorithm::Dio,
        }
    }

    /// True while DIO is still filling its rolling window
    pub fn is_prebuffering(&self) -> bool {
        match self {
            PitchEstimator::Yin(_) => false,
            PitchEstimator::Dio(dio) => !dio.is_filled(),
        }
    }

    pub fn reset(&mut self) {
        match self {
            PitchEstimator::Yin(yin) => yin.reset(),
            PitchEstimator::Dio(dio) => dio.reset(),
        }
    }

    /// Feed one block of filtered mono samples
    ///
    /// `emit(estimate, cadence_samples)` receives every estimate produced by
    /// this block; `cadence_samples` is the audio time the estimate covers.
    /// `frame_index` holds the index of the last emitted estimate and is
    /// advanced once per analysis.
    pub fn analyze_block<F>(&mut self, mono: &[f32], tuning: &EstimatorTuning, frame_index: &mut u64, mut emit: F)
    where
        F: FnMut(PitchEstimate, usize),
    {
        let emit = |frequency_hz: f32, cadence: usize| {
            *frame_index += 1;
            emit(
                PitchEstimate {
                    frequency_hz,
                    frame_index: *frame_index,
                },
                cadence,
            );
        };
        match self {
            PitchEstimator::Yin(yin) => {
                yin.set_threshold(tuning.yin_threshold);
                yin.set_interval_ms(tuning.interval_ms);
                yin.analyze_block(mono, tuning.bounds, tuning.gate_open, emit);
            }
            PitchEstimator::Dio(dio) => {
                let hop = interval_to_hop(dio.sample_rate(), tuning.interval_ms);
                dio.analyze_block(mono, hop, tuning.bounds, tuning.gate_open, emit);
            }
        }
    }
}
