//! Real-time engine, its control handle and the plumbing between them
//!
//! - [`FlattenEngine`]: owned by the audio callback
//! - [`FlattenController`]: owned by the control thread
//! - [`FlattenParams`] / [`FlattenAtomics`]: lock-free values in each direction
//! - [`EngineCommand`]: queued component swaps

mod command;
mod controller;
#[allow(clippy::module_inception)]
mod engine;
pub mod gc;
mod lookahead;
mod params;
mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use basedrop::Owned;

pub use command::{command_channel, EngineCommand, COMMAND_QUEUE_CAPACITY};
pub use controller::FlattenController;
pub use engine::FlattenEngine;
pub use lookahead::{FeedOutcome, LookaheadFeeder};
pub use params::{AtomicF32, FlattenParams, ParamSnapshot};
pub use telemetry::{AtomicPitchEstimate, FlattenAtomics, TelemetrySnapshot};

use crate::config::FlattenerConfig;
use crate::detection::PitchEstimator;
use crate::error::{FlattenError, FlattenResult};
use crate::shifter::PitchShifter;
use crate::types::MAX_BLOCK_SIZE;

/// Supported sample rate range
pub const MIN_SAMPLE_RATE: u32 = 8000;
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Build an engine and its controller
///
/// Allocates every buffer the engine will use, so call this before audio
/// starts. `max_block` is the largest block the engine processes in one
/// pass; longer host buffers are chunked.
pub fn flatten_engine<S: PitchShifter>(
    config: &FlattenerConfig,
    sample_rate: u32,
    max_block: usize,
    shifter: S,
) -> FlattenResult<(FlattenEngine<S>, FlattenController)> {
    if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
        return Err(FlattenError::InvalidSampleRate(sample_rate));
    }
    if max_block == 0 || max_block > MAX_BLOCK_SIZE {
        return Err(FlattenError::InvalidBlockSize(max_block));
    }

    let config = config.sanitized();
    let params = Arc::new(FlattenParams::new(&config));
    let atomics = Arc::new(FlattenAtomics::new());
    let (command_tx, command_rx) = command_channel();

    let handle = gc::gc_handle();
    let estimator = PitchEstimator::build(
        config.detection.algorithm,
        sample_rate,
        config.detection.interval_ms,
        config.detection.dio,
        config.bounds(),
    );
    let shifter_latency = shifter.latency();
    let feeder = LookaheadFeeder::new(max_block, config.output.lookahead_multiplier, shifter_latency);

    log::info!(
        "Flatten engine: {}Hz, {} frame blocks, {} detection, {} frame shifter latency",
        sample_rate,
        max_block,
        config.detection.algorithm.name(),
        shifter_latency
    );

    let engine = FlattenEngine::new(
        sample_rate,
        max_block,
        Arc::clone(&params),
        Arc::clone(&atomics),
        command_rx,
        Owned::new(&handle, estimator),
        Owned::new(&handle, feeder),
        shifter,
    );
    let controller = FlattenController::new(
        params,
        atomics,
        command_tx,
        sample_rate,
        max_block,
        shifter_latency,
        config,
    );
    Ok((engine, controller))
}

#[cfg(test)]
mod tests {
    use super::test_support::{sine_block, DelayShifter};
    use super::*;
    use crate::detection::Algorithm;
    use crate::ratio::RatioGlide;
    use crate::types::StereoSample;

    const SR: u32 = 48000;
    const BLOCK: usize = 512;

    fn engine_with(config: &FlattenerConfig) -> (FlattenEngine<DelayShifter>, FlattenController) {
        flatten_engine(config, SR, BLOCK, DelayShifter::new(256, 8 * BLOCK)).unwrap()
    }

    /// Run `blocks` blocks of a sine, returning the sample position reached
    fn run_sine(
        engine: &mut FlattenEngine<DelayShifter>,
        freq: f32,
        amplitude: f32,
        start: usize,
        blocks: usize,
    ) -> usize {
        let mut pos = start;
        for _ in 0..blocks {
            let mut block = sine_block(freq, amplitude, SR, pos, BLOCK);
            engine.process(&mut block);
            pos += BLOCK;
        }
        pos
    }

    fn unlatched() -> FlattenerConfig {
        let mut config = FlattenerConfig::default();
        config.flatten.latch_enabled = false;
        config
    }

    #[test]
    fn test_rejects_invalid_construction() {
        let config = FlattenerConfig::default();
        assert!(matches!(
            flatten_engine(&config, 0, BLOCK, DelayShifter::new(0, 64)),
            Err(FlattenError::InvalidSampleRate(0))
        ));
        assert!(matches!(
            flatten_engine(&config, SR, 0, DelayShifter::new(0, 64)),
            Err(FlattenError::InvalidBlockSize(0))
        ));
        assert!(matches!(
            flatten_engine(&config, SR, MAX_BLOCK_SIZE + 1, DelayShifter::new(0, 64)),
            Err(FlattenError::InvalidBlockSize(_))
        ));
    }

    #[test]
    fn test_flattens_octave_below_target() {
        let (mut engine, controller) = engine_with(&unlatched());
        let max_step = RatioGlide::max_step(BLOCK as f32 / SR as f32);

        let mut pos = 0;
        let mut previous_applied = 1.0f32;
        for _ in 0..300 {
            pos = run_sine(&mut engine, 220.0, 0.5, pos, 1);
            let applied = controller.telemetry().applied_ratio;
            assert!(
                (applied - previous_applied).abs() <= max_step + 1e-6,
                "applied ratio stepped from {} to {}",
                previous_applied,
                applied
            );
            previous_applied = applied;
        }

        let t = controller.telemetry();
        assert!((t.detected_pitch - 220.0).abs() < 2.0, "detected {}", t.detected_pitch);
        // The issue gate holds the last issued ratio within 5% of the smoothed one
        assert!((t.issued_ratio - 0.5).abs() < 0.04, "issued {}", t.issued_ratio);
        assert!((t.applied_ratio - 0.5).abs() < 0.04, "applied {}", t.applied_ratio);
        assert_eq!(t.effective_target, 440.0);
        assert!(t.warmed_up);
        // The shifter is asked to raise pitch by the inverse ratio
        assert!((engine.shifter().pitch_scale() - 2.0).abs() < 0.2);
    }

    #[test]
    fn test_latch_locks_after_silence() {
        let (mut engine, controller) = engine_with(&FlattenerConfig::default());

        let mut silence = vec![StereoSample::silence(); BLOCK];
        for _ in 0..40 {
            engine.process(&mut silence);
            assert!(!controller.telemetry().latch_locked);
        }

        // 200ms of tone is at most 19 blocks of 512 frames at 48kHz. The
        // latch window needs five commits, and every commit needs a fresh
        // estimate, so it cannot lock before the fifth estimate of the tone.
        let onset_frame = controller.telemetry().raw_estimate.frame_index;
        let mut pos = 0;
        let mut locked_at = None;
        for block in 0..19 {
            pos = run_sine(&mut engine, 300.0, 0.5, pos, 1);
            let t = controller.telemetry();
            let tone_estimates = t.raw_estimate.frame_index - onset_frame;
            if tone_estimates < 5 {
                assert!(!t.latch_locked, "locked after {} estimates", tone_estimates);
            }
            if t.latch_locked {
                locked_at = Some(block);
                break;
            }
        }
        assert!(locked_at.is_some(), "latch did not lock within 200ms of tone");

        let t = controller.telemetry();
        assert!((t.locked_frequency - 300.0).abs() < 3.0, "locked at {}", t.locked_frequency);
        assert_eq!(t.effective_target, t.locked_frequency);

        // Input sitting on the latched pitch heads back to unity; the 5%
        // issue gate may leave the last issued ratio just short of it
        run_sine(&mut engine, 300.0, 0.5, pos, 100);
        assert!((controller.telemetry().applied_ratio - 1.0).abs() < 0.06);
    }

    #[test]
    fn test_manual_override_unlocks_latch() {
        let (mut engine, mut controller) = engine_with(&FlattenerConfig::default());
        let pos = run_sine(&mut engine, 300.0, 0.5, 0, 100);
        assert!(controller.telemetry().latch_locked);

        controller.set_manual_override(Some(250.0)).unwrap();
        let pos = run_sine(&mut engine, 300.0, 0.5, pos, 1);
        let t = controller.telemetry();
        assert!(!t.latch_locked);
        assert_eq!(t.effective_target, 250.0);

        // Stays unlocked while the override is engaged
        run_sine(&mut engine, 300.0, 0.5, pos, 100);
        assert!(!controller.telemetry().latch_locked);
    }

    #[test]
    fn test_reset_latch_flag() {
        let (mut engine, controller) = engine_with(&FlattenerConfig::default());
        let pos = run_sine(&mut engine, 300.0, 0.5, 0, 100);
        assert!(controller.telemetry().latch_locked);

        controller.reset_latch();
        run_sine(&mut engine, 300.0, 0.5, pos, 1);
        assert!(!controller.telemetry().latch_locked);
    }

    #[test]
    fn test_volume_gate_suppresses_detection() {
        let (mut engine, controller) = engine_with(&unlatched());
        // -60dB peak is well under the -40dB gate
        run_sine(&mut engine, 220.0, 0.001, 0, 100);
        let t = controller.telemetry();
        assert_eq!(t.detected_pitch, 0.0);
        assert_eq!(t.applied_ratio, 1.0);
        assert!(t.input_level_db < -40.0);
    }

    #[test]
    fn test_silence_reset_returns_to_unity() {
        let (mut engine, controller) = engine_with(&unlatched());
        run_sine(&mut engine, 220.0, 0.5, 0, 150);
        assert!(controller.telemetry().detected_pitch > 0.0);

        // 2.5s of silence at 48kHz
        let mut silence = vec![StereoSample::silence(); BLOCK];
        for _ in 0..235 {
            engine.process(&mut silence);
        }
        let t = controller.telemetry();
        assert_eq!(t.detected_pitch, 0.0);
        assert_eq!(t.issued_ratio, 1.0);
    }

    #[test]
    fn test_full_reset() {
        let (mut engine, controller) = engine_with(&unlatched());
        let pos = run_sine(&mut engine, 220.0, 0.5, 0, 100);
        assert!(controller.telemetry().warmed_up);

        controller.reset();
        run_sine(&mut engine, 220.0, 0.5, pos, 1);
        let t = controller.telemetry();
        assert!(!t.warmed_up);
        assert_eq!(t.applied_ratio, 1.0);
    }

    #[test]
    fn test_long_buffers_are_chunked() {
        let (mut engine, controller) = engine_with(&unlatched());
        let mut buffer = sine_block(220.0, 0.5, SR, 0, BLOCK * 3 + 100);
        engine.process(&mut buffer);
        assert_eq!(controller.telemetry().blocks_processed, 4);
    }

    #[test]
    fn test_algorithm_switch_swaps_estimator() {
        let (mut engine, mut controller) = engine_with(&unlatched());
        run_sine(&mut engine, 220.0, 0.5, 0, 10);
        assert_eq!(controller.telemetry().algorithm, Algorithm::Yin);

        controller.set_algorithm(Algorithm::Dio).unwrap();
        let mut block = sine_block(220.0, 0.5, SR, 0, BLOCK);
        engine.process(&mut block);

        let t = controller.telemetry();
        assert_eq!(t.algorithm, Algorithm::Dio);
        assert!(t.dio_prebuffering);
        // Prebuffering blocks are silent
        assert!(block.iter().all(|s| *s == StereoSample::silence()));
    }

    #[test]
    fn test_dio_engine_tracks_after_prebuffer() {
        let mut config = unlatched();
        config.detection.algorithm = Algorithm::Dio;
        config.detection.dio.buffer_time_secs = 0.2;
        config.detection.dio.speed = 3;
        config.tracking.min_freq = 80.0;
        config.tracking.max_freq = 800.0;
        let (mut engine, controller) = engine_with(&config);

        run_sine(&mut engine, 220.0, 0.5, 0, 150);
        let t = controller.telemetry();
        assert!(!t.dio_prebuffering);
        assert!((t.detected_pitch - 220.0).abs() < 5.0, "detected {}", t.detected_pitch);
    }

    #[test]
    fn test_lookahead_change_swaps_feeder() {
        let (mut engine, mut controller) = engine_with(&unlatched());
        run_sine(&mut engine, 220.0, 0.5, 0, 20);
        assert!(controller.telemetry().warmed_up);

        controller.set_lookahead_multiplier(4.0).unwrap();
        run_sine(&mut engine, 220.0, 0.5, 0, 1);
        assert!(!controller.telemetry().warmed_up);
        assert_eq!(controller.config().output.lookahead_multiplier, 4.0);
    }

    #[test]
    fn test_full_command_queue_is_reported() {
        let (_engine, mut controller) = engine_with(&unlatched());
        let mut result = Ok(());
        for i in 0..=COMMAND_QUEUE_CAPACITY {
            result = controller.set_lookahead_multiplier(if i % 2 == 0 { 3.0 } else { 2.0 });
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(FlattenError::CommandQueueFull)));
    }

    #[test]
    fn test_per_block_params_need_no_command() {
        let (mut engine, mut controller) = engine_with(&unlatched());
        controller.set_target_pitch(220.0).unwrap();
        controller.set_mix(0.0).unwrap();
        run_sine(&mut engine, 220.0, 0.5, 0, 1);
        assert_eq!(controller.telemetry().effective_target, 220.0);
    }
}
