//! Control-thread handle for a running engine
//!
//! Per-block values go straight to the parameter atomics. Changes that need
//! allocation (algorithm, DIO tuning, detection range under DIO, lookahead)
//! build the new component here and queue it for the engine.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use basedrop::Owned;

use super::command::EngineCommand;
use super::gc::gc_handle;
use super::lookahead::LookaheadFeeder;
use super::params::FlattenParams;
use super::telemetry::{FlattenAtomics, TelemetrySnapshot};
use crate::config::FlattenerConfig;
use crate::detection::{Algorithm, DioConfig, PitchEstimator};
use crate::error::{FlattenError, FlattenResult};

pub struct FlattenController {
    params: Arc<FlattenParams>,
    atomics: Arc<FlattenAtomics>,
    commands: rtrb::Producer<EngineCommand>,
    sample_rate: u32,
    max_block: usize,
    shifter_latency: usize,
    /// Configuration the engine is running with
    config: FlattenerConfig,
}

impl FlattenController {
    pub(crate) fn new(
        params: Arc<FlattenParams>,
        atomics: Arc<FlattenAtomics>,
        commands: rtrb::Producer<EngineCommand>,
        sample_rate: u32,
        max_block: usize,
        shifter_latency: usize,
        config: FlattenerConfig,
    ) -> Self {
        Self {
            params,
            atomics,
            commands,
            sample_rate,
            max_block,
            shifter_latency,
            config,
        }
    }

    pub fn config(&self) -> &FlattenerConfig {
        &self.config
    }

    pub fn params(&self) -> &Arc<FlattenParams> {
        &self.params
    }

    pub fn atomics(&self) -> Arc<FlattenAtomics> {
        Arc::clone(&self.atomics)
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.atomics.snapshot()
    }

    /// Apply a whole configuration
    ///
    /// Per-block values take effect at the next block. On
    /// `CommandQueueFull` those values are already live and the component
    /// swap is retried by the next call.
    pub fn apply_config(&mut self, config: &FlattenerConfig) -> FlattenResult<()> {
        let new = config.sanitized();
        self.params.apply(&new);

        let old = &self.config;
        let estimator_changed = new.detection.algorithm != old.detection.algorithm
            || new.detection.dio != old.detection.dio
            || (new.detection.algorithm == Algorithm::Dio && new.bounds() != old.bounds());
        if estimator_changed {
            let estimator = PitchEstimator::build(
                new.detection.algorithm,
                self.sample_rate,
                new.detection.interval_ms,
                new.detection.dio,
                new.bounds(),
            );
            self.push(EngineCommand::SwapEstimator(Owned::new(&gc_handle(), estimator)))?;
            self.config.detection = new.detection.clone();
            self.config.tracking.min_freq = new.tracking.min_freq;
            self.config.tracking.max_freq = new.tracking.max_freq;
            log::info!("Queued {} estimator", new.detection.algorithm.name());
        }

        if new.output.lookahead_multiplier != self.config.output.lookahead_multiplier {
            let feeder = LookaheadFeeder::new(self.max_block, new.output.lookahead_multiplier, self.shifter_latency);
            self.push(EngineCommand::SwapFeeder(Owned::new(&gc_handle(), feeder)))?;
            log::info!("Queued lookahead of {:.1} blocks", new.output.lookahead_multiplier);
        }

        self.config = new;
        Ok(())
    }

    fn push(&mut self, command: EngineCommand) -> FlattenResult<()> {
        self.commands.push(command).map_err(|_| {
            log::warn!("Engine command queue full, reconfiguration dropped");
            FlattenError::CommandQueueFull
        })
    }

    fn update<F>(&mut self, edit: F) -> FlattenResult<()>
    where
        F: FnOnce(&mut FlattenerConfig),
    {
        let mut config = self.config.clone();
        edit(&mut config);
        self.apply_config(&config)
    }

    pub fn set_target_pitch(&mut self, hz: f32) -> FlattenResult<()> {
        self.update(|c| c.flatten.target_pitch = hz)
    }

    /// `Some(hz)` engages manual override (which unlocks the latch), `None` releases it
    pub fn set_manual_override(&mut self, frequency: Option<f32>) -> FlattenResult<()> {
        self.update(|c| match frequency {
            Some(hz) => {
                c.flatten.manual_override = true;
                c.flatten.override_freq = hz;
            }
            None => c.flatten.manual_override = false,
        })
    }

    pub fn set_latch_enabled(&mut self, enabled: bool) -> FlattenResult<()> {
        self.update(|c| c.flatten.latch_enabled = enabled)
    }

    pub fn set_hard_flatten(&mut self, hard: bool) -> FlattenResult<()> {
        self.update(|c| c.flatten.hard_flatten = hard)
    }

    pub fn set_mix(&mut self, mix: f32) -> FlattenResult<()> {
        self.update(|c| c.output.mix = mix)
    }

    pub fn set_smoothing_ms(&mut self, ms: f32) -> FlattenResult<()> {
        self.update(|c| c.output.smoothing_ms = ms)
    }

    pub fn set_frequency_range(&mut self, min_hz: f32, max_hz: f32) -> FlattenResult<()> {
        self.update(|c| {
            c.tracking.min_freq = min_hz;
            c.tracking.max_freq = max_hz;
        })
    }

    pub fn set_algorithm(&mut self, algorithm: Algorithm) -> FlattenResult<()> {
        self.update(|c| c.detection.algorithm = algorithm)
    }

    pub fn set_dio_config(&mut self, dio: DioConfig) -> FlattenResult<()> {
        self.update(|c| c.detection.dio = dio)
    }

    pub fn set_lookahead_multiplier(&mut self, multiplier: f32) -> FlattenResult<()> {
        self.update(|c| c.output.lookahead_multiplier = multiplier)
    }

    /// Momentary latch reset
    pub fn reset_latch(&self) {
        self.params.reset_latch.store(true, Ordering::Relaxed);
    }

    /// Full pipeline reset at the next block
    pub fn reset(&self) {
        self.params.reset.store(true, Ordering::Relaxed);
    }

    /// Apply the default configuration and clear the latch
    pub fn reset_to_defaults(&mut self) -> FlattenResult<()> {
        self.apply_config(&FlattenerConfig::default())?;
        self.reset_latch();
        Ok(())
    }
}
