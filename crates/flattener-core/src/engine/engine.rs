//! The real-time flatten engine
//!
//! One call to [`FlattenEngine::process`] per host callback. Per block:
//!
//! 1. Apply queued component swaps and pending reset flags
//! 2. Band-limit a mono copy of the input and run the volume gate
//! 3. Feed the estimator; each estimate goes through the stability
//!    tracker, and commits feed the latch
//! 4. Doppler-compensate the smoothed pitch and update the ratio
//! 5. Glide the applied ratio and run the lookahead feeder / shifter
//! 6. Publish telemetry
//!
//! Nothing here allocates or locks after construction.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use basedrop::Owned;

use super::command::EngineCommand;
use super::lookahead::{FeedOutcome, LookaheadFeeder};
use super::params::{FlattenParams, ParamSnapshot};
use super::telemetry::FlattenAtomics;
use crate::detection::{Algorithm, DetectionFilter, PitchEstimator};
use crate::ratio::{PitchRatioController, RatioGlide};
use crate::shifter::PitchShifter;
use crate::tracking::{BasePitchLatch, DopplerCompensator, PitchStabilityTracker, TrackerEvent};
use crate::types::{rms_to_db, StereoSample};

pub struct FlattenEngine<S: PitchShifter> {
    sample_rate: u32,
    max_block: usize,
    params: Arc<FlattenParams>,
    atomics: Arc<FlattenAtomics>,
    commands: rtrb::Consumer<EngineCommand>,

    filter: DetectionFilter,
    estimator: Owned<PitchEstimator>,
    tracker: PitchStabilityTracker,
    latch: BasePitchLatch,
    doppler: DopplerCompensator,
    ratio: PitchRatioController,
    glide: RatioGlide,
    feeder: Owned<LookaheadFeeder>,
    shifter: S,

    /// Manual override state of the previous block, to catch engagement
    override_active: bool,
    /// Estimates produced since construction
    frame_index: u64,
    mono: Vec<f32>,
    dry: Vec<StereoSample>,
}

impl<S: PitchShifter> FlattenEngine<S> {
    /// Assemble an engine; use [`super::flatten_engine`] to get a matching controller
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        sample_rate: u32,
        max_block: usize,
        params: Arc<FlattenParams>,
        atomics: Arc<FlattenAtomics>,
        commands: rtrb::Consumer<EngineCommand>,
        estimator: Owned<PitchEstimator>,
        feeder: Owned<LookaheadFeeder>,
        mut shifter: S,
    ) -> Self {
        let snapshot = params.snapshot();
        shifter.set_pitch_scale(1.0);
        atomics
            .dio_active
            .store(estimator.algorithm() == Algorithm::Dio, Ordering::Relaxed);

        Self {
            sample_rate,
            max_block,
            filter: DetectionFilter::new(sample_rate, snapshot.highpass_hz, snapshot.lowpass_hz),
            estimator,
            tracker: PitchStabilityTracker::new(sample_rate),
            latch: BasePitchLatch::new(),
            doppler: DopplerCompensator::new(),
            ratio: PitchRatioController::new(),
            glide: RatioGlide::default(),
            feeder,
            shifter,
            override_active: snapshot.manual_override,
            frame_index: 0,
            mono: vec![0.0; max_block],
            dry: vec![StereoSample::silence(); max_block],
            params,
            atomics,
            commands,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn max_block(&self) -> usize {
        self.max_block
    }

    pub fn atomics(&self) -> &Arc<FlattenAtomics> {
        &self.atomics
    }

    pub fn shifter(&self) -> &S {
        &self.shifter
    }

    /// Process a stereo buffer in place
    ///
    /// Buffers longer than `max_block` are processed in `max_block` chunks.
    pub fn process(&mut self, buffer: &mut [StereoSample]) {
        for chunk in buffer.chunks_mut(self.max_block) {
            self.process_block(chunk);
        }
    }

    fn process_block(&mut self, block: &mut [StereoSample]) {
        self.process_commands();

        if self.params.take_reset() {
            self.reset_all();
        }
        if self.params.take_reset_latch() {
            self.reset_latch();
        }

        let snapshot = self.params.snapshot();
        if snapshot.manual_override && !self.override_active {
            self.latch.reset();
        }
        self.override_active = snapshot.manual_override;

        let n = block.len();
        self.dry[..n].copy_from_slice(block);

        // Detection signal and volume gate
        self.filter.set_cutoffs(snapshot.highpass_hz, snapshot.lowpass_hz);
        let mut energy = 0.0f32;
        for (mono, frame) in self.mono[..n].iter_mut().zip(&self.dry[..n]) {
            let x = frame.to_mono();
            energy += x * x;
            *mono = self.filter.process(x);
        }
        let level_db = if n > 0 { rms_to_db((energy / n as f32).sqrt()) } else { -100.0 };
        let gate_open = level_db >= snapshot.volume_threshold_db;

        self.run_detection(n, &snapshot, gate_open);

        if self.estimator.is_prebuffering() {
            block.fill(StereoSample::silence());
            self.publish(&snapshot, level_db);
            return;
        }

        let block_secs = n as f32 / self.sample_rate as f32;
        let estimate = self.doppler.update(self.tracker.smoothed_pitch(), block_secs);
        let ratio_settings = snapshot.ratio_settings();
        if let Some(command) = self.ratio.update(estimate.compensated, self.latch.state(), &ratio_settings, block_secs) {
            self.glide.set_target(command.ratio);
            self.atomics.issued_ratio.store(command.ratio);
        }
        if let Some(applied) = self.glide.step(block_secs, snapshot.smoothing_ms) {
            self.shifter.set_pitch_scale(1.0 / applied as f64);
        }

        let outcome = self
            .feeder
            .process(&self.dry[..n], block, &mut self.shifter, snapshot.mix);
        if outcome == FeedOutcome::Starved {
            self.atomics
                .starved_blocks
                .store(self.feeder.starved_blocks(), Ordering::Relaxed);
        }

        self.publish(&snapshot, level_db);
    }

    /// Run the estimator over the mono block and push results through tracking
    fn run_detection(&mut self, n: usize, snapshot: &ParamSnapshot, gate_open: bool) {
        let tuning = snapshot.tuning(gate_open);
        let tracker_settings = snapshot.tracker_settings();
        let latch_observes = snapshot.latch_enabled && !snapshot.manual_override;

        let tracker = &mut self.tracker;
        let latch = &mut self.latch;
        let doppler = &mut self.doppler;
        let ratio = &mut self.ratio;
        let atomics = &self.atomics;
        let frame_index = &mut self.frame_index;

        self.estimator.analyze_block(&self.mono[..n], &tuning, frame_index, |estimate, cadence| {
            atomics.raw_estimate.store(estimate);

            match tracker.observe(estimate.frequency_hz, cadence, &tracker_settings) {
                TrackerEvent::Committed(smoothed) => {
                    if latch_observes && latch.observe(smoothed) {
                        log::debug!("Latched base pitch {:.1}Hz", latch.state().frequency());
                    }
                }
                TrackerEvent::SilenceReset => {
                    latch.reset();
                    doppler.reset();
                    ratio.reset_smoothing();
                }
                TrackerEvent::Held | TrackerEvent::Rejected | TrackerEvent::Silence => {}
            }
        });
    }

    /// Drain pending component swaps
    fn process_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            match command {
                EngineCommand::SwapEstimator(estimator) => {
                    // The old estimator drops here; basedrop defers the free
                    self.estimator = estimator;
                    self.feeder.reset();
                    self.atomics
                        .dio_active
                        .store(self.estimator.algorithm() == Algorithm::Dio, Ordering::Relaxed);
                    log::info!("Estimator swapped: {}", self.estimator.algorithm().name());
                }
                EngineCommand::SwapFeeder(feeder) => {
                    self.feeder = feeder;
                    self.shifter.reset();
                    self.shifter.set_pitch_scale(1.0 / self.glide.applied() as f64);
                    log::info!("Lookahead swapped: {} frames", self.feeder.lookahead());
                }
            }
        }
    }

    fn reset_latch(&mut self) {
        self.latch.reset();
        self.doppler.reset();
        self.ratio.reset_smoothing();
    }

    fn reset_all(&mut self) {
        self.tracker.reset();
        self.latch.reset();
        self.doppler.reset();
        self.ratio.reset();
        self.glide.reset();
        self.estimator.reset();
        self.filter.reset();
        self.feeder.reset();
        self.shifter.reset();
        self.shifter.set_pitch_scale(1.0);
        self.atomics.issued_ratio.store(1.0);
        log::info!("Flattener reset");
    }

    fn publish(&self, snapshot: &ParamSnapshot, level_db: f32) {
        let a = &self.atomics;
        let latch = self.latch.state();
        a.detected_pitch.store(self.tracker.smoothed_pitch());
        a.effective_target.store(snapshot.ratio_settings().reference_frequency(latch));
        a.applied_ratio.store(self.glide.applied());
        a.latch_locked.store(latch.is_locked(), Ordering::Relaxed);
        a.locked_frequency.store(latch.frequency());
        a.input_level_db.store(level_db);
        a.rejected_jumps.store(self.tracker.rejected_jumps(), Ordering::Relaxed);
        a.warmed_up.store(self.feeder.is_warmed_up(), Ordering::Relaxed);
        a.dio_prebuffering.store(self.estimator.is_prebuffering(), Ordering::Relaxed);
        a.blocks_processed.fetch_add(1, Ordering::Relaxed);
    }
}
