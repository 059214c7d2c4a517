//! Deterministic shifters and signal helpers for engine tests

use crate::shifter::{FrameFifo, PitchShifter};
use crate::types::StereoSample;

pub fn sine_block(freq: f32, amplitude: f32, sample_rate: u32, start: usize, len: usize) -> Vec<StereoSample> {
    (start..start + len)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32;
            StereoSample::mono(phase.sin() * amplitude)
        })
        .collect()
}

/// Pure delay line: output is the input `latency` frames later, times `gain`
pub struct DelayShifter {
    fifo: FrameFifo,
    latency: usize,
    gain: f32,
    scale: f64,
    scale_changes: usize,
}

impl DelayShifter {
    pub fn new(latency: usize, capacity: usize) -> Self {
        let mut shifter = Self {
            fifo: FrameFifo::with_capacity(capacity + latency),
            latency,
            gain: 1.0,
            scale: 1.0,
            scale_changes: 0,
        };
        shifter.prime();
        shifter
    }

    fn prime(&mut self) {
        for _ in 0..self.latency {
            self.fifo.push_slice(&[StereoSample::silence()]);
        }
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    pub fn pitch_scale(&self) -> f64 {
        self.scale
    }

    pub fn scale_changes(&self) -> usize {
        self.scale_changes
    }
}

impl PitchShifter for DelayShifter {
    fn set_pitch_scale(&mut self, scale: f64) {
        self.scale = scale;
        self.scale_changes += 1;
    }

    fn process(&mut self, input: &[StereoSample], _is_final: bool) {
        for &frame in input {
            self.fifo.push_slice(&[frame * self.gain]);
        }
    }

    fn available(&self) -> usize {
        self.fifo.len()
    }

    fn retrieve(&mut self, output: &mut [StereoSample]) -> usize {
        self.fifo.pop_into(output)
    }

    fn latency(&self) -> usize {
        self.latency
    }

    fn reset(&mut self) {
        self.fifo.clear();
        self.prime();
    }
}

/// Pass-through that remembers the most recent feed
pub struct RecordingShifter {
    inner: DelayShifter,
    last_fed: Vec<StereoSample>,
}

impl RecordingShifter {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: DelayShifter::new(0, capacity),
            last_fed: Vec::with_capacity(capacity),
        }
    }

    pub fn last_fed(&self) -> &[StereoSample] {
        &self.last_fed
    }
}

impl PitchShifter for RecordingShifter {
    fn set_pitch_scale(&mut self, scale: f64) {
        self.inner.set_pitch_scale(scale);
    }

    fn process(&mut self, input: &[StereoSample], is_final: bool) {
        self.last_fed.clear();
        self.last_fed.extend_from_slice(input);
        self.inner.process(input, is_final);
    }

    fn available(&self) -> usize {
        self.inner.available()
    }

    fn retrieve(&mut self, output: &mut [StereoSample]) -> usize {
        self.inner.retrieve(output)
    }

    fn latency(&self) -> usize {
        0
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

/// Delivers only `fraction` of its input while starving
pub struct StarvingShifter {
    inner: DelayShifter,
    fraction: f32,
    starving: bool,
}

impl StarvingShifter {
    pub fn new(fraction: f32) -> Self {
        Self {
            inner: DelayShifter::new(0, 16384),
            fraction,
            starving: false,
        }
    }

    pub fn set_starving(&mut self, starving: bool) {
        self.starving = starving;
    }
}

impl PitchShifter for StarvingShifter {
    fn set_pitch_scale(&mut self, scale: f64) {
        self.inner.set_pitch_scale(scale);
    }

    fn process(&mut self, input: &[StereoSample], is_final: bool) {
        let count = if self.starving {
            (input.len() as f32 * self.fraction) as usize
        } else {
            input.len()
        };
        self.inner.process(&input[..count.min(input.len())], is_final);
    }

    fn available(&self) -> usize {
        self.inner.available()
    }

    fn retrieve(&mut self, output: &mut [StereoSample]) -> usize {
        self.inner.retrieve(output)
    }

    fn latency(&self) -> usize {
        0
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}
