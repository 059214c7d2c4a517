//! Pitch-shifting primitive
//!
//! The engine talks to the shifter through [`PitchShifter`], a push/pull
//! interface: push input with `process`, then pull whatever is ready with
//! `retrieve`. The default implementation wraps signalsmith-stretch, which
//! works in lockstep (n in, n out), so an output FIFO emulates the pull side.

use crate::types::StereoSample;

/// Push/pull pitch shifter driven from the audio thread
///
/// Implementations must not allocate in `process` or `retrieve`.
pub trait PitchShifter: Send {
    /// Pitch multiplier: 2.0 is an octave up, 0.5 an octave down
    fn set_pitch_scale(&mut self, scale: f64);

    /// Push input frames; `is_final` flushes the internal pipeline
    fn process(&mut self, input: &[StereoSample], is_final: bool);

    /// Frames ready to retrieve
    fn available(&self) -> usize;

    /// Pull up to `output.len()` frames, returning how many were written
    fn retrieve(&mut self, output: &mut [StereoSample]) -> usize;

    /// Input-to-output delay in frames
    fn latency(&self) -> usize;

    fn reset(&mut self);
}

/// Fixed-capacity frame FIFO; the oldest frames are overwritten when full
#[derive(Debug, Clone)]
pub struct FrameFifo {
    frames: Vec<StereoSample>,
    head: usize,
    len: usize,
}

impl FrameFifo {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: vec![StereoSample::silence(); capacity.max(1)],
            head: 0,
            len: 0,
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

    #[inline]
    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    pub fn push_slice(&mut self, input: &[StereoSample]) {
        let capacity = self.frames.len();
        for &frame in input {
            let tail = (self.head + self.len) % capacity;
            self.frames[tail] = frame;
            if self.len == capacity {
                self.head = (self.head + 1) % capacity;
            } else {
                self.len += 1;
            }
        }
    }

    pub fn pop_into(&mut self, output: &mut [StereoSample]) -> usize {
        let count = output.len().min(self.len);
        let capacity = self.frames.len();
        for slot in output[..count].iter_mut() {
            *slot = self.frames[self.head];
            self.head = (self.head + 1) % capacity;
        }
        self.len -= count;
        count
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

#[cfg(feature = "signalsmith")]
pub use signalsmith::SignalsmithShifter;

#[cfg(feature = "signalsmith")]
mod signalsmith {
    use signalsmith_stretch::Stretch;

    use super::{FrameFifo, PitchShifter};
    use crate::types::StereoSample;

    const CHANNELS: u32 = 2;

    /// signalsmith-stretch in pitch-only mode
    ///
    /// Input and output lengths are always equal, so there is no time
    /// stretching; only the transpose factor changes.
    pub struct SignalsmithShifter {
        stretcher: Stretch,
        scale: f64,
        /// Output of the current `process` call before it enters the FIFO
        scratch: Vec<StereoSample>,
        fifo: FrameFifo,
    }

    impl SignalsmithShifter {
        /// `max_feed` is the largest slice `process` will ever receive
        pub fn new(sample_rate: u32, max_feed: usize) -> Self {
            let stretcher = Stretch::preset_default(CHANNELS, sample_rate);
            let latency = stretcher.input_latency() + stretcher.output_latency();
            let scratch_len = max_feed.max(stretcher.output_latency()).max(1);
            Self {
                stretcher,
                scale: 1.0,
                scratch: vec![StereoSample::silence(); scratch_len],
                fifo: FrameFifo::with_capacity(2 * max_feed + latency),
            }
        }

        pub fn pitch_scale(&self) -> f64 {
            self.scale
        }
    }

    impl PitchShifter for SignalsmithShifter {
        fn set_pitch_scale(&mut self, scale: f64) {
            self.scale = scale.clamp(0.25, 4.0);
            let semitones = 12.0 * self.scale.log2();
            self.stretcher
                .set_transpose_factor_semitones(semitones as f32, None);
        }

        fn process(&mut self, input: &[StereoSample], is_final: bool) {
            // Feeds larger than the scratch are processed in pieces
            for chunk in input.chunks(self.scratch.len()) {
                let out = &mut self.scratch[..chunk.len()];
                out.fill(StereoSample::silence());
                self.stretcher.process(
                    bytemuck::cast_slice::<StereoSample, f32>(chunk),
                    bytemuck::cast_slice_mut::<StereoSample, f32>(out),
                );
                self.fifo.push_slice(out);
            }

            if is_final {
                let tail = self.stretcher.output_latency().min(self.scratch.len());
                let out = &mut self.scratch[..tail];
                out.fill(StereoSample::silence());
                self.stretcher
                    .flush(bytemuck::cast_slice_mut::<StereoSample, f32>(out));
                self.fifo.push_slice(out);
            }
        }

        fn available(&self) -> usize {
            self.fifo.len()
        }

        fn retrieve(&mut self, output: &mut [StereoSample]) -> usize {
            self.fifo.pop_into(output)
        }

        fn latency(&self) -> usize {
            self.stretcher.input_latency() + self.stretcher.output_latency()
        }

        fn reset(&mut self) {
            self.stretcher.reset();
            self.fifo.clear();
            let scale = self.scale;
            self.set_pitch_scale(scale);
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_lockstep_output() {
            let mut shifter = SignalsmithShifter::new(48000, 1024);
            assert!(shifter.latency() > 0);

            let input = vec![StereoSample::mono(0.25); 512];
            shifter.process(&input, false);
            assert_eq!(shifter.available(), 512);

            let mut out = vec![StereoSample::silence(); 600];
            assert_eq!(shifter.retrieve(&mut out), 512);
            assert_eq!(shifter.available(), 0);
        }

        #[test]
        fn test_pitch_scale_clamped() {
            let mut shifter = SignalsmithShifter::new(48000, 512);
            shifter.set_pitch_scale(10.0);
            assert_eq!(shifter.pitch_scale(), 4.0);
            shifter.reset();
            assert_eq!(shifter.pitch_scale(), 4.0);
            assert_eq!(shifter.available(), 0);
        }
    }
}
