//! Lookahead buffering between the host block and the shifter
//!
//! Input is written to a ring before being fed to the shifter, output is
//! pulled back out with a dry warm-up while the shifter primes and a
//! decaying hold when it cannot deliver a full block.

use crate::shifter::PitchShifter;
use crate::types::StereoSample;

/// Blocks of dry output added on top of the shifter latency
const EXTRA_WARMUP_BLOCKS: usize = 4;

/// Dry gain while warming up
const WARMUP_DRY_GAIN: f32 = 0.5;

/// Per-sample decay of the held sample while starved
const STARVATION_DECAY: f32 = 0.999;

/// Fraction of a block the shifter must have ready to avoid starvation
const STARVATION_FRACTION: f32 = 0.75;

/// What happened to one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    WarmingUp,
    Shifted,
    /// Shifter could not deliver; the block is a decaying hold
    Starved,
}

pub struct LookaheadFeeder {
    max_block: usize,
    lookahead: usize,
    ring: Vec<StereoSample>,
    /// Absolute positions; ring index is `pos % ring.len()`
    write_pos: u64,
    read_pos: u64,
    feed: Vec<StereoSample>,
    warmup_blocks: usize,
    warmup_remaining: usize,
    last_wet: StereoSample,
    starved_blocks: u64,
}

impl LookaheadFeeder {
    /// Allocates the ring for `max_block × multiplier` of lookahead
    pub fn new(max_block: usize, multiplier: f32, shifter_latency: usize) -> Self {
        let max_block = max_block.max(1);
        let multiplier = multiplier.clamp(1.0, 8.0);
        let lookahead = (max_block as f32 * multiplier).round() as usize;
        let warmup_blocks = shifter_latency.div_ceil(max_block) + EXTRA_WARMUP_BLOCKS;
        Self {
            max_block,
            lookahead,
            ring: vec![StereoSample::silence(); lookahead + 2 * max_block],
            write_pos: 0,
            read_pos: 0,
            feed: vec![StereoSample::silence(); lookahead],
            warmup_blocks,
            warmup_remaining: warmup_blocks,
            last_wet: StereoSample::silence(),
            starved_blocks: 0,
        }
    }

    #[inline]
    pub fn lookahead(&self) -> usize {
        self.lookahead
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.len()
    }

    #[inline]
    pub fn max_block(&self) -> usize {
        self.max_block
    }

    #[inline]
    pub fn write_pos(&self) -> u64 {
        self.write_pos
    }

    #[inline]
    pub fn read_pos(&self) -> u64 {
        self.read_pos
    }

    #[inline]
    pub fn warmup_blocks(&self) -> usize {
        self.warmup_blocks
    }

    #[inline]
    pub fn is_warmed_up(&self) -> bool {
        self.warmup_remaining == 0
    }

    #[inline]
    pub fn starved_blocks(&self) -> u64 {
        self.starved_blocks
    }

    /// Clear positions and restart warm-up; the starvation count is kept
    pub fn reset(&mut self) {
        self.write_pos = 0;
        self.read_pos = 0;
        self.warmup_remaining = self.warmup_blocks;
        self.last_wet = StereoSample::silence();
    }

    /// Run one block of at most `max_block` frames through the shifter
    ///
    /// `output` must be the same length as `input`.
    pub fn process<S: PitchShifter + ?Sized>(
        &mut self,
        input: &[StereoSample],
        output: &mut [StereoSample],
        shifter: &mut S,
        mix: f32,
    ) -> FeedOutcome {
        let n = input.len().min(output.len()).min(self.max_block);
        let input = &input[..n];
        let output = &mut output[..n];
        if n == 0 {
            return if self.is_warmed_up() {
                FeedOutcome::Shifted
            } else {
                FeedOutcome::WarmingUp
            };
        }

        self.write(input);
        let available = (self.write_pos - self.read_pos) as usize;
        if available >= n {
            let count = available.min(self.lookahead);
            self.copy_from_ring(self.read_pos, count);
            shifter.process(&self.feed[..count], false);
        } else {
            shifter.process(input, false);
        }
        self.read_pos += n as u64;

        if self.warmup_remaining > 0 {
            self.warmup_remaining -= 1;
            // Discard priming output so the shifter FIFO stays bounded
            while shifter.available() > 0 {
                if shifter.retrieve(output) == 0 {
                    break;
                }
            }
            for (out, dry) in output.iter_mut().zip(input) {
                *out = *dry * WARMUP_DRY_GAIN;
            }
            self.last_wet = output[n - 1];
            return FeedOutcome::WarmingUp;
        }

        let ready = shifter.available();
        let outcome = if (ready as f32) < STARVATION_FRACTION * n as f32 {
            self.starved_blocks += 1;
            self.decay_fill(output, self.last_wet);
            FeedOutcome::Starved
        } else {
            let got = shifter.retrieve(&mut output[..ready.min(n)]);
            if got < n {
                let held = if got > 0 { output[got - 1] } else { self.last_wet };
                self.decay_fill(&mut output[got..], held);
            }
            FeedOutcome::Shifted
        };
        self.last_wet = output[n - 1];

        let mix = mix.clamp(0.0, 1.0);
        for (out, dry) in output.iter_mut().zip(input) {
            *out = dry.mix(out, mix);
        }
        outcome
    }

    fn write(&mut self, input: &[StereoSample]) {
        let len = self.ring.len() as u64;
        for (i, &frame) in input.iter().enumerate() {
            self.ring[((self.write_pos + i as u64) % len) as usize] = frame;
        }
        self.write_pos += input.len() as u64;
    }

    fn copy_from_ring(&mut self, from: u64, count: usize) {
        let len = self.ring.len() as u64;
        for (i, slot) in self.feed[..count].iter_mut().enumerate() {
            *slot = self.ring[((from + i as u64) % len) as usize];
        }
    }

    fn decay_fill(&self, output: &mut [StereoSample], start: StereoSample) {
        let mut held = start;
        for out in output.iter_mut() {
            held *= STARVATION_DECAY;
            *out = held;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{DelayShifter, RecordingShifter, StarvingShifter};

    fn ramp(start: usize, len: usize) -> Vec<StereoSample> {
        (start..start + len).map(|i| StereoSample::mono(i as f32)).collect()
    }

    #[test]
    fn test_sizes_from_multiplier() {
        let feeder = LookaheadFeeder::new(512, 2.0, 0);
        assert_eq!(feeder.lookahead(), 1024);
        assert_eq!(feeder.capacity(), 1024 + 1024);

        let clamped = LookaheadFeeder::new(512, 20.0, 0);
        assert_eq!(clamped.lookahead(), 4096);
        assert_eq!(LookaheadFeeder::new(512, 0.1, 0).lookahead(), 512);
    }

    #[test]
    fn test_warmup_block_count() {
        assert_eq!(LookaheadFeeder::new(512, 2.0, 0).warmup_blocks(), 4);
        assert_eq!(LookaheadFeeder::new(512, 2.0, 512).warmup_blocks(), 5);
        assert_eq!(LookaheadFeeder::new(512, 2.0, 513).warmup_blocks(), 6);
    }

    #[test]
    fn test_read_pos_advances_by_block_and_feeds_own_input() {
        let mut feeder = LookaheadFeeder::new(256, 2.0, 0);
        let mut shifter = RecordingShifter::new(4096);
        let mut output = vec![StereoSample::silence(); 256];

        let mut start = 0;
        for &n in &[256usize, 100, 256, 7, 180] {
            let input = ramp(start, n);
            let before = feeder.read_pos();
            feeder.process(&input, &mut output[..n], &mut shifter, 1.0);
            assert_eq!(feeder.read_pos() - before, n as u64);
            assert_eq!(shifter.last_fed(), input.as_slice());
            start += n;
        }
    }

    #[test]
    fn test_warmup_outputs_attenuated_dry() {
        let mut feeder = LookaheadFeeder::new(64, 2.0, 0);
        let mut shifter = DelayShifter::new(0, 1024);
        let input = vec![StereoSample::new(0.8, -0.4); 64];
        let mut output = vec![StereoSample::silence(); 64];

        for _ in 0..feeder.warmup_blocks() {
            assert_eq!(feeder.process(&input, &mut output, &mut shifter, 1.0), FeedOutcome::WarmingUp);
            assert_eq!(output[10], StereoSample::new(0.4, -0.2));
        }
        assert!(feeder.is_warmed_up());
        assert_eq!(feeder.process(&input, &mut output, &mut shifter, 1.0), FeedOutcome::Shifted);
        assert_eq!(output[10], StereoSample::new(0.8, -0.4));
    }

    #[test]
    fn test_mix_blends_dry_and_wet() {
        let mut feeder = LookaheadFeeder::new(32, 1.0, 0);
        let mut shifter = DelayShifter::new(0, 256);
        shifter.set_gain(0.0);
        let input = vec![StereoSample::mono(1.0); 32];
        let mut output = vec![StereoSample::silence(); 32];
        for _ in 0..feeder.warmup_blocks() {
            feeder.process(&input, &mut output, &mut shifter, 0.25);
        }
        feeder.process(&input, &mut output, &mut shifter, 0.25);
        assert!((output[0].left - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_starvation_decays_last_sample() {
        let mut feeder = LookaheadFeeder::new(64, 2.0, 0);
        let mut shifter = StarvingShifter::new(0.5);
        let input = vec![StereoSample::mono(1.0); 64];
        let mut output = vec![StereoSample::silence(); 64];

        for _ in 0..feeder.warmup_blocks() {
            feeder.process(&input, &mut output, &mut shifter, 1.0);
        }
        shifter.set_starving(true);
        assert_eq!(feeder.process(&input, &mut output, &mut shifter, 1.0), FeedOutcome::Starved);
        assert_eq!(feeder.starved_blocks(), 1);
        // Warm-up ended on dry × 0.5, which is where the hold starts
        assert!((output[0].left - 0.5 * STARVATION_DECAY).abs() < 1e-6);
        assert!(output[63].left < output[0].left);
        assert!(output.windows(2).all(|w| w[1].left <= w[0].left));
    }

    #[test]
    fn test_reset_restarts_warmup() {
        let mut feeder = LookaheadFeeder::new(64, 2.0, 0);
        let mut shifter = DelayShifter::new(0, 1024);
        let input = vec![StereoSample::mono(0.1); 64];
        let mut output = vec![StereoSample::silence(); 64];
        for _ in 0..10 {
            feeder.process(&input, &mut output, &mut shifter, 1.0);
        }
        assert!(feeder.is_warmed_up());
        feeder.reset();
        assert!(!feeder.is_warmed_up());
        assert_eq!(feeder.read_pos(), 0);
    }
}
