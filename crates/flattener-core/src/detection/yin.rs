//! YIN pitch estimator (de Cheveigné & Kawahara, 2002)
//!
//! Difference function, cumulative-mean-normalised difference, absolute
//! threshold with local-minimum refinement, and parabolic interpolation.
//!
//! The streaming wrapper keeps a ring sized for the lowest supported
//! frequency, so changing the detection range never reallocates. Every
//! `hop` samples the newest `2 × max_period` samples are analysed.
//!
//! Cost is O(max_period²) per analysis, which is why the frequency range is
//! clamped before use.

use super::{interval_to_hop, FrequencyBounds, MIN_FREQ_FLOOR};

/// Final sanity range for reported frequencies
pub const YIN_SANITY_MIN_HZ: f32 = 40.0;
pub const YIN_SANITY_MAX_HZ: f32 = 2000.0;

/// Global-minimum fallback is only trusted below this CMND value
const FALLBACK_CMND_LIMIT: f32 = 0.5;

/// Extra lags past sr/min_freq so interpolation has a right neighbour
const PERIOD_MARGIN: usize = 2;

/// Default absolute threshold on the normalised difference
pub const DEFAULT_YIN_THRESHOLD: f32 = 0.15;

/// Streaming YIN estimator with pre-allocated buffers
pub struct YinEstimator {
    sample_rate: u32,
    threshold: f32,
    /// Samples between analyses
    hop: usize,
    samples_until_hop: usize,
    /// Circular history of filtered mono samples
    ring: Vec<f32>,
    write_pos: usize,
    /// Samples received since the last reset (saturating)
    received: usize,
    /// Linearised analysis window (oldest first)
    window: Vec<f32>,
    difference: Vec<f32>,
    cmnd: Vec<f32>,
}

impl YinEstimator {
    /// Create an estimator for the given sample rate and analysis interval
    pub fn new(sample_rate: u32, interval_ms: f32) -> Self {
        let capacity = 2 * Self::max_period_for(sample_rate, MIN_FREQ_FLOOR);
        let mut estimator = Self {
            sample_rate,
            threshold: DEFAULT_YIN_THRESHOLD,
            hop: 1,
            samples_until_hop: 1,
            ring: vec![0.0; capacity],
            write_pos: 0,
            received: 0,
            window: vec![0.0; capacity],
            difference: vec![0.0; capacity / 2],
            cmnd: vec![0.0; capacity / 2],
        };
        estimator.set_interval_ms(interval_ms);
        estimator.samples_until_hop = estimator.hop;
        estimator
    }

    fn max_period_for(sample_rate: u32, min_freq: f32) -> usize {
        (sample_rate as f32 / min_freq).ceil() as usize + PERIOD_MARGIN
    }

    /// Set the absolute threshold (clamped to 0.01..=0.5)
    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold.clamp(0.01, 0.5);
    }

    /// Set the analysis interval; takes effect at the next hop boundary
    pub fn set_interval_ms(&mut self, interval_ms: f32) {
        self.hop = interval_to_hop(self.sample_rate, interval_ms);
    }

    /// Samples between analyses
    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Largest window `detect` can handle
    pub fn capacity(&self) -> usize {
        self.ring.len()
    }

    /// Clear history and restart hop counting
    pub fn reset(&mut self) {
        self.ring.fill(0.0);
        self.write_pos = 0;
        self.received = 0;
        self.samples_until_hop = self.hop;
    }

    /// Push a block of filtered mono samples
    ///
    /// `emit(frequency, cadence_samples)` is called once per completed hop.
    /// A hop yields 0 when the gate is closed or the window has not filled yet.
    pub fn analyze_block<F>(&mut self, mono: &[f32], bounds: FrequencyBounds, gate_open: bool, mut emit: F)
    where
        F: FnMut(f32, usize),
    {
        let len = self.ring.len();
        for &sample in mono {
            self.ring[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % len;
            self.received = self.received.saturating_add(1);

            self.samples_until_hop -= 1;
            if self.samples_until_hop == 0 {
                self.samples_until_hop = self.hop;
                let frequency = if gate_open { self.detect_latest(bounds) } else { 0.0 };
                emit(frequency, self.hop);
            }
        }
    }

    /// Analyse the newest samples in the ring
    fn detect_latest(&mut self, bounds: FrequencyBounds) -> f32 {
        let Some((min_period, max_period)) = self.periods(bounds) else {
            return 0.0;
        };
        let window_len = 2 * max_period;
        if self.received < window_len {
            return 0.0;
        }

        let len = self.ring.len();
        let start = (self.write_pos + len - window_len) % len;
        for (i, slot) in self.window[..window_len].iter_mut().enumerate() {
            *slot = self.ring[(start + i) % len];
        }

        yin(
            &self.window[..window_len],
            &mut self.difference,
            &mut self.cmnd,
            self.sample_rate,
            self.threshold,
            min_period,
            max_period,
        )
    }

    /// Run YIN over an explicit window
    ///
    /// The window must hold at least `2 × max_period` samples, where
    /// `max_period = ceil(sr / min_freq) + 2`; shorter windows report 0.
    pub fn detect(&mut self, window: &[f32], bounds: FrequencyBounds) -> f32 {
        let Some((min_period, max_period)) = self.periods(bounds) else {
            return 0.0;
        };
        if window.len() < 2 * max_period {
            return 0.0;
        }
        yin(
            &window[window.len() - 2 * max_period..],
            &mut self.difference,
            &mut self.cmnd,
            self.sample_rate,
            self.threshold,
            min_period,
            max_period,
        )
    }

    /// Lag search range for the bounds, limited by the pre-allocated capacity
    fn periods(&self, bounds: FrequencyBounds) -> Option<(usize, usize)> {
        let bounds = bounds.clamped();
        let max_period = Self::max_period_for(self.sample_rate, bounds.min_hz).min(self.difference.len());
        let min_period = ((self.sample_rate as f32 / bounds.max_hz).floor() as usize).max(2);
        if max_period <= min_period + PERIOD_MARGIN {
            return None;
        }
        Some((min_period, max_period))
    }
}

/// Core YIN over `window[..2 * max_period]`
fn yin(
    window: &[f32],
    difference: &mut [f32],
    cmnd: &mut [f32],
    sample_rate: u32,
    threshold: f32,
    min_period: usize,
    max_period: usize,
) -> f32 {
    let difference = &mut difference[..max_period];
    let cmnd = &mut cmnd[..max_period];

    // Step 1: difference function
    for (tau, d) in difference.iter_mut().enumerate() {
        let mut sum = 0.0f32;
        for i in 0..max_period {
            let delta = window[i] - window[i + tau];
            sum += delta * delta;
        }
        *d = sum;
    }

    // Step 2: cumulative mean normalised difference
    cmnd[0] = 1.0;
    let mut running_sum = 0.0f32;
    for tau in 1..max_period {
        running_sum += difference[tau];
        cmnd[tau] = if running_sum > 0.0 {
            difference[tau] * tau as f32 / running_sum
        } else {
            1.0
        };
    }

    // Step 3: absolute threshold, then walk down to the local minimum
    let mut best_tau = None;
    let mut tau = min_period;
    while tau < max_period {
        if cmnd[tau] < threshold {
            while tau + 1 < max_period && cmnd[tau + 1] < cmnd[tau] {
                tau += 1;
            }
            best_tau = Some(tau);
            break;
        }
        tau += 1;
    }

    // Fallback: global minimum if it is at least moderately periodic
    let tau = match best_tau {
        Some(tau) => tau,
        None => {
            let (min_tau, min_value) = cmnd[min_period..]
                .iter()
                .enumerate()
                .fold((0, f32::MAX), |acc, (i, &v)| if v < acc.1 { (i, v) } else { acc });
            if min_value >= FALLBACK_CMND_LIMIT {
                return 0.0;
            }
            min_period + min_tau
        }
    };

    // Step 4: parabolic interpolation
    let refined = if tau > 0 && tau + 1 < max_period {
        let s0 = cmnd[tau - 1];
        let s1 = cmnd[tau];
        let s2 = cmnd[tau + 1];
        let denom = s0 - 2.0 * s1 + s2;
        if denom.abs() > 1e-12 {
            tau as f32 + (0.5 * (s0 - s2) / denom).clamp(-1.0, 1.0)
        } else {
            tau as f32
        }
    } else {
        tau as f32
    };

    if refined <= 0.0 {
        return 0.0;
    }

    // Steps 5-6: convert and sanity check
    let frequency = sample_rate as f32 / refined;
    if !(YIN_SANITY_MIN_HZ..=YIN_SANITY_MAX_HZ).contains(&frequency) {
        return 0.0;
    }
    frequency
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_sine_accuracy_across_range() {
        let sample_rate = 48000;
        let bounds = FrequencyBounds::new(40.0, 2000.0);
        let mut yin = YinEstimator::new(sample_rate, 10.0);

        for &freq in &[45.0f32, 82.4, 110.0, 220.0, 440.0, 1000.0, 1760.0, 1950.0] {
            let signal = sine(freq, sample_rate, 4096);
            let detected = yin.detect(&signal, bounds);
            let error = (detected - freq).abs() / freq;
            assert!(error < 0.01, "{}Hz detected as {}Hz", freq, detected);
        }
    }

    #[test]
    fn test_accuracy_at_44100() {
        let bounds = FrequencyBounds::new(50.0, 2000.0);
        let mut yin = YinEstimator::new(44100, 10.0);
        let signal = sine(329.63, 44100, 4096);
        let detected = yin.detect(&signal, bounds);
        assert!((detected - 329.63).abs() / 329.63 < 0.01, "detected {}", detected);
    }

    #[test]
    fn test_silence_reports_no_pitch() {
        let mut yin = YinEstimator::new(48000, 10.0);
        let silence = vec![0.0f32; 4096];
        assert_eq!(yin.detect(&silence, FrequencyBounds::new(50.0, 2000.0)), 0.0);
    }

    #[test]
    fn test_short_window_reports_no_pitch() {
        let mut yin = YinEstimator::new(48000, 10.0);
        let signal = sine(440.0, 48000, 256);
        assert_eq!(yin.detect(&signal, FrequencyBounds::new(50.0, 2000.0)), 0.0);
    }

    #[test]
    fn test_streaming_emits_once_per_hop() {
        let sample_rate = 48000;
        let mut yin = YinEstimator::new(sample_rate, 10.0);
        assert_eq!(yin.hop(), 480);

        let bounds = FrequencyBounds::new(100.0, 2000.0);
        let signal = sine(300.0, sample_rate, 4800);
        let mut results = Vec::new();
        for block in signal.chunks(512) {
            yin.analyze_block(block, bounds, true, |f, cadence| {
                assert_eq!(cadence, 480);
                results.push(f);
            });
        }

        assert_eq!(results.len(), 10);
        // Window for 100Hz is 2 * (480 + 2) samples, so the first hop is still filling
        assert_eq!(results[0], 0.0);
        let last = *results.last().unwrap();
        assert!((last - 300.0).abs() < 3.0, "last estimate {}", last);
    }

    #[test]
    fn test_closed_gate_emits_zero() {
        let mut yin = YinEstimator::new(48000, 10.0);
        let signal = sine(300.0, 48000, 4800);
        let mut voiced = 0;
        yin.analyze_block(&signal, FrequencyBounds::new(100.0, 2000.0), false, |f, _| {
            if f > 0.0 {
                voiced += 1;
            }
        });
        assert_eq!(voiced, 0);
    }

    #[test]
    fn test_ring_covers_lowest_frequency() {
        let yin = YinEstimator::new(48000, 10.0);
        assert!(yin.capacity() >= 2 * (48000 / 20));
    }
}
