//! DIO-style periodicity estimator for noisy material
//!
//! Follows the structure of WORLD's DIO: the signal is split into
//! logarithmically spaced low-pass bands. In each band, four event series
//! (negative and positive zero crossings, peaks, dips) give independent
//! period estimates. Their spread scores how periodic the band is, and the
//! best band per frame wins.
//!
//! The estimator owns a rolling window of fixed duration and re-analyses
//! the whole window on every call. It reports nothing until the window has
//! filled once. After that it reports the most recent non-zero frame, which
//! favours tracking fast sweeps over smoothing them.
//!
//! Events are only taken where a band filter sees signal on both sides of
//! its centre. Near the window end, or where the input falls silent, the
//! filter runs off the signal and the measured intervals stretch, so those
//! samples are skipped and the frames there hold the last clean value.

use std::ops::Range;
use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use super::FrequencyBounds;

/// Hard limits on the rolling window duration
pub const DIO_MIN_BUFFER_SECS: f32 = 0.05;
pub const DIO_MAX_BUFFER_SECS: f32 = 1.5;

/// Frames scanned (newest first) for a voiced value
const RECENT_FRAME_SCAN: usize = 10;

/// Longest decimated window analysed per call; longer windows decimate more
const MAX_ANALYSIS_SAMPLES: usize = 24_000;

/// Level (relative to the window peak) that counts as signal
const ACTIVE_LEVEL: f32 = 1e-3;

const EPS: f32 = 1e-9;

/// DIO tuning, set from configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DioConfig {
    /// Rolling window duration in seconds
    pub buffer_time_secs: f32,
    /// Spacing of analysis frames in milliseconds
    pub frame_period_ms: f32,
    /// Decimation factor (1 = full rate, 12 = fastest)
    pub speed: u32,
    /// Largest relative frame-to-frame jump kept in the contour
    pub allowed_range: f32,
    /// Band density
    pub channels_in_octave: f32,
}

impl Default for DioConfig {
    fn default() -> Self {
        Self {
            buffer_time_secs: 0.5,
            frame_period_ms: 2.0,
            speed: 1,
            allowed_range: 0.1,
            channels_in_octave: 2.0,
        }
    }
}

impl DioConfig {
    /// Clamp every field into its supported range
    pub fn sanitized(&self) -> Self {
        Self {
            buffer_time_secs: self.buffer_time_secs.clamp(DIO_MIN_BUFFER_SECS, DIO_MAX_BUFFER_SECS),
            frame_period_ms: self.frame_period_ms.clamp(1.0, 20.0),
            speed: self.speed.clamp(1, 12),
            allowed_range: self.allowed_range.clamp(0.02, 1.0),
            channels_in_octave: self.channels_in_octave.clamp(1.0, 24.0),
        }
    }
}

/// One low-pass band
struct Band {
    boundary_hz: f32,
    /// Filter group delay in decimated samples
    delay: usize,
    spectrum: Vec<Complex<f32>>,
}

/// Interval series from one event type, in frequency units
struct EventSeries {
    locations: Vec<f32>,
    values: Vec<f32>,
    len: usize,
}

impl EventSeries {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            locations: vec![0.0; capacity],
            values: vec![0.0; capacity],
            len: 0,
        }
    }

    /// Collect negative-going zero crossings of `get` over `range` and store
    /// the spacing between consecutive crossings as a frequency
    fn collect<G: Fn(usize) -> f32>(&mut self, range: Range<usize>, fs: f32, get: G) {
        self.len = 0;
        let mut previous_edge: Option<f32> = None;
        for i in range.start..range.end.saturating_sub(1) {
            let a = get(i);
            let b = get(i + 1);
            if a > 0.0 && b <= 0.0 {
                let edge = i as f32 + a / (a - b);
                if let Some(prev) = previous_edge {
                    let spacing = edge - prev;
                    if spacing > EPS && self.len < self.values.len() {
                        self.locations[self.len] = 0.5 * (edge + prev) / fs;
                        self.values[self.len] = fs / spacing;
                        self.len += 1;
                    }
                }
                previous_edge = Some(edge);
            }
        }
    }

    /// Linear interpolation at time `t`, holding the edge values outside
    fn value_at(&self, t: f32) -> f32 {
        let locations = &self.locations[..self.len];
        let values = &self.values[..self.len];
        if t <= locations[0] {
            return values[0];
        }
        if t >= locations[self.len - 1] {
            return values[self.len - 1];
        }
        let upper = locations.partition_point(|&loc| loc < t);
        let lower = upper - 1;
        let span = locations[upper] - locations[lower];
        if span <= EPS {
            return values[lower];
        }
        let frac = (t - locations[lower]) / span;
        values[lower] + (values[upper] - values[lower]) * frac
    }
}

/// Pre-planned FFTs and scratch for analysing one full window
struct DioAnalysis {
    decimation: usize,
    /// Decimated sample rate
    fs: f32,
    y_len: usize,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    time_buf: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    band_spectrum: Vec<Complex<f32>>,
    forward_scratch: Vec<Complex<f32>>,
    inverse_scratch: Vec<Complex<f32>>,
    filtered: Vec<f32>,
    bands: Vec<Band>,
    events: [EventSeries; 4],
    /// Decimated samples of the current window above `ACTIVE_LEVEL`
    active: Range<usize>,
    frame_period_secs: f32,
    best_f0: Vec<f32>,
    best_score: Vec<f32>,
    contour: Vec<f32>,
    f0_floor: f32,
    f0_ceil: f32,
    allowed_range: f32,
    min_segment_frames: usize,
}

/// Decimation for a window: at least `speed`, more for long windows as long
/// as the decimated rate stays at four times the ceiling
fn decimation_for(sample_rate: u32, window_len: usize, speed: u32, bounds: FrequencyBounds) -> usize {
    let by_length = window_len.div_ceil(MAX_ANALYSIS_SAMPLES);
    let rate_limit = ((sample_rate as f32 / (4.0 * bounds.max_hz)) as usize).max(1);
    (speed as usize).max(by_length.min(rate_limit))
}

impl DioAnalysis {
    fn new(sample_rate: u32, window_len: usize, config: &DioConfig, bounds: FrequencyBounds) -> Self {
        let decimation = decimation_for(sample_rate, window_len, config.speed, bounds);
        let fs = sample_rate as f32 / decimation as f32;
        let y_len = (window_len / decimation).max(1);

        // Room for the longest band filter so the convolution never wraps
        let longest_filter = 4 * ((fs / bounds.min_hz / 2.0).round() as usize + 1);
        let fft_len = (y_len + longest_filter + 8).next_power_of_two();

        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(fft_len);
        let inverse = planner.plan_fft_inverse(fft_len);

        let band_count = 1 + ((bounds.max_hz / bounds.min_hz).log2() * config.channels_in_octave).floor() as usize;
        let mut filter_time = vec![0.0f32; fft_len];
        let mut filter_scratch = forward.make_scratch_vec();
        let mut bands = Vec::with_capacity(band_count);
        for i in 0..band_count {
            let boundary_hz = bounds.min_hz * 2f32.powf((i + 1) as f32 / config.channels_in_octave);
            let half_average = ((fs / boundary_hz / 2.0).round() as usize).max(1);
            let filter_len = (half_average * 4).min(fft_len);

            filter_time.fill(0.0);
            nuttall_window(&mut filter_time[..filter_len]);
            let mut spectrum = forward.make_output_vec();
            if forward
                .process_with_scratch(&mut filter_time, &mut spectrum, &mut filter_scratch)
                .is_err()
            {
                log::warn!("DIO: band filter FFT failed for {:.1}Hz", boundary_hz);
                continue;
            }

            bands.push(Band {
                boundary_hz,
                delay: half_average * 2,
                spectrum,
            });
        }

        let frame_period_secs = config.frame_period_ms / 1000.0;
        let window_secs = window_len as f32 / sample_rate as f32;
        let frame_count = (window_secs / frame_period_secs).floor() as usize + 1;
        let min_segment_frames = (0.5 + 1000.0 / (config.frame_period_ms * bounds.min_hz)) as usize;

        let event_capacity = y_len / 2 + 1;
        Self {
            decimation,
            fs,
            y_len,
            time_buf: forward.make_input_vec(),
            spectrum: forward.make_output_vec(),
            band_spectrum: inverse.make_input_vec(),
            forward_scratch: forward.make_scratch_vec(),
            inverse_scratch: inverse.make_scratch_vec(),
            filtered: inverse.make_output_vec(),
            forward,
            inverse,
            bands,
            events: [
                EventSeries::with_capacity(event_capacity),
                EventSeries::with_capacity(event_capacity),
                EventSeries::with_capacity(event_capacity),
                EventSeries::with_capacity(event_capacity),
            ],
            active: 0..0,
            frame_period_secs,
            best_f0: vec![0.0; frame_count],
            best_score: vec![0.0; frame_count],
            contour: vec![0.0; frame_count],
            f0_floor: bounds.min_hz,
            f0_ceil: bounds.max_hz,
            allowed_range: config.allowed_range,
            min_segment_frames,
        }
    }

    /// Analyse a full window (oldest first) and return the fixed contour
    fn run(&mut self, window: &[f32]) -> &[f32] {
        self.best_f0.fill(0.0);
        self.best_score.fill(f32::MAX);

        // Decimate with boxcar averaging
        let d = self.decimation;
        let mut peak = 0.0f32;
        for (k, slot) in self.time_buf[..self.y_len].iter_mut().enumerate() {
            let chunk = &window[k * d..(k * d + d).min(window.len())];
            *slot = chunk.iter().sum::<f32>() / chunk.len().max(1) as f32;
            peak = peak.max(slot.abs());
        }

        // Trim silent edges, then remove DC from what is left
        let level = peak * ACTIVE_LEVEL;
        let samples = &self.time_buf[..self.y_len];
        let (Some(first), Some(last)) = (
            samples.iter().position(|s| s.abs() > level),
            samples.iter().rposition(|s| s.abs() > level),
        ) else {
            self.active = 0..0;
            self.contour.fill(0.0);
            return &self.contour;
        };
        self.active = first..last + 1;

        let active = &mut self.time_buf[first..=last];
        let mean = active.iter().sum::<f32>() / active.len() as f32;
        for slot in active.iter_mut() {
            *slot -= mean;
        }
        self.time_buf[..first].fill(0.0);
        self.time_buf[last + 1..].fill(0.0);

        if self
            .forward
            .process_with_scratch(&mut self.time_buf, &mut self.spectrum, &mut self.forward_scratch)
            .is_err()
        {
            self.contour.fill(0.0);
            return &self.contour;
        }

        for band_idx in 0..self.bands.len() {
            self.analyse_band(band_idx);
        }

        self.fix_contour();
        &self.contour
    }

    fn analyse_band(&mut self, band_idx: usize) {
        let band = &self.bands[band_idx];
        for ((out, &x), &h) in self
            .band_spectrum
            .iter_mut()
            .zip(self.spectrum.iter())
            .zip(band.spectrum.iter())
        {
            *out = x * h;
        }
        // Real signal: DC and Nyquist bins carry no imaginary part
        if let Some(first) = self.band_spectrum.first_mut() {
            first.im = 0.0;
        }
        if let Some(last) = self.band_spectrum.last_mut() {
            last.im = 0.0;
        }
        if self
            .inverse
            .process_with_scratch(&mut self.band_spectrum, &mut self.filtered, &mut self.inverse_scratch)
            .is_err()
        {
            return;
        }

        let boundary = band.boundary_hz;
        let delay = band.delay;
        let len = self.y_len.min(self.filtered.len().saturating_sub(delay));
        // filtered[delay + i] is centred on input sample i
        let x = &self.filtered[delay..delay + len];
        let fs = self.fs;

        let start = self.active.start + delay;
        let end = self.active.end.saturating_sub(delay).min(len);
        if end <= start {
            return;
        }

        let [neg, pos, peak, dip] = &mut self.events;
        neg.collect(start..end, fs, |i| x[i]);
        pos.collect(start..end, fs, |i| -x[i]);
        peak.collect(start..end - 1, fs, |i| x[i + 1] - x[i]);
        dip.collect(start..end - 1, fs, |i| x[i] - x[i + 1]);

        if self.events.iter().any(|series| series.len < 2) {
            return;
        }

        for frame in 0..self.best_f0.len() {
            let t = frame as f32 * self.frame_period_secs;
            let mut values = [0.0f32; 4];
            for (value, series) in values.iter_mut().zip(self.events.iter()) {
                *value = series.value_at(t);
            }
            let candidate = values.iter().sum::<f32>() / 4.0;
            if candidate > boundary
                || candidate < boundary / 2.0
                || candidate > self.f0_ceil
                || candidate < self.f0_floor
            {
                continue;
            }
            let deviation = (values.iter().map(|v| (v - candidate).powi(2)).sum::<f32>() / 3.0).sqrt();
            let score = deviation / (candidate + EPS);
            if score < self.best_score[frame] {
                self.best_score[frame] = score;
                self.best_f0[frame] = candidate;
            }
        }
    }

    /// Remove implausible jumps and short interior voiced fragments
    fn fix_contour(&mut self) {
        let n = self.best_f0.len();
        self.contour.copy_from_slice(&self.best_f0);
        for i in 1..n {
            let (prev, cur) = (self.best_f0[i - 1], self.best_f0[i]);
            if prev > 0.0 && cur > 0.0 && (cur - prev).abs() / (cur + EPS) >= self.allowed_range {
                self.contour[i] = 0.0;
            }
        }

        let mut i = 0;
        while i < n {
            if self.contour[i] <= 0.0 {
                i += 1;
                continue;
            }
            let start = i;
            while i < n && self.contour[i] > 0.0 {
                i += 1;
            }
            // The trailing segment is kept so onsets report immediately
            if i < n && i - start < self.min_segment_frames {
                self.contour[start..i].fill(0.0);
            }
        }
    }
}

/// Nuttall window (WORLD's low-pass kernel)
fn nuttall_window(out: &mut [f32]) {
    let n = out.len();
    if n == 1 {
        out[0] = 1.0;
        return;
    }
    let denom = (n - 1) as f32;
    for (i, w) in out.iter_mut().enumerate() {
        let t = i as f32 / denom;
        let tau = 2.0 * std::f32::consts::PI * t;
        *w = 0.355768 - 0.487396 * tau.cos() + 0.144232 * (2.0 * tau).cos() - 0.012604 * (3.0 * tau).cos();
    }
}

/// Rolling-window DIO estimator
pub struct DioEstimator {
    sample_rate: u32,
    config: DioConfig,
    ring: Vec<f32>,
    write_pos: usize,
    received: usize,
    filled: bool,
    /// Samples since the last analysis
    pending: usize,
    linear: Vec<f32>,
    analysis: DioAnalysis,
    /// Returned when the newest frames hold nothing in range
    last_valid_pitch: f32,
}

impl DioEstimator {
    /// Build an estimator; allocates, so call off the audio thread
    pub fn new(sample_rate: u32, config: DioConfig, bounds: FrequencyBounds) -> Self {
        let config = config.sanitized();
        let bounds = bounds.clamped();
        let window_len = ((sample_rate as f32 * config.buffer_time_secs) as usize).max(64);
        let analysis = DioAnalysis::new(sample_rate, window_len, &config, bounds);
        log::debug!(
            "DIO: {} sample window, decimation {} (speed {}), {:.1}-{:.1}Hz",
            window_len,
            analysis.decimation,
            config.speed,
            bounds.min_hz,
            bounds.max_hz
        );
        Self {
            sample_rate,
            config,
            ring: vec![0.0; window_len],
            write_pos: 0,
            received: 0,
            filled: false,
            pending: 0,
            linear: vec![0.0; window_len],
            analysis,
            last_valid_pitch: 0.0,
        }
    }

    pub fn config(&self) -> &DioConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Whether the rolling window has filled at least once
    pub fn is_filled(&self) -> bool {
        self.filled
    }

    /// Number of analysis bands
    pub fn band_count(&self) -> usize {
        self.analysis.bands.len()
    }

    /// Decimation actually applied, at least the configured speed
    pub fn decimation(&self) -> usize {
        self.analysis.decimation
    }

    pub fn reset(&mut self) {
        self.ring.fill(0.0);
        self.write_pos = 0;
        self.received = 0;
        self.filled = false;
        self.pending = 0;
        self.last_valid_pitch = 0.0;
    }

    /// Append a block; analyse once at least `hop` samples have arrived
    ///
    /// `emit(frequency, cadence_samples)` is called at most once per block.
    pub fn analyze_block<F>(&mut self, mono: &[f32], hop: usize, bounds: FrequencyBounds, gate_open: bool, mut emit: F)
    where
        F: FnMut(f32, usize),
    {
        let len = self.ring.len();
        for &sample in mono {
            self.ring[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % len;
        }
        self.received = self.received.saturating_add(mono.len());
        if !self.filled && self.received >= len {
            self.filled = true;
            log::debug!("DIO: rolling window filled");
        }

        self.pending += mono.len();
        if self.pending < hop.max(1) {
            return;
        }
        let cadence = self.pending;
        self.pending = 0;

        let frequency = if self.filled && gate_open { self.estimate(bounds) } else { 0.0 };
        emit(frequency, cadence);
    }

    /// Analyse the current window; assumes `filled`
    fn estimate(&mut self, bounds: FrequencyBounds) -> f32 {
        let len = self.ring.len();
        let (newer, older) = self.ring.split_at(self.write_pos);
        self.linear[..older.len()].copy_from_slice(older);
        self.linear[older.len()..len].copy_from_slice(newer);

        let contour = self.analysis.run(&self.linear);
        let latest = contour
            .iter()
            .rev()
            .take(RECENT_FRAME_SCAN)
            .copied()
            .find(|&f0| f0 > 0.0)
            .unwrap_or(0.0);

        let bounds = bounds.clamped();
        if latest < bounds.min_hz || latest > bounds.max_hz {
            return self.last_valid_pitch;
        }
        self.last_valid_pitch = latest;
        latest
    }
}
