//! Detection band-pass: SVF high-pass into SVF low-pass
//!
//! Only the analysis signal is filtered; the audio that reaches the shifter
//! is untouched.

/// Two-pole (12dB/octave) state-variable filter, mono
#[derive(Debug, Clone)]
struct SvfFilter {
    ic1eq: f32,
    ic2eq: f32,
    k: f32,
    a1: f32,
    a2: f32,
    a3: f32,
    cutoff: f32,
}

impl SvfFilter {
    fn new(cutoff: f32, sample_rate: u32) -> Self {
        let mut f = Self {
            ic1eq: 0.0,
            ic2eq: 0.0,
            k: 0.0,
            a1: 0.0,
            a2: 0.0,
            a3: 0.0,
            cutoff: 0.0,
        };
        f.set_cutoff(cutoff, sample_rate);
        f
    }

    fn set_cutoff(&mut self, cutoff: f32, sample_rate: u32) {
        let nyquist_guard = sample_rate as f32 * 0.45;
        let cutoff = cutoff.clamp(20.0, nyquist_guard.max(20.0));
        if cutoff == self.cutoff {
            return;
        }
        self.cutoff = cutoff;

        // Butterworth Q
        let g = (std::f32::consts::PI * cutoff / sample_rate as f32).tan();
        self.k = std::f32::consts::SQRT_2;
        self.a1 = 1.0 / (1.0 + g * (g + self.k));
        self.a2 = g * self.a1;
        self.a3 = g * self.a2;
    }

    /// Process one sample and return (lowpass, highpass)
    #[inline]
    fn process(&mut self, input: f32) -> (f32, f32) {
        let v3 = input - self.ic2eq;
        let v1 = self.a1 * self.ic1eq + self.a2 * v3;
        let v2 = self.ic2eq + self.a2 * self.ic1eq + self.a3 * v3;
        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;

        let low = v2;
        let high = input - self.k * v1 - low;
        (low, high)
    }

    fn reset(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }
}

/// High-pass then low-pass over the mono detection signal
#[derive(Debug, Clone)]
pub struct DetectionFilter {
    highpass: SvfFilter,
    lowpass: SvfFilter,
    sample_rate: u32,
}

impl DetectionFilter {
    pub fn new(sample_rate: u32, highpass_hz: f32, lowpass_hz: f32) -> Self {
        Self {
            highpass: SvfFilter::new(highpass_hz, sample_rate),
            lowpass: SvfFilter::new(lowpass_hz, sample_rate),
            sample_rate,
        }
    }

    /// Update cutoffs; cheap when they have not changed
    pub fn set_cutoffs(&mut self, highpass_hz: f32, lowpass_hz: f32) {
        self.highpass.set_cutoff(highpass_hz, self.sample_rate);
        self.lowpass.set_cutoff(lowpass_hz, self.sample_rate);
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let (_, high) = self.highpass.process(input);
        let (low, _) = self.lowpass.process(high);
        low
    }

    pub fn reset(&mut self) {
        self.highpass.reset();
        self.lowpass.reset();
    }
}
