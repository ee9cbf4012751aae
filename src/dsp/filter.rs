//! Small IIR filter primitives
//!
//! | type               | topology                        |
//! | ------------------ | ------------------------------- |
//! | [`SimpleLp`]       | one-pole lowpass                |
//! | [`TwoPoleLp`]      | RBJ biquad lowpass with Q       |
//! | [`BandPassFilter`] | one-pole HP into one-pole LP    |
//! | [`BiquadBandpass`] | RBJ biquad bandpass, 0dB peak   |
//!
//! [`BiquadBandpass`] sits in front of the AD generator's envelope followers.
//!
//! Filters that depend on the sample rate keep it alongside their cutoff and
//! recompute coefficients lazily on the next `process` call after either one
//! changes.

use libm::Libm;
use std::f32::consts::PI;

/// Highest cutoff as a fraction of the sample rate
const MAX_CUTOFF_RATIO: f32 = 0.49;

#[inline]
fn clamp_cutoff(cutoff: f32, sample_rate: f32) -> f32 {
    if cutoff.is_nan() {
        return 20.0;
    }
    cutoff.clamp(1.0, sample_rate * MAX_CUTOFF_RATIO)
}

/// One-pole smoothing coefficient `1 - e^(-dt / time)` cached per `dt`.
#[derive(Debug, Clone, Copy)]
pub struct OnePoleCoefficient {
    time: f32,
    dt: f32,
    coefficient: f32,
}

impl OnePoleCoefficient {
    pub fn from_time(time: f32) -> Self {
        Self {
            time: time.max(0.0),
            dt: 0.0,
            coefficient: 1.0,
        }
    }

    pub fn set_time(&mut self, time: f32) {
        let time = if time.is_nan() { 0.0 } else { time.max(0.0) };
        if time != self.time {
            self.time = time;
            self.dt = 0.0;
        }
    }

    #[inline]
    pub fn get(&mut self, dt: f32) -> f32 {
        if dt != self.dt {
            self.dt = dt;
            self.coefficient = if self.time <= 0.0 {
                1.0
            } else {
                1.0 - Libm::<f32>::exp(-dt / self.time)
            };
        }
        self.coefficient
    }
}

/// One-pole lowpass, 6dB/oct.
#[derive(Debug, Clone, Copy)]
pub struct SimpleLp {
    state: f32,
    cutoff: f32,
    sample_rate: f32,
    coefficient: f32,
    dirty: bool,
}

impl SimpleLp {
    pub fn new(cutoff: f32, sample_rate: f32) -> Self {
        Self {
            state: 0.0,
            cutoff,
            sample_rate,
            coefficient: 1.0,
            dirty: true,
        }
    }

    pub fn set_cutoff(&mut self, cutoff: f32) {
        if cutoff != self.cutoff {
            self.cutoff = cutoff;
            self.dirty = true;
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            self.dirty = true;
        }
    }

    /// Current coefficient (recomputed if stale)
    pub fn coefficient(&mut self) -> f32 {
        if self.dirty {
            let cutoff = clamp_cutoff(self.cutoff, self.sample_rate);
            self.coefficient = 1.0 - Libm::<f32>::exp(-2.0 * PI * cutoff / self.sample_rate);
            self.dirty = false;
        }
        self.coefficient
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let a = self.coefficient();
        self.state += (input - self.state) * a;
        self.state
    }

    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}

/// Band-pass built from a one-pole highpass at `center / 2^(width/2)` feeding
/// a one-pole lowpass at `center * 2^(width/2)`; `width` is in octaves.
#[derive(Debug, Clone, Copy)]
pub struct BandPassFilter {
    low_edge: SimpleLp,
    high_edge: SimpleLp,
    center: f32,
    width: f32,
}

impl BandPassFilter {
    pub fn new(center: f32, width_octaves: f32, sample_rate: f32) -> Self {
        let mut filter = Self {
            low_edge: SimpleLp::new(center, sample_rate),
            high_edge: SimpleLp::new(center, sample_rate),
            center,
            width: width_octaves,
        };
        filter.retune();
        filter
    }

    fn retune(&mut self) {
        let half = Libm::<f32>::exp2(self.width.clamp(0.1, 8.0) * 0.5);
        self.low_edge.set_cutoff(self.center / half);
        self.high_edge.set_cutoff(self.center * half);
    }

    pub fn set_center(&mut self, center: f32) {
        self.center = center;
        self.retune();
    }

    pub fn set_width(&mut self, width_octaves: f32) {
        self.width = width_octaves;
        self.retune();
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.low_edge.set_sample_rate(sample_rate);
        self.high_edge.set_sample_rate(sample_rate);
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let highpassed = input - self.low_edge.process(input);
        self.high_edge.process(highpassed)
    }

    pub fn reset(&mut self) {
        self.low_edge.reset();
        self.high_edge.reset();
    }
}

/// Normalized biquad coefficients (a0 = 1)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct BiquadCoefficients {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BiquadKind {
    LowPass,
    BandPass,
}

/// Transposed direct form II biquad with lazily recomputed coefficients.
#[derive(Debug, Clone, Copy)]
struct BiquadCore {
    kind: BiquadKind,
    frequency: f32,
    q: f32,
    sample_rate: f32,
    coefficients: BiquadCoefficients,
    z1: f32,
    z2: f32,
    dirty: bool,
}

impl BiquadCore {
    fn new(kind: BiquadKind, frequency: f32, q: f32, sample_rate: f32) -> Self {
        Self {
            kind,
            frequency,
            q,
            sample_rate,
            coefficients: BiquadCoefficients::default(),
            z1: 0.0,
            z2: 0.0,
            dirty: true,
        }
    }

    fn set_frequency(&mut self, frequency: f32) {
        if frequency != self.frequency {
            self.frequency = frequency;
            self.dirty = true;
        }
    }

    fn set_q(&mut self, q: f32) {
        if q != self.q {
            self.q = q;
            self.dirty = true;
        }
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            self.dirty = true;
        }
    }

    fn update(&mut self) {
        let frequency = clamp_cutoff(self.frequency, self.sample_rate);
        let q = if self.q.is_nan() {
            0.707
        } else {
            self.q.clamp(0.1, 40.0)
        };
        let w0 = 2.0 * PI * frequency / self.sample_rate;
        let cos_w0 = Libm::<f32>::cos(w0);
        let alpha = Libm::<f32>::sin(w0) / (2.0 * q);
        let a0 = 1.0 + alpha;

        let (b0, b1, b2) = match self.kind {
            BiquadKind::LowPass => {
                let b1 = 1.0 - cos_w0;
                (b1 * 0.5, b1, b1 * 0.5)
            }
            BiquadKind::BandPass => (alpha, 0.0, -alpha),
        };
        self.coefficients = BiquadCoefficients {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        };
        self.dirty = false;
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        if self.dirty {
            self.update();
        }
        let c = self.coefficients;
        let output = c.b0 * input + self.z1;
        self.z1 = c.b1 * input - c.a1 * output + self.z2;
        self.z2 = c.b2 * input - c.a2 * output;
        if !output.is_finite() {
            self.reset();
            return 0.0;
        }
        output
    }

    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// RBJ band-pass biquad with 0dB gain at the center frequency.
#[derive(Debug, Clone, Copy)]
pub struct BiquadBandpass {
    core: BiquadCore,
}

impl BiquadBandpass {
    pub fn new(center: f32, q: f32, sample_rate: f32) -> Self {
        Self {
            core: BiquadCore::new(BiquadKind::BandPass, center, q, sample_rate),
        }
    }

    pub fn set_center(&mut self, center: f32) {
        self.core.set_frequency(center);
    }

    pub fn set_q(&mut self, q: f32) {
        self.core.set_q(q);
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.core.set_sample_rate(sample_rate);
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        self.core.process(input)
    }

    pub fn reset(&mut self) {
        self.core.reset();
    }
}

/// Resonant two-pole (12dB/oct) lowpass.
#[derive(Debug, Clone, Copy)]
pub struct TwoPoleLp {
    core: BiquadCore,
}

impl TwoPoleLp {
    pub fn new(cutoff: f32, q: f32, sample_rate: f32) -> Self {
        Self {
            core: BiquadCore::new(BiquadKind::LowPass, cutoff, q, sample_rate),
        }
    }

    pub fn set_cutoff(&mut self, cutoff: f32) {
        self.core.set_frequency(cutoff);
    }

    pub fn set_q(&mut self, q: f32) {
        self.core.set_q(q);
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.core.set_sample_rate(sample_rate);
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        self.core.process(input)
    }

    pub fn reset(&mut self) {
        self.core.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SAMPLE_RATE: f32 = 48000.0;

    /// Peak absolute output after the filter settles on a sine input
    fn sine_gain(mut filter: impl FnMut(f32) -> f32, frequency: f32) -> f32 {
        let samples = SAMPLE_RATE as usize;
        let mut peak = 0.0f32;
        for n in 0..samples {
            let x = Libm::<f32>::sin(2.0 * PI * frequency * n as f32 / SAMPLE_RATE);
            let y = filter(x);
            if n > samples / 2 {
                peak = peak.max(y.abs());
            }
        }
        peak
    }

    #[test]
    fn test_simple_lp_dc_and_rolloff() {
        let mut lp = SimpleLp::new(100.0, SAMPLE_RATE);
        for _ in 0..10_000 {
            lp.process(1.0);
        }
        assert_relative_eq!(lp.process(1.0), 1.0, epsilon = 1e-4);

        let mut lp = SimpleLp::new(100.0, SAMPLE_RATE);
        assert!(sine_gain(|x| lp.process(x), 5000.0) < 0.05);
    }

    #[test]
    fn test_sample_rate_change_recomputes() {
        let mut lp = SimpleLp::new(1000.0, 44100.0);
        let at_44k = lp.coefficient();
        lp.set_sample_rate(96000.0);
        let at_96k = lp.coefficient();
        assert!(at_96k < at_44k);
    }

    #[test]
    fn test_biquad_bandpass_unity_at_center() {
        let mut bp = BiquadBandpass::new(1000.0, 2.0, SAMPLE_RATE);
        let gain = sine_gain(|x| bp.process(x), 1000.0);
        assert_relative_eq!(gain, 1.0, epsilon = 0.02);

        let mut bp = BiquadBandpass::new(1000.0, 2.0, SAMPLE_RATE);
        assert!(sine_gain(|x| bp.process(x), 100.0) < 0.1);
        let mut bp = BiquadBandpass::new(1000.0, 2.0, SAMPLE_RATE);
        assert!(sine_gain(|x| bp.process(x), 10000.0) < 0.1);
    }

    #[test]
    fn test_two_pole_lp_passes_low_blocks_high() {
        let mut lp = TwoPoleLp::new(500.0, 0.707, SAMPLE_RATE);
        assert!(sine_gain(|x| lp.process(x), 50.0) > 0.95);
        let mut lp = TwoPoleLp::new(500.0, 0.707, SAMPLE_RATE);
        assert!(sine_gain(|x| lp.process(x), 8000.0) < 0.01);
    }

    #[test]
    fn test_band_pass_filter_shape() {
        let mut bp = BandPassFilter::new(1000.0, 2.0, SAMPLE_RATE);
        let center = sine_gain(|x| bp.process(x), 1000.0);
        let mut bp = BandPassFilter::new(1000.0, 2.0, SAMPLE_RATE);
        let low = sine_gain(|x| bp.process(x), 30.0);
        let mut bp = BandPassFilter::new(1000.0, 2.0, SAMPLE_RATE);
        let high = sine_gain(|x| bp.process(x), 15000.0);
        assert!(center > low * 4.0);
        assert!(center > high * 3.0);
    }

    #[test]
    fn test_out_of_range_cutoff_is_clamped() {
        let mut lp = TwoPoleLp::new(1.0e9, 0.707, SAMPLE_RATE);
        let mut bp = BiquadBandpass::new(f32::NAN, f32::NAN, SAMPLE_RATE);
        for n in 0..1000 {
            let x = if n % 2 == 0 { 1.0 } else { -1.0 };
            assert!(lp.process(x).is_finite());
            assert!(bp.process(x).is_finite());
        }
    }

    #[test]
    fn test_one_pole_coefficient() {
        let mut c = OnePoleCoefficient::from_time(0.0);
        assert_eq!(c.get(0.001), 1.0);
        c.set_time(0.001);
        assert_relative_eq!(c.get(0.001), 1.0 - (-1.0f32).exp(), epsilon = 1e-6);
    }
}
