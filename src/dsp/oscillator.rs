//! Oscillators
//!
//! [`SineVco`] is a phase-accumulating sine with exponential FM and optional
//! tanh saturation. [`MorphOscillator`] sweeps sine → triangle → saw → pulse
//! and then narrows the pulse, with PolyBLEP correction on the saw and pulse
//! discontinuities.

use super::shaping::tanh_sat;
use libm::Libm;
use std::f32::consts::TAU;

/// Frequency of 0 V on a V/oct input (C4)
pub const BASE_FREQUENCY: f32 = 261.625_58;

/// Peak output level in volts
pub const OUTPUT_VOLTS: f32 = 5.0;

/// Narrowest pulse width reached at full morph
const MIN_PULSE_WIDTH: f32 = 0.1;

/// 1V/octave pitch to frequency around [`BASE_FREQUENCY`]
#[inline]
pub fn voct_to_hz(volts: f32) -> f32 {
    BASE_FREQUENCY * Libm::<f32>::exp2(volts)
}

/// Polynomial band-limited step residual for a discontinuity at phase 0.
///
/// `t` is the phase in [0, 1) and `dt` the per-sample phase increment.
#[inline]
pub fn poly_blep(t: f32, dt: f32) -> f32 {
    if dt <= 0.0 {
        return 0.0;
    }
    if t < dt {
        let t = t / dt;
        t + t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + t + t + 1.0
    } else {
        0.0
    }
}

#[inline]
fn wrap_phase(phase: f32) -> f32 {
    let wrapped = phase - libm::floorf(phase);
    if wrapped.is_finite() {
        wrapped
    } else {
        0.0
    }
}

/// Sine oscillator with exponential FM and saturation.
#[derive(Debug, Clone, Copy)]
pub struct SineVco {
    phase: f32,
    sample_rate: f32,
}

impl SineVco {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            phase: 0.0,
            sample_rate: sample_rate.max(1.0),
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate.max(1.0);
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Advance one sample and return the output in volts.
    ///
    /// `fm` is in volts (one octave per volt). `saturation` above 1 drives the
    /// sine into a normalised tanh so the peak stays at ±5 V.
    #[inline]
    pub fn process(&mut self, frequency: f32, fm: f32, saturation: f32) -> f32 {
        let sine = Libm::<f32>::sin(TAU * self.phase);
        let shaped = if saturation > 1.0 {
            tanh_sat(sine, saturation)
        } else {
            sine
        };

        let increment = frequency * Libm::<f32>::exp2(fm) / self.sample_rate;
        self.phase = wrap_phase(self.phase + increment);

        shaped * OUTPUT_VOLTS
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// Continuous sine/triangle/saw/pulse morphing oscillator.
///
/// The 0–1 morph control is split into four equal bands:
///
/// | Band | Crossfade |
/// |------|-----------|
/// | 0 | sine → triangle |
/// | 1 | triangle → saw |
/// | 2 | saw → square |
/// | 3 | square → 10% pulse |
#[derive(Debug, Clone, Copy)]
pub struct MorphOscillator {
    phase: f32,
    sample_rate: f32,
}

impl MorphOscillator {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            phase: 0.0,
            sample_rate: sample_rate.max(1.0),
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate.max(1.0);
    }

    fn sine(phase: f32) -> f32 {
        Libm::<f32>::sin(TAU * phase)
    }

    fn triangle(phase: f32) -> f32 {
        1.0 - 4.0 * (wrap_phase(phase + 0.25) - 0.5).abs()
    }

    fn saw(phase: f32, dt: f32) -> f32 {
        2.0 * phase - 1.0 - poly_blep(phase, dt)
    }

    fn pulse(phase: f32, dt: f32, width: f32) -> f32 {
        let naive = if phase < width { 1.0 } else { -1.0 };
        naive + poly_blep(phase, dt) - poly_blep(wrap_phase(phase - width), dt)
    }

    /// Advance one sample; returns a value in roughly ±1
    #[inline]
    pub fn process(&mut self, frequency: f32, morph: f32) -> f32 {
        let dt = (frequency / self.sample_rate).abs().min(0.5);
        let phase = self.phase;

        let position = if morph.is_nan() { 0.0 } else { morph.clamp(0.0, 1.0) * 4.0 };
        let band = (libm::floorf(position) as usize).min(3);
        let mix = position - band as f32;

        let out = match band {
            0 => Self::sine(phase) + (Self::triangle(phase) - Self::sine(phase)) * mix,
            1 => Self::triangle(phase) + (Self::saw(phase, dt) - Self::triangle(phase)) * mix,
            2 => Self::saw(phase, dt) + (Self::pulse(phase, dt, 0.5) - Self::saw(phase, dt)) * mix,
            _ => {
                let width = 0.5 + (MIN_PULSE_WIDTH - 0.5) * mix;
                Self::pulse(phase, dt, width)
            }
        };

        self.phase = wrap_phase(self.phase + frequency / self.sample_rate);
        out
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rising_zero_crossings(samples: &[f32]) -> usize {
        samples.windows(2).filter(|w| w[0] < 0.0 && w[1] >= 0.0).count()
    }

    #[test]
    fn test_voct() {
        assert_relative_eq!(voct_to_hz(0.0), BASE_FREQUENCY);
        assert_relative_eq!(voct_to_hz(1.0), BASE_FREQUENCY * 2.0, epsilon = 1e-3);
        assert_relative_eq!(voct_to_hz(-1.0), BASE_FREQUENCY * 0.5, epsilon = 1e-3);
    }

    #[test]
    fn test_sine_frequency_and_level() {
        let mut vco = SineVco::new(48000.0);
        let out: Vec<f32> = (0..48000).map(|_| vco.process(100.0, 0.0, 0.0)).collect();
        let crossings = rising_zero_crossings(&out);
        assert!((99..=101).contains(&crossings), "crossings {}", crossings);
        let peak = out.iter().cloned().fold(0.0f32, |a, b| a.max(b.abs()));
        assert_relative_eq!(peak, 5.0, epsilon = 1e-3);
    }

    #[test]
    fn test_fm_doubles_frequency_per_volt() {
        let mut vco = SineVco::new(48000.0);
        let out: Vec<f32> = (0..48000).map(|_| vco.process(100.0, 1.0, 0.0)).collect();
        let crossings = rising_zero_crossings(&out);
        assert!((199..=201).contains(&crossings), "crossings {}", crossings);
    }

    #[test]
    fn test_saturation_keeps_peak() {
        let mut vco = SineVco::new(48000.0);
        let out: Vec<f32> = (0..4800).map(|_| vco.process(100.0, 0.0, 4.0)).collect();
        let peak = out.iter().cloned().fold(0.0f32, |a, b| a.max(b.abs()));
        assert_relative_eq!(peak, 5.0, epsilon = 1e-2);
        // flattened tops spend longer near the peak than a sine does
        let near_peak = out.iter().filter(|v| v.abs() > 4.5).count();
        assert!(near_peak > 4800 / 4);
    }

    #[test]
    fn test_poly_blep_is_local() {
        assert_eq!(poly_blep(0.5, 0.01), 0.0);
        assert_relative_eq!(poly_blep(0.0, 0.01), -1.0);
        assert!(poly_blep(0.995, 0.01) > 0.0);
        assert_eq!(poly_blep(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_morph_zero_is_sine() {
        let mut morph = MorphOscillator::new(48000.0);
        let mut vco = SineVco::new(48000.0);
        for _ in 0..1000 {
            let a = morph.process(220.0, 0.0);
            let b = vco.process(220.0, 0.0, 0.0) / OUTPUT_VOLTS;
            assert_relative_eq!(a, b, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_triangle_band() {
        let mut morph = MorphOscillator::new(1000.0);
        let out: Vec<f32> = (0..1000).map(|_| morph.process(10.0, 0.25)).collect();
        assert_relative_eq!(out[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(out[25], 1.0, epsilon = 1e-4);
        assert_relative_eq!(out[75], -1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_full_morph_is_narrow_pulse() {
        let mut morph = MorphOscillator::new(48000.0);
        let out: Vec<f32> = (0..48000).map(|_| morph.process(100.0, 1.0)).collect();
        let mean = out.iter().sum::<f32>() / out.len() as f32;
        // 10% duty: mean of ±1 pulse is 2 * 0.1 - 1
        assert_relative_eq!(mean, -0.8, epsilon = 0.02);
    }

    #[test]
    fn test_outputs_bounded_across_morph() {
        for step in 0..=20 {
            let mut morph = MorphOscillator::new(44100.0);
            let m = step as f32 / 20.0;
            for _ in 0..2000 {
                let v = morph.process(1234.0, m);
                assert!(v.is_finite() && v.abs() <= 1.5, "morph {} gave {}", m, v);
            }
        }
    }
}
