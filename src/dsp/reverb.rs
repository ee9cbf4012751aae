//! Stereo comb/allpass reverb
//!
//! Each channel runs four damped feedback combs in parallel followed by four
//! serial allpasses. The left channel sums all four combs and the right sums
//! two, which decorrelates the image further. Room size sets where an extra
//! LFO-modulated tap reads the first comb. Line lengths are
//! tuned at 44.1 kHz and rescaled to the running rate inside buffers sized for
//! 192 kHz, so a rate change never reallocates.

use super::delay::{AllpassLine, CombLine};
use libm::Libm;
use std::f32::consts::TAU;

/// Rate the base line lengths are tuned for
const TUNING_RATE: f32 = 44100.0;

/// Highest rate the fixed buffers can fully represent
const MAX_RATE: f32 = 192000.0;

const COMB_LENGTHS: [[usize; 4]; 2] = [[1116, 1188, 1277, 1356], [1422, 1491, 1557, 1617]];
const ALLPASS_LENGTHS: [usize; 4] = [556, 441, 341, 225];
const STEREO_SPREAD: usize = 23;

/// Combs summed into the output, per channel (left, right)
pub const AUDIBLE_COMBS: [usize; 2] = [4, 2];

/// Upper bound on the feedback coefficient
pub const MAX_FEEDBACK: f32 = 0.995;

/// Rate of the extra-tap modulation
const TAP_LFO_HZ: f32 = 0.3;

/// Depth of the extra-tap modulation, as a fraction of the tap offset
const TAP_LFO_DEPTH: f32 = 0.1;

fn capacity_for(base: usize) -> usize {
    (base as f32 * MAX_RATE / TUNING_RATE) as usize + 2
}

fn scaled(base: usize, sample_rate: f32) -> usize {
    ((base as f32 * sample_rate / TUNING_RATE) as usize).max(1)
}

/// `clamp(0.5 + decay * 0.485 + modulation, 0, 0.995)`
#[inline]
pub fn feedback_for(decay: f32, modulation: f32) -> f32 {
    let feedback = 0.5 + decay * 0.485 + modulation;
    if feedback.is_nan() {
        return 0.5;
    }
    feedback.clamp(0.0, MAX_FEEDBACK)
}

/// Per-sample controls for [`ReverbProcessor::process`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverbSettings {
    /// 0–1
    pub room: f32,
    /// 0–1, mapped through [`feedback_for`]
    pub decay: f32,
    /// 0–1 high-frequency damping in the comb loops
    pub damping: f32,
    /// Added to the feedback before clamping
    pub feedback_modulation: f32,
}

impl Default for ReverbSettings {
    fn default() -> Self {
        Self {
            room: 0.5,
            decay: 0.5,
            damping: 0.3,
            feedback_modulation: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct Channel {
    combs: [CombLine; 4],
    allpasses: [AllpassLine; 4],
    comb_bases: [usize; 4],
    allpass_bases: [usize; 4],
    audible: usize,
}

impl Channel {
    fn new(
        comb_bases: [usize; 4],
        allpass_bases: [usize; 4],
        audible: usize,
        sample_rate: f32,
    ) -> Self {
        let combs = comb_bases.map(|base| CombLine::new(capacity_for(base), scaled(base, sample_rate)));
        let allpasses =
            allpass_bases.map(|base| AllpassLine::new(capacity_for(base), scaled(base, sample_rate)));
        Self {
            combs,
            allpasses,
            comb_bases,
            allpass_bases,
            audible: audible.clamp(1, 4),
        }
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        for (comb, &base) in self.combs.iter_mut().zip(&self.comb_bases) {
            comb.set_length(scaled(base, sample_rate));
        }
        for (ap, &base) in self.allpasses.iter_mut().zip(&self.allpass_bases) {
            ap.set_length(scaled(base, sample_rate));
        }
    }

    fn process(&mut self, input: f32, tap_scale: f32, feedback: f32, damping: f32) -> f32 {
        let audible = self.audible;
        let mut sum = 0.0;
        for (i, comb) in self.combs.iter_mut().enumerate() {
            let out = comb.process(input, feedback, damping);
            if i < audible {
                sum += out;
            }
        }

        let first = &self.combs[0];
        sum += first.tap(first.length() as f32 * tap_scale);

        let mut out = sum / (audible + 1) as f32;
        for ap in &mut self.allpasses {
            out = ap.process(out);
        }
        out
    }

    fn clear(&mut self) {
        self.combs.iter_mut().for_each(CombLine::clear);
        self.allpasses.iter_mut().for_each(AllpassLine::clear);
    }
}

#[derive(Debug, Clone)]
pub struct ReverbProcessor {
    left: Channel,
    right: Channel,
    lfo_phase: f32,
    sample_rate: f32,
}

impl ReverbProcessor {
    pub fn new(sample_rate: f32) -> Self {
        let sample_rate = sample_rate.clamp(1.0, MAX_RATE);
        let right_allpass = ALLPASS_LENGTHS.map(|l| l + STEREO_SPREAD);
        Self {
            left: Channel::new(COMB_LENGTHS[0], ALLPASS_LENGTHS, AUDIBLE_COMBS[0], sample_rate),
            right: Channel::new(COMB_LENGTHS[1], right_allpass, AUDIBLE_COMBS[1], sample_rate),
            lfo_phase: 0.0,
            sample_rate,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate.clamp(1.0, MAX_RATE);
        self.left.set_sample_rate(self.sample_rate);
        self.right.set_sample_rate(self.sample_rate);
    }

    /// Number of combs summed into each output: `(left, right)`
    pub fn audible_combs(&self) -> (usize, usize) {
        (self.left.audible, self.right.audible)
    }

    pub fn process(&mut self, left: f32, right: f32, settings: &ReverbSettings) -> (f32, f32) {
        let room = settings.room.clamp(0.0, 1.0);
        let feedback = feedback_for(settings.decay.clamp(0.0, 1.0), settings.feedback_modulation);
        let damping = 1.0 - settings.damping.clamp(0.0, 1.0) * 0.9;

        let lfo = Libm::<f32>::sin(TAU * self.lfo_phase);
        self.lfo_phase += TAP_LFO_HZ / self.sample_rate;
        self.lfo_phase -= libm::floorf(self.lfo_phase);
        let tap_scale = room * 0.5 * (1.0 + lfo * TAP_LFO_DEPTH);

        let left = if left.is_finite() { left } else { 0.0 };
        let right = if right.is_finite() { right } else { 0.0 };
        (
            self.left.process(left, tap_scale, feedback, damping),
            self.right.process(right, tap_scale, feedback, damping),
        )
    }

    /// Zero every buffer and index
    pub fn reset(&mut self) {
        self.left.clear();
        self.right.clear();
        self.lfo_phase = 0.0;
    }
}
