//! Clocked Euclidean track shared by the rhythm modules
//!
//! One track is a pattern, a clock divider/multiplier feeding it steps, a
//! trigger pulse and a curved AD envelope fired on every onset.

use crate::dsp::chain::track_cycle_clock;
use crate::dsp::clock::ClockDivMult;
use crate::dsp::envelope::{AdEnvelope, EnvelopeGenerator};
use crate::dsp::euclid::EuclideanPattern;
use crate::port::{knob_to_seconds, ParamBank, ParamDef, ParamId, ParamRange, ParamUnit};
use crate::trigger::{PulseGenerator, TRIGGER_PULSE_SECONDS};

/// Longest pattern the rhythm modules expose
pub const MAX_TRACK_LENGTH: usize = 32;

/// Number of parameters per track, laid out from the track's base id
pub const TRACK_PARAMS: u32 = 7;
pub const LENGTH: u32 = 0;
pub const FILL: u32 = 1;
pub const SHIFT: u32 = 2;
pub const DIV_MULT: u32 = 3;
pub const ATTACK: u32 = 4;
pub const DECAY: u32 = 5;
pub const CURVE: u32 = 6;

/// Parameter table of one track; names carry the 1-based `label`
pub fn track_param_defs(base: ParamId, label: usize) -> Vec<ParamDef> {
    vec![
        ParamDef::new(
            base + LENGTH,
            format!("length{}", label),
            ParamRange::Integer {
                min: 1,
                max: MAX_TRACK_LENGTH as i32,
            },
            16.0,
        )
        .unit(ParamUnit::Steps),
        ParamDef::new(base + FILL, format!("fill{}", label), ParamRange::UNIT, 0.25)
            .unit(ParamUnit::Percent),
        ParamDef::new(
            base + SHIFT,
            format!("shift{}", label),
            ParamRange::Integer {
                min: 0,
                max: MAX_TRACK_LENGTH as i32 - 1,
            },
            0.0,
        )
        .unit(ParamUnit::Steps),
        ParamDef::new(
            base + DIV_MULT,
            format!("divmult{}", label),
            ParamRange::Integer { min: -3, max: 3 },
            0.0,
        )
        .unit(ParamUnit::DivMult),
        ParamDef::new(base + ATTACK, format!("attack{}", label), ParamRange::UNIT, 0.1)
            .unit(ParamUnit::KnobSeconds),
        ParamDef::new(base + DECAY, format!("decay{}", label), ParamRange::UNIT, 0.4)
            .unit(ParamUnit::KnobSeconds),
        ParamDef::new(
            base + CURVE,
            format!("curve{}", label),
            ParamRange::Linear {
                min: -0.99,
                max: 0.99,
            },
            0.0,
        ),
    ]
}

/// CV offsets added to a track's knobs, as fractions of full scale (10 V = 1.0)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackModulation {
    pub length: f32,
    pub fill: f32,
    pub shift: f32,
}

/// Resolve a track's knobs plus modulation into [`TrackSettings`].
///
/// Length CV spans the full 32 steps, fill CV the full 0–100 % and shift CV one
/// pattern length. `extra_shift` is added on top (manual rotation).
pub fn track_settings(
    params: &ParamBank,
    base: ParamId,
    cv: &TrackModulation,
    extra_shift: i32,
) -> TrackSettings {
    let length_offset = libm::roundf(cv.length * MAX_TRACK_LENGTH as f32) as i32;
    let length = (params.int(base + LENGTH) + length_offset).clamp(1, MAX_TRACK_LENGTH as i32);

    let fill_fraction = (params.value(base + FILL) + cv.fill).clamp(0.0, 1.0);
    let fill = libm::roundf(fill_fraction * length as f32) as usize;

    let shift = params.int(base + SHIFT) + libm::roundf(cv.shift * length as f32) as i32 + extra_shift;

    TrackSettings {
        length: length as usize,
        fill,
        shift,
        div_mult: params.int(base + DIV_MULT),
        attack: knob_to_seconds(params.value(base + ATTACK)),
        decay: knob_to_seconds(params.value(base + DECAY)),
        curve: params.value(base + CURVE),
    }
}

/// Resolved per-sample controls of a track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSettings {
    pub length: usize,
    pub fill: usize,
    pub shift: i32,
    pub div_mult: i32,
    pub attack: f32,
    pub decay: f32,
    pub curve: f32,
}

impl Default for TrackSettings {
    fn default() -> Self {
        Self {
            length: 16,
            fill: 4,
            shift: 0,
            div_mult: 0,
            attack: 0.001,
            decay: 0.3,
            curve: 0.0,
        }
    }
}

/// What a track did on one sample
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackFrame {
    /// An internal step happened on this sample
    pub stepped: bool,
    /// The step that just happened is an onset
    pub onset: bool,
    /// 1 ms trigger output is high
    pub trigger: bool,
    /// Internal clock gate is high on an onset step
    pub gate: bool,
    /// Envelope level in [0, 1]
    pub envelope: f32,
}

#[derive(Debug, Clone)]
pub struct EuclideanTrack {
    pattern: EuclideanPattern,
    clock: ClockDivMult,
    envelope: AdEnvelope,
    pulse: PulseGenerator,
    current_step: usize,
    step_active: bool,
}

impl EuclideanTrack {
    pub fn new() -> Self {
        Self {
            pattern: EuclideanPattern::default(),
            clock: ClockDivMult::new(),
            envelope: AdEnvelope::default(),
            pulse: PulseGenerator::new(),
            current_step: 0,
            step_active: false,
        }
    }

    /// Apply the current controls; the pattern is only rebuilt on change
    pub fn configure(&mut self, settings: &TrackSettings) {
        let length = settings.length.clamp(1, MAX_TRACK_LENGTH);
        if self.pattern.update(length, settings.fill, settings.shift) {
            self.current_step %= length;
        }
        self.clock.set_div_mult(settings.div_mult);
        self.envelope.set_attack(settings.attack);
        self.envelope.set_decay(settings.decay);
        self.envelope.set_curve(settings.curve);
    }

    pub fn pattern(&self) -> &EuclideanPattern {
        &self.pattern
    }

    /// Index of the step that plays next
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// External clock edges one full pass of the pattern lasts
    pub fn cycle_clock(&self) -> u64 {
        track_cycle_clock(
            self.pattern.length(),
            self.clock.division(),
            self.clock.multiplication(),
        )
    }

    pub fn envelope_value(&self) -> f32 {
        self.envelope.value()
    }

    /// Advance one sample against the external clock
    pub fn process(&mut self, period: f32, clock_edge: bool, dt: f32) -> TrackFrame {
        let stepped = self.clock.process(period, clock_edge, dt);
        let mut onset = false;
        if stepped {
            onset = self.pattern.is_active(self.current_step);
            self.step_active = onset;
            self.current_step = (self.current_step + 1) % self.pattern.length().max(1);
            if onset {
                self.pulse.trigger(TRIGGER_PULSE_SECONDS);
                self.envelope.trigger();
            }
        }

        let gate = self.step_active && self.clock.gate();
        let trigger = self.pulse.process(dt);
        let envelope = self.envelope.process(dt, gate);
        TrackFrame {
            stepped,
            onset,
            trigger,
            gate,
            envelope,
        }
    }

    /// Back to step 0; the next clock edge starts a new window
    pub fn reset(&mut self) {
        self.clock.reset();
        self.envelope.reset();
        self.pulse.reset();
        self.current_step = 0;
        self.step_active = false;
    }
}

impl Default for EuclideanTrack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::clock::ClockPeriodTracker;

    fn run(settings: TrackSettings, samples: usize) -> Vec<TrackFrame> {
        let dt = 0.001;
        let mut tracker = ClockPeriodTracker::new();
        let mut track = EuclideanTrack::new();
        track.configure(&settings);
        (0..samples)
            .map(|n| {
                let edge = n % 100 == 0;
                let period = tracker.process(edge, dt);
                track.process(period, edge, dt)
            })
            .collect()
    }

    #[test]
    fn test_onsets_follow_pattern() {
        let settings = TrackSettings {
            length: 4,
            fill: 2,
            ..Default::default()
        };
        let frames = run(settings, 800);
        let onsets: Vec<usize> = frames
            .iter()
            .enumerate()
            .filter(|(_, f)| f.onset)
            .map(|(n, _)| n)
            .collect();
        // x.x. over eight clocks
        assert_eq!(onsets, vec![0, 200, 400, 600]);
        assert!(frames[0].trigger);
        assert!(!frames[5].trigger);
    }

    #[test]
    fn test_gate_only_on_onset_steps() {
        let settings = TrackSettings {
            length: 2,
            fill: 1,
            ..Default::default()
        };
        let frames = run(settings, 400);
        assert!(frames[10].gate);
        assert!(!frames[110].gate);
    }

    #[test]
    fn test_envelope_fires_on_onsets() {
        let settings = TrackSettings {
            length: 4,
            fill: 1,
            attack: 0.005,
            decay: 0.02,
            ..Default::default()
        };
        let frames = run(settings, 400);
        assert!(frames[5].envelope > 0.99);
        assert_eq!(frames[100].envelope, 0.0);
        assert_eq!(frames[300].envelope, 0.0);
    }

    #[test]
    fn test_length_change_wraps_step() {
        let mut track = EuclideanTrack::new();
        track.configure(&TrackSettings {
            length: 16,
            ..Default::default()
        });
        for n in 0..1000 {
            track.process(0.1, n % 100 == 0, 0.001);
        }
        assert_eq!(track.current_step(), 10);
        track.configure(&TrackSettings {
            length: 4,
            ..Default::default()
        });
        assert_eq!(track.current_step(), 2);
    }

    #[test]
    fn test_cycle_clock() {
        let mut track = EuclideanTrack::new();
        track.configure(&TrackSettings {
            length: 8,
            div_mult: -1,
            ..Default::default()
        });
        assert_eq!(track.cycle_clock(), 16);
        track.configure(&TrackSettings {
            length: 8,
            div_mult: 3,
            ..Default::default()
        });
        assert_eq!(track.cycle_clock(), 2);
    }

    #[test]
    fn test_settings_from_knobs_and_cv() {
        let params = ParamBank::new(track_param_defs(0, 1));
        let plain = track_settings(&params, 0, &TrackModulation::default(), 0);
        assert_eq!(plain.length, 16);
        assert_eq!(plain.fill, 4);
        assert_eq!(plain.shift, 0);

        let cv = TrackModulation {
            length: -0.25,
            fill: 0.25,
            shift: 0.5,
        };
        let modulated = track_settings(&params, 0, &cv, 3);
        assert_eq!(modulated.length, 8);
        assert_eq!(modulated.fill, 4);
        assert_eq!(modulated.shift, 7);

        let floor = TrackModulation {
            length: -1.0,
            ..Default::default()
        };
        assert_eq!(track_settings(&params, 0, &floor, 0).length, 1);
    }

    #[test]
    fn test_reset() {
        let mut track = EuclideanTrack::new();
        for n in 0..500 {
            track.process(0.1, n % 100 == 0, 0.001);
        }
        track.reset();
        assert_eq!(track.current_step(), 0);
        assert_eq!(track.envelope_value(), 0.0);
    }
}
