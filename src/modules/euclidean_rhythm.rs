//! Three-track Euclidean rhythm generator
//!
//! Every track has its own pattern, clock ratio and AD envelope. Length, fill
//! and shift each take a CV that adds to the knob. A trigger on a track's
//! rotate input nudges its pattern one step; those nudges are persisted.

use super::track::{
    track_param_defs, track_settings, EuclideanTrack, TrackModulation, TrackSettings,
    MAX_TRACK_LENGTH, TRACK_PARAMS,
};
use crate::dsp::clock::ClockPeriodTracker;
use crate::port::{
    GraphModule, ParamBank, ParamDef, ParamId, PortDef, PortId, PortSpec, PortValues, SignalKind,
};
use crate::serialize::{state_int_list, StateError};
use crate::trigger::{gate_voltage, PeakTrigger, SchmittTrigger, GATE_VOLTAGE};

pub const TRACKS: usize = 3;

pub const CLOCK_IN: PortId = 0;
pub const RESET_IN: PortId = 1;
const TRACK_INPUT_BASE: PortId = 2;
const INPUTS_PER_TRACK: PortId = 4;
const OUTPUT_BASE: PortId = 10;
const OUTPUTS_PER_TRACK: PortId = 3;

/// Parameter id of `param` (see [`super::track`]) on `track`
pub const fn param_id(track: usize, param: u32) -> ParamId {
    track as u32 * TRACK_PARAMS + param
}

/// Input ids of a track: (length CV, fill CV, shift CV, rotate trigger)
pub const fn track_inputs(track: usize) -> (PortId, PortId, PortId, PortId) {
    let base = TRACK_INPUT_BASE + track as u32 * INPUTS_PER_TRACK;
    (base, base + 1, base + 2, base + 3)
}

/// Output ids of a track: (trigger, gate, envelope)
pub const fn track_outputs(track: usize) -> (PortId, PortId, PortId) {
    let base = OUTPUT_BASE + track as u32 * OUTPUTS_PER_TRACK;
    (base, base + 1, base + 2)
}

fn param_defs() -> Vec<ParamDef> {
    (0..TRACKS)
        .flat_map(|t| track_param_defs(param_id(t, 0), t + 1))
        .collect()
}

fn port_spec() -> PortSpec {
    let mut inputs = vec![
        PortDef::new(CLOCK_IN, "clock", SignalKind::Clock),
        PortDef::new(RESET_IN, "reset", SignalKind::Trigger),
    ];
    let mut outputs = Vec::with_capacity(TRACKS * OUTPUTS_PER_TRACK as usize);
    for t in 0..TRACKS {
        let n = t + 1;
        let (length, fill, shift, rotate) = track_inputs(t);
        inputs.push(PortDef::new(length, format!("length{}", n), SignalKind::CvUnipolar));
        inputs.push(PortDef::new(fill, format!("fill{}", n), SignalKind::CvUnipolar));
        inputs.push(PortDef::new(shift, format!("shift{}", n), SignalKind::CvUnipolar));
        inputs.push(PortDef::new(rotate, format!("rotate{}", n), SignalKind::Trigger));

        let (trig, gate, env) = track_outputs(t);
        outputs.push(PortDef::new(trig, format!("trig{}", n), SignalKind::Trigger));
        outputs.push(PortDef::new(gate, format!("gate{}", n), SignalKind::Gate));
        outputs.push(PortDef::new(env, format!("env{}", n), SignalKind::CvUnipolar));
    }
    PortSpec { inputs, outputs }
}

/// Three clocked Euclidean tracks with trigger, gate and envelope outputs.
pub struct EuclideanRhythm {
    tracks: [EuclideanTrack; TRACKS],
    manual_shift: [i32; TRACKS],
    clock_in: SchmittTrigger,
    reset_in: PeakTrigger,
    rotate_in: [SchmittTrigger; TRACKS],
    period: ClockPeriodTracker,
    sample_rate: f64,
    params: ParamBank,
    spec: PortSpec,
}

impl EuclideanRhythm {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            tracks: Default::default(),
            manual_shift: [0; TRACKS],
            clock_in: SchmittTrigger::new(),
            reset_in: PeakTrigger::new(),
            rotate_in: Default::default(),
            period: ClockPeriodTracker::new(),
            sample_rate,
            params: ParamBank::new(param_defs()),
            spec: port_spec(),
        }
    }

    pub fn track(&self, index: usize) -> Option<&EuclideanTrack> {
        self.tracks.get(index)
    }

    pub fn manual_shift(&self, track: usize) -> Option<i32> {
        self.manual_shift.get(track).copied()
    }

    /// Rotate a track's pattern by `steps` on top of its knob and CV
    pub fn nudge_shift(&mut self, track: usize, steps: i32) {
        if let Some(shift) = self.manual_shift.get_mut(track) {
            *shift = (*shift + steps).rem_euclid(MAX_TRACK_LENGTH as i32);
        }
    }

    fn settings(&self, track: usize, inputs: &PortValues) -> TrackSettings {
        let (length, fill, shift, _) = track_inputs(track);
        let cv = TrackModulation {
            length: self.spec.resolve(inputs, length) as f32 / 10.0,
            fill: self.spec.resolve(inputs, fill) as f32 / 10.0,
            shift: self.spec.resolve(inputs, shift) as f32 / 10.0,
        };
        track_settings(&self.params, param_id(track, 0), &cv, self.manual_shift[track])
    }
}

impl Default for EuclideanRhythm {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl GraphModule for EuclideanRhythm {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let dt = (1.0 / self.sample_rate) as f32;

        if self.reset_in.process(self.spec.resolve(inputs, RESET_IN) as f32) {
            self.tracks.iter_mut().for_each(EuclideanTrack::reset);
        }

        let edge = self.clock_in.process(self.spec.resolve(inputs, CLOCK_IN) as f32);
        let period = self.period.process(edge, dt);

        for t in 0..TRACKS {
            let (_, _, _, rotate) = track_inputs(t);
            if self.rotate_in[t].process(self.spec.resolve(inputs, rotate) as f32) {
                self.nudge_shift(t, 1);
            }

            let settings = self.settings(t, inputs);
            let track = &mut self.tracks[t];
            track.configure(&settings);
            let frame = track.process(period, edge, dt);

            let (trig, gate, env) = track_outputs(t);
            outputs.set(trig, gate_voltage(frame.trigger));
            outputs.set(gate, gate_voltage(frame.gate));
            outputs.set(env, (frame.envelope * GATE_VOLTAGE) as f64);
        }
    }

    fn reset(&mut self) {
        self.tracks.iter_mut().for_each(EuclideanTrack::reset);
        self.clock_in.reset();
        self.reset_in.reset();
        self.rotate_in.iter_mut().for_each(SchmittTrigger::reset);
        self.period.reset();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    fn params(&self) -> &[ParamDef] {
        self.params.defs()
    }

    fn get_param(&self, id: ParamId) -> Option<f64> {
        self.params.get(id)
    }

    fn set_param(&mut self, id: ParamId, value: f64) {
        self.params.set(id, value);
    }

    fn type_id(&self) -> &'static str {
        "euclidean_rhythm"
    }

    fn serialize_state(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({ "manual_shift": self.manual_shift }))
    }

    fn deserialize_state(&mut self, state: &serde_json::Value) -> Result<(), StateError> {
        let shifts = state_int_list(state, "manual_shift", 0, MAX_TRACK_LENGTH as i64 - 1)?;
        if shifts.len() != TRACKS {
            return Err(StateError::OutOfRange {
                field: "manual_shift".to_string(),
                value: shifts.len().to_string(),
            });
        }
        for (slot, shift) in self.manual_shift.iter_mut().zip(shifts) {
            *slot = shift as i32;
        }
        Ok(())
    }
}
