//! Maddy: clocked Euclidean tracks with a chain and a CV step sequencer
//!
//! An internal BPM clock drives three Euclidean tracks unless a cable is
//! patched into the clock input. A chain of up to four slots plays the tracks
//! one after another, each for one full cycle. Every onset of the chained track
//! advances a five-knob CV sequencer whose step order is chosen by the mode.

use super::track::{
    track_param_defs, track_settings, EuclideanTrack, TrackModulation, TRACK_PARAMS,
};
use crate::dsp::chain::{ChainedSequencer, MAX_SLOTS};
use crate::dsp::clock::ClockPeriodTracker;
use crate::port::{
    GraphModule, ParamBank, ParamDef, ParamId, ParamRange, ParamUnit, PortDef, PortId, PortSpec,
    PortValues, SignalKind,
};
use crate::serialize::{state_int_list, state_u64, StateError};
use crate::trigger::{
    gate_voltage, PulseGenerator, SchmittTrigger, GATE_VOLTAGE, TRIGGER_PULSE_SECONDS,
};

pub const TRACKS: usize = 3;
pub const CV_STEPS: usize = 5;

pub const BPM: ParamId = 0;
const CV_KNOB_BASE: ParamId = 1;
const TRACK_PARAM_BASE: ParamId = CV_KNOB_BASE + CV_STEPS as u32;

pub const CLOCK_IN: PortId = 0;
pub const RESET_IN: PortId = 1;

pub const CLOCK_OUT: PortId = 10;
const TRIG_OUT_BASE: PortId = 11;
const ENV_OUT_BASE: PortId = 14;
pub const CHAIN_ENV_OUT: PortId = 17;
pub const CHAIN_TRIG_OUT: PortId = 18;
pub const TRANSITION_OUT: PortId = 19;
pub const CV_OUT: PortId = 20;

/// Parameter id of `param` (see [`super::track`]) on `track`
pub const fn track_param(track: usize, param: u32) -> ParamId {
    TRACK_PARAM_BASE + track as u32 * TRACK_PARAMS + param
}

/// Parameter id of CV sequencer knob `step`
pub const fn cv_knob(step: usize) -> ParamId {
    CV_KNOB_BASE + step as u32
}

/// Output ids of a track: (trigger, envelope)
pub const fn track_outputs(track: usize) -> (PortId, PortId) {
    (TRIG_OUT_BASE + track as u32, ENV_OUT_BASE + track as u32)
}

const SEQUENTIAL: &[usize] = &[0, 1, 2, 3, 4];
const MINIMALISM: &[usize] = &[0, 1, 0, 2, 0, 3, 0, 4];
const JUMP: &[usize] = &[0, 2, 4, 1, 3];

/// Order in which the CV sequencer visits its knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequencerMode {
    #[default]
    Sequential,
    Minimalism,
    Jump,
    ReverseSequential,
    ReverseMinimalism,
    ReverseJump,
}

impl SequencerMode {
    pub const ALL: [SequencerMode; 6] = [
        SequencerMode::Sequential,
        SequencerMode::Minimalism,
        SequencerMode::Jump,
        SequencerMode::ReverseSequential,
        SequencerMode::ReverseMinimalism,
        SequencerMode::ReverseJump,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    fn table(self) -> &'static [usize] {
        match self {
            SequencerMode::Sequential | SequencerMode::ReverseSequential => SEQUENTIAL,
            SequencerMode::Minimalism | SequencerMode::ReverseMinimalism => MINIMALISM,
            SequencerMode::Jump | SequencerMode::ReverseJump => JUMP,
        }
    }

    fn is_reversed(self) -> bool {
        matches!(
            self,
            SequencerMode::ReverseSequential
                | SequencerMode::ReverseMinimalism
                | SequencerMode::ReverseJump
        )
    }

    /// Steps in one pass of this order
    pub fn steps(self) -> usize {
        self.table().len()
    }

    /// Knob played at position `step`; reversed modes read their table backwards
    pub fn knob_at(self, step: usize) -> usize {
        let table = self.table();
        let i = step % table.len();
        if self.is_reversed() {
            table[table.len() - 1 - i]
        } else {
            table[i]
        }
    }
}

/// Free-running clock at a fixed rate with a 50 % duty gate
#[derive(Debug, Clone, Copy, Default)]
struct InternalClock {
    phase: f32,
    running: bool,
}

impl InternalClock {
    /// Advance one sample; true on the first sample of each beat
    fn process(&mut self, hz: f32, dt: f32) -> bool {
        let mut edge = !self.running;
        self.running = true;
        self.phase += hz * dt;
        if self.phase >= 1.0 {
            self.phase -= libm::floorf(self.phase);
            edge = true;
        }
        edge
    }

    fn gate(&self) -> bool {
        self.phase < 0.5
    }

    fn reset(&mut self) {
        self.phase = 0.0;
        self.running = false;
    }
}

fn param_defs() -> Vec<ParamDef> {
    let mut defs = vec![ParamDef::new(
        BPM,
        "bpm",
        ParamRange::Linear {
            min: 30.0,
            max: 300.0,
        },
        120.0,
    )
    .unit(ParamUnit::Bpm)];
    for step in 0..CV_STEPS {
        defs.push(ParamDef::new(
            cv_knob(step),
            format!("cv{}", step + 1),
            ParamRange::Linear {
                min: 0.0,
                max: 10.0,
            },
            step as f64 * 2.0,
        ));
    }
    for t in 0..TRACKS {
        defs.extend(track_param_defs(track_param(t, 0), t + 1));
    }
    defs
}

fn port_spec() -> PortSpec {
    let mut outputs = vec![PortDef::new(CLOCK_OUT, "clock", SignalKind::Clock)];
    for t in 0..TRACKS {
        let (trig, _) = track_outputs(t);
        outputs.push(PortDef::new(trig, format!("trig{}", t + 1), SignalKind::Trigger));
    }
    for t in 0..TRACKS {
        let (_, env) = track_outputs(t);
        outputs.push(PortDef::new(env, format!("env{}", t + 1), SignalKind::CvUnipolar));
    }
    outputs.extend([
        PortDef::new(CHAIN_ENV_OUT, "chain_env", SignalKind::CvUnipolar),
        PortDef::new(CHAIN_TRIG_OUT, "chain_trig", SignalKind::Trigger),
        PortDef::new(TRANSITION_OUT, "transition", SignalKind::Trigger),
        PortDef::new(CV_OUT, "cv", SignalKind::CvUnipolar),
    ]);
    PortSpec {
        inputs: vec![
            PortDef::new(CLOCK_IN, "clock", SignalKind::Clock),
            PortDef::new(RESET_IN, "reset", SignalKind::Trigger),
        ],
        outputs,
    }
}

/// Three chained Euclidean tracks with an internal clock and a CV sequencer.
pub struct Maddy {
    tracks: [EuclideanTrack; TRACKS],
    chain: ChainedSequencer,
    mode: SequencerMode,
    cv_step: usize,
    cv_value: f32,
    internal_clock: InternalClock,
    clock_in: SchmittTrigger,
    reset_in: SchmittTrigger,
    period: ClockPeriodTracker,
    transition_pulse: PulseGenerator,
    sample_rate: f64,
    params: ParamBank,
    spec: PortSpec,
}

impl Maddy {
    pub fn new(sample_rate: f64) -> Self {
        let mut chain = ChainedSequencer::new();
        chain.set_slots(&[0, 1, 2]);
        Self {
            tracks: Default::default(),
            chain,
            mode: SequencerMode::default(),
            cv_step: 0,
            cv_value: 0.0,
            internal_clock: InternalClock::default(),
            clock_in: SchmittTrigger::new(),
            reset_in: SchmittTrigger::new(),
            period: ClockPeriodTracker::new(),
            transition_pulse: PulseGenerator::new(),
            sample_rate,
            params: ParamBank::new(param_defs()),
            spec: port_spec(),
        }
    }

    pub fn mode(&self) -> SequencerMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SequencerMode) {
        self.mode = mode;
        self.cv_step %= mode.steps();
    }

    pub fn chain(&self) -> &ChainedSequencer {
        &self.chain
    }

    /// Replace the chain slots; indices outside the tracks are kept and play
    /// silence for one clock
    pub fn set_chain(&mut self, tracks: &[usize]) {
        self.chain.set_slots(tracks);
    }

    pub fn track(&self, index: usize) -> Option<&EuclideanTrack> {
        self.tracks.get(index)
    }

    fn restart(&mut self) {
        self.tracks.iter_mut().for_each(EuclideanTrack::reset);
        self.chain.reset();
        self.internal_clock.reset();
        self.period.reset();
        self.transition_pulse.reset();
        self.cv_step = 0;
    }

    fn cycle_clocks(&self) -> [u64; TRACKS] {
        [0, 1, 2].map(|t| self.tracks[t].cycle_clock())
    }
}

impl Default for Maddy {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl GraphModule for Maddy {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let dt = (1.0 / self.sample_rate) as f32;

        if self.reset_in.process(self.spec.resolve(inputs, RESET_IN) as f32) {
            self.restart();
        }

        // the internal clock only runs while nothing is patched into the clock input
        let (edge, clock_high) = if inputs.is_connected(CLOCK_IN) {
            let edge = self.clock_in.process(inputs.get_or(CLOCK_IN, 0.0) as f32);
            (edge, self.clock_in.is_high())
        } else {
            let hz = self.params.value(BPM) / 60.0;
            let edge = self.internal_clock.process(hz, dt);
            (edge, self.internal_clock.gate())
        };
        let period = self.period.process(edge, dt);

        for t in 0..TRACKS {
            let settings = track_settings(
                &self.params,
                track_param(t, 0),
                &TrackModulation::default(),
                0,
            );
            self.tracks[t].configure(&settings);
        }

        if edge && self.chain.clock(&self.cycle_clocks()) {
            self.transition_pulse.trigger(TRIGGER_PULSE_SECONDS);
        }

        let mut triggers = [false; TRACKS];
        let mut envelopes = [0.0f32; TRACKS];
        let mut onsets = [false; TRACKS];
        for t in 0..TRACKS {
            let frame = self.tracks[t].process(period, edge, dt);
            triggers[t] = frame.trigger;
            envelopes[t] = frame.envelope;
            onsets[t] = frame.onset;

            let (trig, env) = track_outputs(t);
            outputs.set(trig, gate_voltage(frame.trigger));
            outputs.set(env, (frame.envelope * GATE_VOLTAGE) as f64);
        }

        let chained = self.chain.current_track();
        if chained.and_then(|t| onsets.get(t).copied()).unwrap_or(false) {
            let knob = self.mode.knob_at(self.cv_step);
            self.cv_value = self.params.value(cv_knob(knob));
            self.cv_step = (self.cv_step + 1) % self.mode.steps();
        }
        let chain_trigger = chained
            .and_then(|t| triggers.get(t).copied())
            .unwrap_or(false);

        outputs.set(CLOCK_OUT, gate_voltage(clock_high));
        outputs.set(CHAIN_ENV_OUT, (self.chain.output(&envelopes) * GATE_VOLTAGE) as f64);
        outputs.set(CHAIN_TRIG_OUT, gate_voltage(chain_trigger));
        outputs.set(TRANSITION_OUT, gate_voltage(self.transition_pulse.process(dt)));
        outputs.set(CV_OUT, self.cv_value as f64);
    }

    fn reset(&mut self) {
        self.restart();
        self.clock_in.reset();
        self.reset_in.reset();
        self.cv_value = 0.0;
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
        "maddy"
    }

    fn serialize_state(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "mode": self.mode.index(),
            "chain": self.chain.slots(),
        }))
    }

    fn deserialize_state(&mut self, state: &serde_json::Value) -> Result<(), StateError> {
        let index = state_u64(state, "mode")?;
        let mode = SequencerMode::from_index(index as usize).ok_or_else(|| StateError::OutOfRange {
            field: "mode".to_string(),
            value: index.to_string(),
        })?;
        let chain = state_int_list(state, "chain", 0, TRACKS as i64 - 1)?;
        if chain.len() > MAX_SLOTS {
            return Err(StateError::OutOfRange {
                field: "chain".to_string(),
                value: chain.len().to_string(),
            });
        }
        let slots: Vec<usize> = chain.into_iter().map(|t| t as usize).collect();
        self.set_mode(mode);
        self.chain.set_slots(&slots);
        Ok(())
    }
}
