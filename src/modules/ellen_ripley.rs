//! Ellen Ripley: stereo granular delay into a chaos-modulated reverb
//!
//! ```text
//! in L ─▶ grains L ─┐              ┌─▶ out L
//!                   ├─▶ reverb ────┤
//! in R ─▶ grains R ─┘      ▲       └─▶ out R
//!                          │
//!                 chaos ───┴─▶ chaos out / stepped out
//! ```
//!
//! The right input is normalled to the left. Each side has its own grain
//! engine with its own seed. When chaos is enabled the attractor randomises
//! grain placement and wobbles the reverb feedback; the chaos outputs run
//! either way.

use crate::dsp::chaos::ChaosGenerator;
use crate::dsp::grain::{GrainProcessor, GrainSettings};
use crate::dsp::reverb::{ReverbProcessor, ReverbSettings};
use crate::port::{
    GraphModule, ParamBank, ParamDef, ParamId, ParamRange, ParamUnit, PortDef, PortId, PortSpec,
    PortValues, SignalKind,
};
use crate::serialize::{state_bool, StateError};

pub const SIZE: ParamId = 0;
pub const DENSITY: ParamId = 1;
pub const POSITION: ParamId = 2;
pub const GRAIN_MIX: ParamId = 3;
pub const ROOM: ParamId = 4;
pub const DECAY: ParamId = 5;
pub const DAMPING: ParamId = 6;
pub const REVERB_MIX: ParamId = 7;
pub const CHAOS_AMOUNT: ParamId = 8;
pub const CHAOS_RATE: ParamId = 9;

pub const LEFT_IN: PortId = 0;
pub const RIGHT_IN: PortId = 1;
pub const LEFT_OUT: PortId = 10;
pub const RIGHT_OUT: PortId = 11;
pub const CHAOS_OUT: PortId = 12;
pub const STEPPED_OUT: PortId = 13;

/// Audio full scale in volts
const AUDIO_VOLTS: f32 = 5.0;

/// Deepest reverb feedback wobble from the chaos signal
const FEEDBACK_WOBBLE: f32 = 0.1;

/// Stepped chaos updates this many times per second per unit of rate
const STEPS_PER_RATE: f32 = 10.0;

const DEFAULT_SEED: u64 = 0x5eed_e11e_4219;

fn param_defs() -> Vec<ParamDef> {
    let percent = |id, name: &str, default| {
        ParamDef::new(id, name, ParamRange::UNIT, default).unit(ParamUnit::Percent)
    };
    vec![
        ParamDef::new(
            SIZE,
            "size",
            ParamRange::Exponential {
                min: 0.005,
                max: 0.09,
            },
            0.05,
        ),
        percent(DENSITY, "density", 0.5),
        percent(POSITION, "position", 0.25),
        percent(GRAIN_MIX, "grain_mix", 0.5),
        percent(ROOM, "room", 0.5),
        percent(DECAY, "decay", 0.5),
        percent(DAMPING, "damping", 0.3),
        percent(REVERB_MIX, "reverb_mix", 0.3),
        percent(CHAOS_AMOUNT, "chaos_amount", 0.0),
        ParamDef::new(
            CHAOS_RATE,
            "chaos_rate",
            ParamRange::Linear {
                min: 0.01,
                max: 1.0,
            },
            0.2,
        ),
    ]
}

fn port_spec() -> PortSpec {
    PortSpec {
        inputs: vec![
            PortDef::new(LEFT_IN, "left", SignalKind::Audio),
            PortDef::new(RIGHT_IN, "right", SignalKind::Audio).normalled_to(LEFT_IN),
        ],
        outputs: vec![
            PortDef::new(LEFT_OUT, "left", SignalKind::Audio),
            PortDef::new(RIGHT_OUT, "right", SignalKind::Audio),
            PortDef::new(CHAOS_OUT, "chaos", SignalKind::CvBipolar),
            PortDef::new(STEPPED_OUT, "stepped", SignalKind::CvBipolar),
        ],
    }
}

/// Stereo granular + reverb + chaos effect.
pub struct EllenRipley {
    grains_left: GrainProcessor,
    grains_right: GrainProcessor,
    reverb: ReverbProcessor,
    chaos: ChaosGenerator,
    chaos_enabled: bool,
    stepped: f32,
    step_timer: f32,
    seed: u64,
    sample_rate: f64,
    params: ParamBank,
    spec: PortSpec,
}

impl EllenRipley {
    pub fn new(sample_rate: f64) -> Self {
        Self::with_seed(sample_rate, DEFAULT_SEED)
    }

    /// Grain randomness derives from `seed`; equal seeds give equal output
    pub fn with_seed(sample_rate: f64, seed: u64) -> Self {
        let rate = sample_rate as f32;
        Self {
            grains_left: GrainProcessor::new(rate, seed),
            grains_right: GrainProcessor::new(rate, seed.rotate_left(32) ^ 0x9e37_79b9),
            reverb: ReverbProcessor::new(rate),
            chaos: ChaosGenerator::new(),
            chaos_enabled: false,
            stepped: 0.0,
            step_timer: 0.0,
            seed,
            sample_rate,
            params: ParamBank::new(param_defs()),
            spec: port_spec(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn chaos_enabled(&self) -> bool {
        self.chaos_enabled
    }

    pub fn set_chaos_enabled(&mut self, enabled: bool) {
        self.chaos_enabled = enabled;
    }

    /// Sample-and-hold of the chaos signal on the module's own timer
    fn step(&mut self, chaos: f32, rate: f32, dt: f32) -> f32 {
        if self.step_timer <= 0.0 {
            self.stepped = chaos;
            self.step_timer += 1.0 / (rate * STEPS_PER_RATE);
        }
        self.step_timer -= dt;
        self.stepped
    }
}

impl Default for EllenRipley {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl GraphModule for EllenRipley {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let dt = (1.0 / self.sample_rate) as f32;
        let left = self.spec.resolve(inputs, LEFT_IN) as f32 / AUDIO_VOLTS;
        let right = self.spec.resolve(inputs, RIGHT_IN) as f32 / AUDIO_VOLTS;

        let rate = self.params.value(CHAOS_RATE);
        let chaos = self.chaos.process(rate);
        let stepped = self.step(chaos, rate, dt);
        let amount = self.params.value(CHAOS_AMOUNT);

        let grain_settings = GrainSettings {
            size: self.params.value(SIZE),
            density: self.params.value(DENSITY),
            position: self.params.value(POSITION),
            chaos: amount,
            chaos_enabled: self.chaos_enabled,
        };
        let grain_mix = self.params.value(GRAIN_MIX);
        let grained_left = self.grains_left.process(left, &grain_settings);
        let grained_right = self.grains_right.process(right, &grain_settings);
        let left = left + (grained_left - left) * grain_mix;
        let right = right + (grained_right - right) * grain_mix;

        let wobble = if self.chaos_enabled {
            chaos * amount * FEEDBACK_WOBBLE
        } else {
            0.0
        };
        let reverb_settings = ReverbSettings {
            room: self.params.value(ROOM),
            decay: self.params.value(DECAY),
            damping: self.params.value(DAMPING),
            feedback_modulation: wobble,
        };
        let (wet_left, wet_right) = self.reverb.process(left, right, &reverb_settings);
        let reverb_mix = self.params.value(REVERB_MIX);
        let left = left + (wet_left - left) * reverb_mix;
        let right = right + (wet_right - right) * reverb_mix;

        outputs.set(LEFT_OUT, (left * AUDIO_VOLTS) as f64);
        outputs.set(RIGHT_OUT, (right * AUDIO_VOLTS) as f64);
        outputs.set(CHAOS_OUT, (chaos * AUDIO_VOLTS) as f64);
        outputs.set(STEPPED_OUT, (stepped * AUDIO_VOLTS) as f64);
    }

    fn reset(&mut self) {
        self.grains_left.reset();
        self.grains_right.reset();
        self.reverb.reset();
        self.chaos.reset();
        self.stepped = 0.0;
        self.step_timer = 0.0;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        let rate = sample_rate as f32;
        self.grains_left.set_sample_rate(rate);
        self.grains_right.set_sample_rate(rate);
        self.reverb.set_sample_rate(rate);
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
        "ellen_ripley"
    }

    fn serialize_state(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({ "chaos_enabled": self.chaos_enabled }))
    }

    fn deserialize_state(&mut self, state: &serde_json::Value) -> Result<(), StateError> {
        self.chaos_enabled = state_bool(state, "chaos_enabled")?;
        Ok(())
    }
}
