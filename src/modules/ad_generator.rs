//! Three-channel AD/AHR envelope generator
//!
//! Each channel is a curved envelope fired by a trigger, optionally holding
//! while the trigger stays high, blended with an envelope follower on its
//! audio input. The follower can listen through a band-pass so only one
//! drum in a mix opens the envelope. Trigger inputs are normalled down the
//! channels, so a single cable into channel 1 fires all three.

use crate::dsp::envelope::{EnvelopeGenerator, EnvelopeMode, UnifiedEnvelope};
use crate::dsp::filter::BiquadBandpass;
use crate::port::{
    knob_to_seconds, GraphModule, ParamBank, ParamDef, ParamId, ParamRange, ParamUnit, PortDef,
    PortId, PortSpec, PortValues, SignalKind, MIN_STAGE_SECONDS,
};
use crate::serialize::{state_str, StateError};
use crate::trigger::{SchmittTrigger, GATE_VOLTAGE};

pub const CHANNELS: usize = 3;

const PARAMS_PER_CHANNEL: u32 = 7;
pub const ATTACK: u32 = 0;
pub const DECAY: u32 = 1;
pub const CURVE: u32 = 2;
pub const FOLLOW: u32 = 3;
pub const HOLD: u32 = 4;
pub const BANDPASS: u32 = 5;
pub const CENTER: u32 = 6;

const TRIG_IN_BASE: PortId = 0;
const AUDIO_IN_BASE: PortId = 3;
const ENV_OUT_BASE: PortId = 10;
pub const SUM_OUT: PortId = 13;

const BANDPASS_Q: f32 = 2.0;

/// Parameter id of `param` on `channel`
pub const fn param_id(channel: usize, param: u32) -> ParamId {
    channel as u32 * PARAMS_PER_CHANNEL + param
}

/// Input ids of a channel: (trigger, audio)
pub const fn channel_inputs(channel: usize) -> (PortId, PortId) {
    (TRIG_IN_BASE + channel as u32, AUDIO_IN_BASE + channel as u32)
}

pub const fn env_output(channel: usize) -> PortId {
    ENV_OUT_BASE + channel as u32
}

/// Range of the attack knobs, persisted with the patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttackPreset {
    Fast,
    #[default]
    Normal,
    Slow,
}

impl AttackPreset {
    pub fn name(self) -> &'static str {
        match self {
            AttackPreset::Fast => "fast",
            AttackPreset::Normal => "normal",
            AttackPreset::Slow => "slow",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "fast" => Some(AttackPreset::Fast),
            "normal" => Some(AttackPreset::Normal),
            "slow" => Some(AttackPreset::Slow),
            _ => None,
        }
    }

    /// Factor applied to every attack time
    pub fn scale(self) -> f32 {
        match self {
            AttackPreset::Fast => 0.25,
            AttackPreset::Normal => 1.0,
            AttackPreset::Slow => 4.0,
        }
    }
}

fn param_defs() -> Vec<ParamDef> {
    let mut defs = Vec::with_capacity(CHANNELS * PARAMS_PER_CHANNEL as usize);
    for c in 0..CHANNELS {
        let n = c + 1;
        defs.extend([
            ParamDef::new(param_id(c, ATTACK), format!("attack{}", n), ParamRange::UNIT, 0.1)
                .unit(ParamUnit::KnobSeconds),
            ParamDef::new(param_id(c, DECAY), format!("decay{}", n), ParamRange::UNIT, 0.4)
                .unit(ParamUnit::KnobSeconds),
            ParamDef::new(
                param_id(c, CURVE),
                format!("curve{}", n),
                ParamRange::Linear {
                    min: -0.99,
                    max: 0.99,
                },
                0.0,
            ),
            ParamDef::new(param_id(c, FOLLOW), format!("follow{}", n), ParamRange::UNIT, 0.0)
                .unit(ParamUnit::Percent),
            ParamDef::new(param_id(c, HOLD), format!("hold{}", n), ParamRange::TOGGLE, 0.0)
                .unit(ParamUnit::Toggle),
            ParamDef::new(
                param_id(c, BANDPASS),
                format!("bandpass{}", n),
                ParamRange::TOGGLE,
                0.0,
            )
            .unit(ParamUnit::Toggle),
            ParamDef::new(
                param_id(c, CENTER),
                format!("center{}", n),
                ParamRange::Exponential {
                    min: 20.0,
                    max: 20000.0,
                },
                1000.0,
            )
            .unit(ParamUnit::Hertz),
        ]);
    }
    defs
}

fn port_spec() -> PortSpec {
    let mut inputs = Vec::with_capacity(CHANNELS * 2);
    for c in 0..CHANNELS {
        let (trig, _) = channel_inputs(c);
        let mut def = PortDef::new(trig, format!("trig{}", c + 1), SignalKind::Trigger);
        if c > 0 {
            def = def.normalled_to(channel_inputs(c - 1).0);
        }
        inputs.push(def);
    }
    for c in 0..CHANNELS {
        let (_, audio) = channel_inputs(c);
        inputs.push(PortDef::new(audio, format!("audio{}", c + 1), SignalKind::Audio));
    }

    let mut outputs: Vec<PortDef> = (0..CHANNELS)
        .map(|c| PortDef::new(env_output(c), format!("env{}", c + 1), SignalKind::CvUnipolar))
        .collect();
    outputs.push(PortDef::new(SUM_OUT, "sum", SignalKind::CvUnipolar));
    PortSpec { inputs, outputs }
}

struct Channel {
    envelope: UnifiedEnvelope,
    bandpass: BiquadBandpass,
    trigger: SchmittTrigger,
}

impl Channel {
    fn new(sample_rate: f32) -> Self {
        Self {
            envelope: UnifiedEnvelope::default(),
            bandpass: BiquadBandpass::new(1000.0, BANDPASS_Q, sample_rate),
            trigger: SchmittTrigger::new(),
        }
    }

    fn reset(&mut self) {
        self.envelope.reset();
        self.bandpass.reset();
        self.trigger.reset();
    }
}

/// Three envelope channels with followers and a max-sum output.
pub struct AdGenerator {
    channels: [Channel; CHANNELS],
    preset: AttackPreset,
    sample_rate: f64,
    params: ParamBank,
    spec: PortSpec,
}

impl AdGenerator {
    pub fn new(sample_rate: f64) -> Self {
        let rate = sample_rate as f32;
        Self {
            channels: [Channel::new(rate), Channel::new(rate), Channel::new(rate)],
            preset: AttackPreset::default(),
            sample_rate,
            params: ParamBank::new(param_defs()),
            spec: port_spec(),
        }
    }

    pub fn attack_preset(&self) -> AttackPreset {
        self.preset
    }

    pub fn set_attack_preset(&mut self, preset: AttackPreset) {
        self.preset = preset;
    }

    fn configure(&mut self, c: usize) {
        let p = |param| param_id(c, param);
        let attack = (knob_to_seconds(self.params.value(p(ATTACK))) * self.preset.scale())
            .max(MIN_STAGE_SECONDS);
        let decay = knob_to_seconds(self.params.value(p(DECAY)));
        let mode = if self.params.flag(p(HOLD)) {
            EnvelopeMode::AttackHoldRelease
        } else {
            EnvelopeMode::AttackDecay
        };

        let channel = &mut self.channels[c];
        let envelope = channel.envelope.envelope_mut();
        envelope.set_attack(attack);
        envelope.set_decay(decay);
        envelope.set_curve(self.params.value(p(CURVE)));
        envelope.set_mode(mode);
        channel
            .envelope
            .set_follower_amount(self.params.value(p(FOLLOW)));
        channel.bandpass.set_center(self.params.value(p(CENTER)));
    }
}

impl Default for AdGenerator {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl GraphModule for AdGenerator {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let dt = (1.0 / self.sample_rate) as f32;
        let mut sum = 0.0f32;

        for c in 0..CHANNELS {
            self.configure(c);
            let (trig, audio) = channel_inputs(c);
            let trigger_volts = self.spec.resolve(inputs, trig) as f32;
            let audio_volts = self.spec.resolve(inputs, audio) as f32;
            let filtered = self.params.flag(param_id(c, BANDPASS));

            let channel = &mut self.channels[c];
            if channel.trigger.process(trigger_volts) {
                channel.envelope.trigger();
            }
            let heard = if filtered {
                channel.bandpass.process(audio_volts)
            } else {
                audio_volts
            };
            channel.envelope.set_input(heard);
            let level = channel.envelope.process(dt, channel.trigger.is_high());

            sum = sum.max(level);
            outputs.set(env_output(c), (level * GATE_VOLTAGE) as f64);
        }

        outputs.set(SUM_OUT, (sum * GATE_VOLTAGE) as f64);
    }

    fn reset(&mut self) {
        self.channels.iter_mut().for_each(Channel::reset);
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        for channel in &mut self.channels {
            channel.bandpass.set_sample_rate(sample_rate as f32);
        }
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
        "ad_generator"
    }

    fn serialize_state(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({ "attack_preset": self.preset.name() }))
    }

    fn deserialize_state(&mut self, state: &serde_json::Value) -> Result<(), StateError> {
        let name = state_str(state, "attack_preset")?;
        self.preset = AttackPreset::from_name(name).ok_or_else(|| StateError::OutOfRange {
            field: "attack_preset".to_string(),
            value: name.to_string(),
        })?;
        Ok(())
    }
}
