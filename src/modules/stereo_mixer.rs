//! Four-channel stereo mixer with equal-power panning
//!
//! The master bus soft-clips above 8V so a hot mix stays under 9V.

use crate::dsp::shaping::soft_clip;
use crate::port::{
    GraphModule, ParamBank, ParamDef, ParamId, ParamRange, ParamUnit, PortDef, PortId, PortSpec,
    PortValues, SignalKind,
};
use libm::Libm;
use std::f32::consts::FRAC_PI_4;

pub const CHANNELS: usize = 4;

const PARAMS_PER_CHANNEL: u32 = 3;
pub const LEVEL: u32 = 0;
pub const PAN: u32 = 1;
pub const MUTE: u32 = 2;
pub const MASTER: ParamId = CHANNELS as u32 * PARAMS_PER_CHANNEL;

/// Master bus level where soft clipping starts
const RAIL_KNEE: f32 = 8.0;

pub const LEFT_OUT: PortId = 10;
pub const RIGHT_OUT: PortId = 11;

pub const fn param_id(channel: usize, param: u32) -> ParamId {
    channel as u32 * PARAMS_PER_CHANNEL + param
}

/// Input ids of a channel: (left / mono, right)
pub const fn channel_inputs(channel: usize) -> (PortId, PortId) {
    let left = channel as u32 * 2;
    (left, left + 1)
}

/// `(left, right)` gains for a pan position in [-1, 1]
#[inline]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
    (Libm::<f32>::cos(angle), Libm::<f32>::sin(angle))
}

/// Mono inputs feed both sides of their channel.
pub struct StereoMixer {
    params: ParamBank,
    spec: PortSpec,
}

impl StereoMixer {
    pub fn new(_sample_rate: f64) -> Self {
        let mut defs = Vec::with_capacity(CHANNELS * PARAMS_PER_CHANNEL as usize + 1);
        let mut inputs = Vec::with_capacity(CHANNELS * 2);
        for c in 0..CHANNELS {
            let n = c + 1;
            defs.extend([
                ParamDef::new(param_id(c, LEVEL), format!("level{}", n), ParamRange::UNIT, 0.8)
                    .unit(ParamUnit::Percent),
                ParamDef::new(
                    param_id(c, PAN),
                    format!("pan{}", n),
                    ParamRange::Linear {
                        min: -1.0,
                        max: 1.0,
                    },
                    0.0,
                ),
                ParamDef::new(param_id(c, MUTE), format!("mute{}", n), ParamRange::TOGGLE, 0.0)
                    .unit(ParamUnit::Toggle),
            ]);

            let (left, right) = channel_inputs(c);
            inputs.push(PortDef::new(left, format!("left{}", n), SignalKind::Audio));
            inputs.push(
                PortDef::new(right, format!("right{}", n), SignalKind::Audio).normalled_to(left),
            );
        }
        defs.push(
            ParamDef::new(MASTER, "master", ParamRange::UNIT, 1.0).unit(ParamUnit::Percent),
        );

        Self {
            params: ParamBank::new(defs),
            spec: PortSpec {
                inputs,
                outputs: vec![
                    PortDef::new(LEFT_OUT, "left", SignalKind::Audio),
                    PortDef::new(RIGHT_OUT, "right", SignalKind::Audio),
                ],
            },
        }
    }
}

impl Default for StereoMixer {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl GraphModule for StereoMixer {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let mut mix_left = 0.0f32;
        let mut mix_right = 0.0f32;
        for c in 0..CHANNELS {
            if self.params.flag(param_id(c, MUTE)) {
                continue;
            }
            let (left, right) = channel_inputs(c);
            let level = self.params.value(param_id(c, LEVEL));
            let (gain_left, gain_right) = pan_gains(self.params.value(param_id(c, PAN)));
            mix_left += self.spec.resolve(inputs, left) as f32 * level * gain_left;
            mix_right += self.spec.resolve(inputs, right) as f32 * level * gain_right;
        }

        let master = self.params.value(MASTER);
        outputs.set(LEFT_OUT, soft_clip(mix_left * master, RAIL_KNEE) as f64);
        outputs.set(RIGHT_OUT, soft_clip(mix_right * master, RAIL_KNEE) as f64);
    }

    fn reset(&mut self) {}

    fn set_sample_rate(&mut self, _sample_rate: f64) {}

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
        "stereo_mixer"
    }
}
