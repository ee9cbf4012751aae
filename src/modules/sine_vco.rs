//! Sine VCO with a folded morphing second output

use crate::dsp::oscillator::{self, MorphOscillator, OUTPUT_VOLTS};
use crate::dsp::shaping::fold;
use crate::port::{
    GraphModule, ParamBank, ParamDef, ParamId, ParamRange, ParamUnit, PortDef, PortId, PortSpec,
    PortValues, SignalKind,
};
use libm::Libm;

pub const TUNE: ParamId = 0;
pub const FM_AMOUNT: ParamId = 1;
pub const SATURATION: ParamId = 2;
pub const MORPH: ParamId = 3;
pub const FOLD: ParamId = 4;

pub const VOCT_IN: PortId = 0;
pub const FM_IN: PortId = 1;
pub const MORPH_IN: PortId = 2;
pub const SINE_OUT: PortId = 10;
pub const MORPH_OUT: PortId = 11;

/// Extra gain into the folder at full fold
const MAX_FOLD_DRIVE: f32 = 4.0;

/// A sine oscillator and a sine-to-pulse morphing oscillator sharing one pitch.
///
/// Pitch is the tune knob times `2^voct`; the FM input is exponential, scaled
/// by the FM amount knob. Saturation above 1 pushes the sine through a tanh
/// stage. The morph output passes through a wavefolder.
pub struct SineVco {
    sine: oscillator::SineVco,
    morph: MorphOscillator,
    params: ParamBank,
    spec: PortSpec,
}

impl SineVco {
    pub fn new(sample_rate: f64) -> Self {
        let rate = sample_rate as f32;
        Self {
            sine: oscillator::SineVco::new(rate),
            morph: MorphOscillator::new(rate),
            params: ParamBank::new(vec![
                ParamDef::new(
                    TUNE,
                    "tune",
                    ParamRange::Exponential {
                        min: 20.0,
                        max: 5000.0,
                    },
                    oscillator::BASE_FREQUENCY as f64,
                )
                .unit(ParamUnit::Hertz),
                ParamDef::new(FM_AMOUNT, "fm_amount", ParamRange::UNIT, 0.0)
                    .unit(ParamUnit::Percent),
                ParamDef::new(
                    SATURATION,
                    "saturation",
                    ParamRange::Linear {
                        min: 1.0,
                        max: 10.0,
                    },
                    1.0,
                ),
                ParamDef::new(MORPH, "morph", ParamRange::UNIT, 0.0).unit(ParamUnit::Percent),
                ParamDef::new(FOLD, "fold", ParamRange::UNIT, 0.0).unit(ParamUnit::Percent),
            ]),
            spec: PortSpec {
                inputs: vec![
                    PortDef::new(VOCT_IN, "voct", SignalKind::VoltPerOctave),
                    PortDef::new(FM_IN, "fm", SignalKind::CvBipolar),
                    PortDef::new(MORPH_IN, "morph", SignalKind::CvUnipolar),
                ],
                outputs: vec![
                    PortDef::new(SINE_OUT, "sine", SignalKind::Audio),
                    PortDef::new(MORPH_OUT, "morph", SignalKind::Audio),
                ],
            },
        }
    }
}

impl Default for SineVco {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl GraphModule for SineVco {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let voct = self.spec.resolve(inputs, VOCT_IN) as f32;
        let frequency = self.params.value(TUNE) * Libm::<f32>::exp2(voct);
        let fm = self.spec.resolve(inputs, FM_IN) as f32 * self.params.value(FM_AMOUNT);

        let sine = self
            .sine
            .process(frequency, fm, self.params.value(SATURATION));

        let morph_cv = self.spec.resolve(inputs, MORPH_IN) as f32 / 10.0;
        let morph_position = (self.params.value(MORPH) + morph_cv).clamp(0.0, 1.0);
        let shaped = self
            .morph
            .process(frequency * Libm::<f32>::exp2(fm), morph_position);
        let fold_amount = self.params.value(FOLD);
        let folded = if fold_amount > 0.0 {
            fold(shaped * (1.0 + fold_amount * MAX_FOLD_DRIVE), 1.0)
        } else {
            shaped
        };

        outputs.set(SINE_OUT, sine as f64);
        outputs.set(MORPH_OUT, (folded * OUTPUT_VOLTS) as f64);
    }

    fn reset(&mut self) {
        self.sine.reset();
        self.morph.reset();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sine.set_sample_rate(sample_rate as f32);
        self.morph.set_sample_rate(sample_rate as f32);
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
        "sine_vco"
    }
}
