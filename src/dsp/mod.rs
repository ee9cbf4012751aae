//! Per-sample DSP and sequencing primitives
//!
//! Everything here works in single precision on plain values: no ports, no
//! parameters, no allocation after construction. The modules in
//! [`crate::modules`] wire these together behind the
//! [`GraphModule`](crate::port::GraphModule) interface.

pub mod chain;
pub mod chaos;
pub mod clock;
pub mod curve;
pub mod delay;
pub mod envelope;
pub mod euclid;
pub mod filter;
pub mod grain;
pub mod oscillator;
pub mod reverb;
pub mod shaping;

pub use chain::{track_cycle_clock, ChainedSequencer};
pub use chaos::ChaosGenerator;
pub use clock::{div_mult_ratio, ClockDivMult, ClockPeriodTracker};
pub use curve::apply_curve;
pub use delay::{AllpassLine, CombLine, DelayLine};
pub use envelope::{
    AdEnvelope, CurveRamp, Envelope, EnvelopeFollower, EnvelopeGenerator, EnvelopeMode,
    EnvelopeStage, LinearEnvelope, LinearRamp, RampShape, UnifiedEnvelope,
};
pub use euclid::EuclideanPattern;
pub use filter::{BandPassFilter, BiquadBandpass, OnePoleCoefficient, SimpleLp, TwoPoleLp};
pub use grain::{GrainProcessor, GrainSettings};
pub use oscillator::{poly_blep, voct_to_hz, MorphOscillator, SineVco};
pub use reverb::{ReverbProcessor, ReverbSettings};
pub use shaping::{fold, soft_clip, tanh_sat};
