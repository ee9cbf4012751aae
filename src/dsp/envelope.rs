//! Curve-shaped envelope generators
//!
//! Every envelope in the crate is the same state machine,
//!
//! ```text
//! Idle ──trigger──▶ Attack ──▶ [Hold] ──▶ Decay ──▶ Idle
//!   ▲                 ▲                     │
//!   └─────────────────┴──── trigger ────────┘
//! ```
//!
//! configured by an [`EnvelopeMode`] (with or without the hold stage) and a
//! [`RampShape`] strategy (curved or linear). [`UnifiedEnvelope`] adds an
//! envelope follower whose level is blended in with `max()`.
//!
//! Stage boundaries are computed from an integer sample count, so an attack of
//! exactly `n` sample periods reaches 1.0 on sample `n`.

use super::curve::apply_curve;
use super::filter::OnePoleCoefficient;

/// Largest curvature magnitude accepted; keeps the curve denominator away from
/// zero at the ends of the ramp.
pub const MAX_CURVE: f32 = 0.99;

/// Envelope stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Idle,
    Attack,
    Hold,
    Decay,
}

/// Whether the envelope holds at full level while its gate is high
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeMode {
    /// Attack then decay, ignoring the gate
    #[default]
    AttackDecay,
    /// Attack, hold while the gate is high, then release
    AttackHoldRelease,
}

/// Ramp shaping strategy.
pub trait RampShape {
    /// Attack ramp for normalized time `t` in [0, 1]
    fn rise(&self, t: f32) -> f32;

    /// Decay ramp for normalized time `t` in [0, 1]
    fn fall(&self, t: f32) -> f32 {
        1.0 - self.rise(t)
    }
}

/// Rational curve ramp (see [`apply_curve`])
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CurveRamp {
    curve: f32,
}

impl CurveRamp {
    pub fn new(curve: f32) -> Self {
        let mut ramp = Self::default();
        ramp.set_curve(curve);
        ramp
    }

    pub fn set_curve(&mut self, curve: f32) {
        self.curve = if curve.is_nan() {
            0.0
        } else {
            curve.clamp(-MAX_CURVE, MAX_CURVE)
        };
    }

    pub fn curve(&self) -> f32 {
        self.curve
    }
}

impl RampShape for CurveRamp {
    #[inline]
    fn rise(&self, t: f32) -> f32 {
        apply_curve(t, self.curve)
    }
}

/// Straight-line ramp
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LinearRamp;

impl RampShape for LinearRamp {
    #[inline]
    fn rise(&self, t: f32) -> f32 {
        t
    }
}

/// Common interface of the envelope family.
pub trait EnvelopeGenerator {
    /// Restart the attack from any stage
    fn trigger(&mut self);

    /// Advance one sample of `dt` seconds and return the output in [0, 1]
    fn process(&mut self, dt: f32, gate: bool) -> f32;

    fn stage(&self) -> EnvelopeStage;

    /// Most recent output
    fn value(&self) -> f32;

    fn reset(&mut self);

    fn is_idle(&self) -> bool {
        self.stage() == EnvelopeStage::Idle
    }
}

/// Attack/decay envelope with optional hold stage.
#[derive(Debug, Clone, Copy)]
pub struct Envelope<S: RampShape = CurveRamp> {
    stage: EnvelopeStage,
    samples: u32,
    phase_time: f32,
    attack_time: f32,
    decay_time: f32,
    mode: EnvelopeMode,
    shape: S,
    output: f32,
}

/// Curved attack/decay envelope
pub type AdEnvelope = Envelope<CurveRamp>;

/// Linear attack/decay envelope
pub type LinearEnvelope = Envelope<LinearRamp>;

impl<S: RampShape> Envelope<S> {
    pub fn with_shape(attack_time: f32, decay_time: f32, mode: EnvelopeMode, shape: S) -> Self {
        Self {
            stage: EnvelopeStage::Idle,
            samples: 0,
            phase_time: 0.0,
            attack_time: sanitize_time(attack_time),
            decay_time: sanitize_time(decay_time),
            mode,
            shape,
            output: 0.0,
        }
    }

    /// Attack time in seconds; non-positive values skip the attack
    pub fn set_attack(&mut self, seconds: f32) {
        self.attack_time = sanitize_time(seconds);
    }

    /// Decay time in seconds; non-positive values end the decay at once
    pub fn set_decay(&mut self, seconds: f32) {
        self.decay_time = sanitize_time(seconds);
    }

    pub fn set_mode(&mut self, mode: EnvelopeMode) {
        self.mode = mode;
    }

    pub fn attack_time(&self) -> f32 {
        self.attack_time
    }

    pub fn decay_time(&self) -> f32 {
        self.decay_time
    }

    pub fn mode(&self) -> EnvelopeMode {
        self.mode
    }

    /// Seconds spent in the current stage
    pub fn phase_time(&self) -> f32 {
        self.phase_time
    }

    pub fn shape(&self) -> &S {
        &self.shape
    }

    pub fn shape_mut(&mut self) -> &mut S {
        &mut self.shape
    }

    /// Enter `stage` with the current sample counted as its first
    fn enter(&mut self, stage: EnvelopeStage) {
        self.stage = stage;
        self.samples = 1;
        self.phase_time = 0.0;
    }

    fn finish_attack(&mut self, gate: bool) -> f32 {
        match self.mode {
            EnvelopeMode::AttackHoldRelease if gate => {
                self.enter(EnvelopeStage::Hold);
                1.0
            }
            _ => self.start_decay(),
        }
    }

    fn start_decay(&mut self) -> f32 {
        if self.decay_time <= 0.0 {
            self.enter(EnvelopeStage::Idle);
            return 0.0;
        }
        self.enter(EnvelopeStage::Decay);
        1.0
    }
}

impl Envelope<CurveRamp> {
    /// Curved attack/decay envelope
    pub fn ad(attack_time: f32, decay_time: f32, curve: f32) -> Self {
        Self::with_shape(
            attack_time,
            decay_time,
            EnvelopeMode::AttackDecay,
            CurveRamp::new(curve),
        )
    }

    /// Curved attack/hold/release envelope
    pub fn ahr(attack_time: f32, release_time: f32, curve: f32) -> Self {
        Self::with_shape(
            attack_time,
            release_time,
            EnvelopeMode::AttackHoldRelease,
            CurveRamp::new(curve),
        )
    }

    pub fn set_curve(&mut self, curve: f32) {
        self.shape.set_curve(curve);
    }

    pub fn curve(&self) -> f32 {
        self.shape.curve()
    }
}

impl Envelope<LinearRamp> {
    pub fn linear(attack_time: f32, decay_time: f32) -> Self {
        Self::with_shape(attack_time, decay_time, EnvelopeMode::AttackDecay, LinearRamp)
    }
}

impl Default for Envelope<CurveRamp> {
    fn default() -> Self {
        Self::ad(0.01, 0.3, 0.0)
    }
}

impl<S: RampShape> EnvelopeGenerator for Envelope<S> {
    fn trigger(&mut self) {
        self.stage = EnvelopeStage::Attack;
        self.samples = 0;
        self.phase_time = 0.0;
    }

    fn process(&mut self, dt: f32, gate: bool) -> f32 {
        let output = match self.stage {
            EnvelopeStage::Idle => 0.0,
            EnvelopeStage::Attack => {
                let t = self.samples as f32 * dt;
                if t >= self.attack_time {
                    self.finish_attack(gate)
                } else {
                    self.phase_time = t;
                    self.samples += 1;
                    self.shape.rise(t / self.attack_time)
                }
            }
            EnvelopeStage::Hold => {
                if gate {
                    self.phase_time = self.samples as f32 * dt;
                    self.samples = self.samples.saturating_add(1);
                    1.0
                } else {
                    self.start_decay()
                }
            }
            EnvelopeStage::Decay => {
                let t = self.samples as f32 * dt;
                if t >= self.decay_time {
                    self.enter(EnvelopeStage::Idle);
                    0.0
                } else {
                    self.phase_time = t;
                    self.samples += 1;
                    self.shape.fall(t / self.decay_time)
                }
            }
        };
        self.output = output.clamp(0.0, 1.0);
        self.output
    }

    fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    fn value(&self) -> f32 {
        self.output
    }

    fn reset(&mut self) {
        self.stage = EnvelopeStage::Idle;
        self.samples = 0;
        self.phase_time = 0.0;
        self.output = 0.0;
    }
}

#[inline]
fn sanitize_time(seconds: f32) -> f32 {
    if seconds.is_nan() {
        0.0
    } else {
        seconds.max(0.0)
    }
}

/// RC-style envelope follower: rectifies its input and tracks it with
/// separate attack and release time constants.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeFollower {
    level: f32,
    attack: OnePoleCoefficient,
    release: OnePoleCoefficient,
}

impl EnvelopeFollower {
    pub fn new(attack_time: f32, release_time: f32) -> Self {
        Self {
            level: 0.0,
            attack: OnePoleCoefficient::from_time(attack_time),
            release: OnePoleCoefficient::from_time(release_time),
        }
    }

    pub fn set_times(&mut self, attack_time: f32, release_time: f32) {
        self.attack.set_time(attack_time);
        self.release.set_time(release_time);
    }

    #[inline]
    pub fn process(&mut self, input: f32, dt: f32) -> f32 {
        let rectified = if input.is_finite() { input.abs() } else { 0.0 };
        let coefficient = if rectified > self.level {
            self.attack.get(dt)
        } else {
            self.release.get(dt)
        };
        self.level += (rectified - self.level) * coefficient;
        self.level
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn reset(&mut self) {
        self.level = 0.0;
    }
}

impl Default for EnvelopeFollower {
    fn default() -> Self {
        Self::new(0.002, 0.1)
    }
}

/// Trigger envelope blended with an envelope follower through `max()`.
///
/// The follower tracks an audio input (in volts, ±5V full scale) so a drum
/// hit both fires the envelope and shapes its body.
#[derive(Debug, Clone, Copy)]
pub struct UnifiedEnvelope {
    envelope: Envelope<CurveRamp>,
    follower: EnvelopeFollower,
    follower_amount: f32,
    input: f32,
    output: f32,
}

impl UnifiedEnvelope {
    pub fn new(envelope: Envelope<CurveRamp>) -> Self {
        Self {
            envelope,
            follower: EnvelopeFollower::default(),
            follower_amount: 0.0,
            input: 0.0,
            output: 0.0,
        }
    }

    pub fn envelope(&self) -> &Envelope<CurveRamp> {
        &self.envelope
    }

    pub fn envelope_mut(&mut self) -> &mut Envelope<CurveRamp> {
        &mut self.envelope
    }

    pub fn follower_mut(&mut self) -> &mut EnvelopeFollower {
        &mut self.follower
    }

    /// Follower contribution, 0 (off) to 1
    pub fn set_follower_amount(&mut self, amount: f32) {
        self.follower_amount = amount.clamp(0.0, 1.0);
    }

    /// Audio sample (volts) the follower sees on the next `process`
    pub fn set_input(&mut self, volts: f32) {
        self.input = volts;
    }
}

impl Default for UnifiedEnvelope {
    fn default() -> Self {
        Self::new(Envelope::default())
    }
}

impl EnvelopeGenerator for UnifiedEnvelope {
    fn trigger(&mut self) {
        self.envelope.trigger();
    }

    fn process(&mut self, dt: f32, gate: bool) -> f32 {
        let env = self.envelope.process(dt, gate);
        let followed = self.follower.process(self.input * 0.2, dt);
        let blended = if self.follower_amount > 0.0 {
            env.max(followed * self.follower_amount)
        } else {
            env
        };
        self.output = blended.clamp(0.0, 1.0);
        self.output
    }

    fn stage(&self) -> EnvelopeStage {
        self.envelope.stage()
    }

    fn value(&self) -> f32 {
        self.output
    }

    fn reset(&mut self) {
        self.envelope.reset();
        self.follower.reset();
        self.input = 0.0;
        self.output = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const DT: f32 = 1.0 / 1000.0;

    fn render<E: EnvelopeGenerator>(
        env: &mut E,
        samples: usize,
        gate: impl Fn(usize) -> bool,
    ) -> Vec<f32> {
        (0..samples).map(|n| env.process(DT, gate(n))).collect()
    }

    #[test]
    fn test_idle_until_triggered() {
        let mut env = Envelope::ad(0.01, 0.1, 0.0);
        assert!(render(&mut env, 100, |_| false).iter().all(|&v| v == 0.0));
        assert!(env.is_idle());
    }

    #[test]
    fn test_trigger_enters_attack_immediately() {
        let mut env = Envelope::ad(0.01, 0.1, 0.0);
        env.trigger();
        env.process(DT, false);
        assert_eq!(env.stage(), EnvelopeStage::Attack);
    }

    #[test]
    fn test_linear_ad_sample_accuracy() {
        let mut env = Envelope::ad(0.01, 0.1, 0.0);
        env.trigger();
        let out = render(&mut env, 200, |_| false);

        assert_eq!(out[0], 0.0);
        assert!(out[9] < 1.0);
        assert_eq!(out[10], 1.0);
        assert!(out[109] > 0.0);
        assert_eq!(out[110], 0.0);
        assert!(out[110..].iter().all(|&v| v == 0.0));
        assert!(env.is_idle());

        assert_relative_eq!(out[5], 0.5, epsilon = 1e-5);
        assert_relative_eq!(out[60], 0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_monotonic_stages() {
        for &curve in &[-0.9, -0.4, 0.0, 0.4, 0.9] {
            let mut env = Envelope::ad(0.05, 0.2, curve);
            env.trigger();
            let out = render(&mut env, 300, |_| false);
            let peak = out.iter().position(|&v| v == 1.0).unwrap();
            assert!(out[..=peak].windows(2).all(|w| w[1] >= w[0]), "curve {}", curve);
            assert!(out[peak..].windows(2).all(|w| w[1] <= w[0]), "curve {}", curve);
            assert!(out.iter().all(|&v| (0.0..=1.0).contains(&v)));
        }
    }

    #[test]
    fn test_retrigger_during_decay_restarts_attack() {
        let mut env = Envelope::ad(0.01, 0.1, 0.0);
        env.trigger();
        render(&mut env, 50, |_| false);
        assert_eq!(env.stage(), EnvelopeStage::Decay);
        let before = env.value();
        assert!(before > 0.0 && before < 1.0);

        env.trigger();
        let out = env.process(DT, false);
        assert_eq!(env.stage(), EnvelopeStage::Attack);
        assert_eq!(out, 0.0);
        let out = render(&mut env, 10, |_| false);
        assert_eq!(out[9], 1.0);
    }

    #[test]
    fn test_hold_follows_gate() {
        let mut env = Envelope::ahr(0.01, 0.05, 0.0);
        env.trigger();
        let out = render(&mut env, 300, |n| n < 200);
        assert_eq!(out[10], 1.0);
        assert!(out[10..200].iter().all(|&v| v == 1.0));
        assert_eq!(env.stage(), EnvelopeStage::Idle);
        // release starts when the gate falls and lasts 50 samples
        assert_eq!(out[200], 1.0);
        assert!(out[249] > 0.0);
        assert_eq!(out[250], 0.0);
    }

    #[test]
    fn test_ahr_without_gate_behaves_like_ad() {
        let mut env = Envelope::ahr(0.01, 0.1, 0.0);
        env.trigger();
        let out = render(&mut env, 200, |_| false);
        assert_eq!(out[10], 1.0);
        assert_eq!(out[110], 0.0);
    }

    #[test]
    fn test_zero_decay_goes_idle() {
        let mut env = Envelope::ad(0.002, 0.0, 0.0);
        env.trigger();
        let out = render(&mut env, 5, |_| false);
        assert_eq!(out[2], 0.0);
        assert!(env.is_idle());
    }

    #[test]
    fn test_zero_attack_snaps_to_peak() {
        let mut env = Envelope::ad(0.0, 0.01, 0.0);
        env.trigger();
        assert_eq!(env.process(DT, false), 1.0);
        assert_eq!(env.stage(), EnvelopeStage::Decay);
    }

    #[test]
    fn test_nan_parameters_are_sanitized() {
        let mut env = Envelope::ad(f32::NAN, f32::NAN, f32::NAN);
        env.trigger();
        let out = render(&mut env, 10, |_| false);
        assert!(out.iter().all(|v| v.is_finite()));
        assert!(env.is_idle());
    }

    #[test]
    fn test_linear_envelope_matches_zero_curve() {
        let mut linear = Envelope::linear(0.02, 0.05);
        let mut curved = Envelope::ad(0.02, 0.05, 0.0);
        linear.trigger();
        curved.trigger();
        for _ in 0..100 {
            assert_eq!(linear.process(DT, false), curved.process(DT, false));
        }
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut env = Envelope::ad(0.01, 0.1, 0.3);
        env.trigger();
        render(&mut env, 20, |_| false);
        env.reset();
        assert!(env.is_idle());
        assert_eq!(env.value(), 0.0);
        assert_eq!(env.process(DT, false), 0.0);
    }

    #[test]
    fn test_follower_tracks_and_releases() {
        let mut follower = EnvelopeFollower::new(0.001, 0.05);
        for _ in 0..50 {
            follower.process(1.0, DT);
        }
        assert!(follower.level() > 0.95);
        for _ in 0..500 {
            follower.process(0.0, DT);
        }
        assert!(follower.level() < 0.01);
    }

    #[test]
    fn test_unified_blends_with_max() {
        let mut env = UnifiedEnvelope::new(Envelope::ad(0.001, 0.005, 0.0));
        env.set_follower_amount(1.0);
        env.trigger();
        // after the short trigger envelope ends, a loud input keeps it up
        for _ in 0..100 {
            env.set_input(5.0);
            env.process(DT, false);
        }
        assert!(env.envelope().is_idle());
        assert!(env.value() > 0.9);

        env.set_follower_amount(0.0);
        assert_eq!(env.process(DT, false), 0.0);
    }
}
