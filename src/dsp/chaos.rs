//! Lorenz-style chaotic modulation source.

/// Restart point after divergence
const SEED: (f32, f32, f32) = (0.1, 0.1, 0.1);

/// Any state component beyond this magnitude counts as divergence
const DIVERGENCE_LIMIT: f32 = 100.0;

/// Three-variable attractor integrated with fixed-step Euler.
///
/// ```text
/// dx = 7.5 (y - x)
/// dy = x (30.9 - z) - y
/// dz = x y - 1.02 z
/// ```
///
/// The step size is `rate * 0.001`. If the state ever goes non-finite or leaves
/// ±100 it restarts from (0.1, 0.1, 0.1), so the output is always a finite
/// value in [-1, 1].
#[derive(Debug, Clone, Copy)]
pub struct ChaosGenerator {
    x: f32,
    y: f32,
    z: f32,
}

impl ChaosGenerator {
    pub fn new() -> Self {
        Self {
            x: SEED.0,
            y: SEED.1,
            z: SEED.2,
        }
    }

    /// Advance one step and return `clamp(x * 0.1, -1, 1)`
    #[inline]
    pub fn process(&mut self, rate: f32) -> f32 {
        let dt = rate * 0.001;
        let dx = 7.5 * (self.y - self.x);
        let dy = self.x * (30.9 - self.z) - self.y;
        let dz = self.x * self.y - 1.02 * self.z;

        self.x += dx * dt;
        self.y += dy * dt;
        self.z += dz * dt;

        if self.diverged() {
            self.reset();
        }

        (self.x * 0.1).clamp(-1.0, 1.0)
    }

    fn diverged(&self) -> bool {
        [self.x, self.y, self.z]
            .iter()
            .any(|v| v.is_nan() || v.abs() > DIVERGENCE_LIMIT)
    }

    pub fn state(&self) -> (f32, f32, f32) {
        (self.x, self.y, self.z)
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for ChaosGenerator {
    fn default() -> Self {
        Self::new()
    }
}
