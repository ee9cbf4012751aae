//! Euclidean rhythm patterns
//!
//! A pattern distributes `fill` onsets as evenly as possible over `length`
//! steps and then rotates them right by `shift`. Patterns live in a fixed
//! 64-slot array and are only rebuilt when one of the three inputs changes.

/// Maximum pattern length
pub const MAX_STEPS: usize = 64;

/// Fill `steps` with a Euclidean rhythm.
///
/// Only the first `length` slots are meaningful; all others are cleared.
/// `fill` is clamped to `length`, `length` to [`MAX_STEPS`], and `shift` wraps
/// modulo `length` in both directions.
pub fn generate(steps: &mut [bool; MAX_STEPS], length: usize, fill: usize, shift: i32) {
    steps.fill(false);
    let length = length.min(MAX_STEPS);
    if length == 0 || fill == 0 {
        return;
    }
    let fill = fill.min(length);

    for i in 0..fill {
        steps[i * length / fill] = true;
    }

    let rotation = shift.rem_euclid(length as i32) as usize;
    steps[..length].rotate_right(rotation);
}

/// A cached Euclidean pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EuclideanPattern {
    steps: [bool; MAX_STEPS],
    length: usize,
    fill: usize,
    shift: i32,
}

impl EuclideanPattern {
    pub fn new(length: usize, fill: usize, shift: i32) -> Self {
        let mut pattern = Self {
            steps: [false; MAX_STEPS],
            length: 0,
            fill: 0,
            shift: 0,
        };
        pattern.rebuild(length, fill, shift);
        pattern
    }

    fn rebuild(&mut self, length: usize, fill: usize, shift: i32) {
        self.length = length.min(MAX_STEPS);
        self.fill = fill.min(self.length);
        self.shift = shift;
        generate(&mut self.steps, self.length, self.fill, self.shift);
    }

    /// Rebuild if any input differs from the cached one; returns whether it did.
    pub fn update(&mut self, length: usize, fill: usize, shift: i32) -> bool {
        let length = length.min(MAX_STEPS);
        let fill = fill.min(length);
        if length == self.length && fill == self.fill && shift == self.shift {
            return false;
        }
        self.rebuild(length, fill, shift);
        true
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn fill(&self) -> usize {
        self.fill
    }

    pub fn shift(&self) -> i32 {
        self.shift
    }

    /// Whether `step` is an onset; steps at or past `length` are rests
    #[inline]
    pub fn is_active(&self, step: usize) -> bool {
        step < self.length && self.steps[step]
    }

    /// The active prefix of the pattern
    pub fn steps(&self) -> &[bool] {
        &self.steps[..self.length]
    }

    /// Number of onsets in the active prefix
    pub fn onsets(&self) -> usize {
        self.steps().iter().filter(|&&s| s).count()
    }
}

impl Default for EuclideanPattern {
    fn default() -> Self {
        Self::new(16, 4, 0)
    }
}
