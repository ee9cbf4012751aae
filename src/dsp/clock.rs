//! Clock period tracking and per-track division/multiplication
//!
//! [`ClockPeriodTracker`] estimates the external clock period from the time
//! between the two most recent edges. [`ClockDivMult`] turns that estimate and
//! the raw edges into internal step pulses at `multiplication / division`
//! times the external rate.

/// Shortest accepted clock period in seconds
pub const MIN_PERIOD: f32 = 0.01;

/// Longest accepted clock period in seconds
pub const MAX_PERIOD: f32 = 10.0;

/// Period reported before two edges have been seen (120 BPM)
pub const DEFAULT_PERIOD: f32 = 0.5;

/// Measures the time between consecutive clock edges.
#[derive(Debug, Clone, Copy)]
pub struct ClockPeriodTracker {
    since_last_edge: f32,
    period: f32,
    seen_edge: bool,
}

impl ClockPeriodTracker {
    pub fn new() -> Self {
        Self {
            since_last_edge: 0.0,
            period: DEFAULT_PERIOD,
            seen_edge: false,
        }
    }

    /// Advance one sample. Call with `edge` true on the sample of a clock edge.
    #[inline]
    pub fn process(&mut self, edge: bool, dt: f32) -> f32 {
        if edge {
            if self.seen_edge {
                self.period = self.since_last_edge.clamp(MIN_PERIOD, MAX_PERIOD);
            }
            self.seen_edge = true;
            self.since_last_edge = 0.0;
        }
        self.since_last_edge += dt;
        self.period
    }

    pub fn period(&self) -> f32 {
        self.period
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for ClockPeriodTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert the signed div/mult control to `(division, multiplication)`.
///
/// Positive values multiply (`v + 1`), negative values divide (`1 - v`), zero
/// is unity.
#[inline]
pub fn div_mult_ratio(value: i32) -> (u32, u32) {
    match value {
        v if v > 0 => (1, v as u32 + 1),
        v if v < 0 => (v.unsigned_abs() + 1, 1),
        _ => (1, 1),
    }
}

/// Per-track clock divider/multiplier.
///
/// Division: every external edge advances a modulo-`division` counter and the
/// edge that starts a new cycle resets the divided window. The first edge after
/// a reset always starts a window.
///
/// Multiplication: inside the window a sub-phase scaled by `multiplication`
/// drives a 50% duty gate; every rising edge of that gate is one step.
#[derive(Debug, Clone, Copy)]
pub struct ClockDivMult {
    division: u32,
    multiplication: u32,
    edge_counter: u32,
    divided_progress_seconds: f32,
    divided_clock_seconds: f32,
    multiplied_clock_seconds: f32,
    gate_seconds: f32,
    running: bool,
    gate: bool,
}

impl ClockDivMult {
    pub fn new() -> Self {
        Self {
            division: 1,
            multiplication: 1,
            edge_counter: 0,
            divided_progress_seconds: 0.0,
            divided_clock_seconds: DEFAULT_PERIOD,
            multiplied_clock_seconds: DEFAULT_PERIOD,
            gate_seconds: DEFAULT_PERIOD * 0.5,
            running: false,
            gate: false,
        }
    }

    /// Set the ratio from the signed div/mult control
    pub fn set_div_mult(&mut self, value: i32) {
        let (division, multiplication) = div_mult_ratio(value);
        self.set_ratio(division, multiplication);
    }

    pub fn set_ratio(&mut self, division: u32, multiplication: u32) {
        let division = division.max(1);
        if division != self.division {
            self.edge_counter %= division;
        }
        self.division = division;
        self.multiplication = multiplication.max(1);
    }

    pub fn division(&self) -> u32 {
        self.division
    }

    pub fn multiplication(&self) -> u32 {
        self.multiplication
    }

    pub fn divided_clock_seconds(&self) -> f32 {
        self.divided_clock_seconds
    }

    pub fn multiplied_clock_seconds(&self) -> f32 {
        self.multiplied_clock_seconds
    }

    pub fn gate_seconds(&self) -> f32 {
        self.gate_seconds
    }

    /// Whether the internal 50% gate is currently high
    pub fn gate(&self) -> bool {
        self.gate
    }

    /// Advance one sample; returns true on the sample of each internal step.
    ///
    /// `period` is the current external clock period estimate in seconds and
    /// `clock_edge` is true on the sample of an external rising edge.
    pub fn process(&mut self, period: f32, clock_edge: bool, dt: f32) -> bool {
        let period = period.clamp(MIN_PERIOD, MAX_PERIOD);
        self.divided_clock_seconds = period * self.division as f32;
        self.multiplied_clock_seconds = self.divided_clock_seconds / self.multiplication as f32;
        self.gate_seconds = self.multiplied_clock_seconds * 0.5;

        if clock_edge {
            if self.edge_counter == 0 {
                // a new window always opens with a step
                self.divided_progress_seconds = 0.0;
                self.running = true;
                self.gate = false;
            }
            self.edge_counter = (self.edge_counter + 1) % self.division;
        }

        let in_window =
            self.running && self.divided_progress_seconds < self.divided_clock_seconds;
        let gate = in_window && {
            let sub = self.divided_progress_seconds / self.multiplied_clock_seconds;
            sub - libm::floorf(sub) < 0.5
        };
        let step = gate && !self.gate;
        self.gate = gate;

        if self.running {
            self.divided_progress_seconds += dt;
        }
        step
    }

    /// Restart counting; the next external edge starts a new window
    pub fn reset(&mut self) {
        self.edge_counter = 0;
        self.divided_progress_seconds = 0.0;
        self.running = false;
        self.gate = false;
    }
}

impl Default for ClockDivMult {
    fn default() -> Self {
        Self::new()
    }
}
