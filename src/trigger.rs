//! Trigger and Gate Detection
//!
//! Inputs that react to events use one of two detectors:
//!
//! - [`SchmittTrigger`]: fires once when the voltage rises above 2.0V and
//!   re-arms only after it falls below 0.1V, so noisy or slowly rising edges
//!   produce a single event.
//! - [`PeakTrigger`]: fires on the sample where `|v|` first exceeds 9.5V, used
//!   by reset inputs that expect full-scale pulses.
//!
//! [`PulseGenerator`] produces fixed-length trigger outputs.

/// Default rising threshold in volts
pub const TRIGGER_HIGH: f32 = 2.0;

/// Default re-arm threshold in volts
pub const TRIGGER_LOW: f32 = 0.1;

/// Peak-trigger threshold in volts
pub const PEAK_THRESHOLD: f32 = 9.5;

/// Length of a generated trigger pulse in seconds
pub const TRIGGER_PULSE_SECONDS: f32 = 0.001;

/// Output voltage for high gates and triggers
pub const GATE_VOLTAGE: f32 = 10.0;

/// Edge detector with hysteresis.
#[derive(Debug, Clone, Copy)]
pub struct SchmittTrigger {
    high: bool,
    low_threshold: f32,
    high_threshold: f32,
}

impl SchmittTrigger {
    pub fn new() -> Self {
        Self::with_thresholds(TRIGGER_LOW, TRIGGER_HIGH)
    }

    pub fn with_thresholds(low: f32, high: f32) -> Self {
        Self {
            high: false,
            low_threshold: low.min(high),
            high_threshold: high.max(low),
        }
    }

    /// Returns true on the sample where the input crosses the upper threshold
    #[inline]
    pub fn process(&mut self, voltage: f32) -> bool {
        if self.high {
            if voltage <= self.low_threshold {
                self.high = false;
            }
            false
        } else if voltage >= self.high_threshold {
            self.high = true;
            true
        } else {
            false
        }
    }

    /// Whether the detector currently considers the input high
    #[inline]
    pub fn is_high(&self) -> bool {
        self.high
    }

    pub fn reset(&mut self) {
        self.high = false;
    }
}

impl Default for SchmittTrigger {
    fn default() -> Self {
        Self::new()
    }
}

/// Instantaneous peak test: fires when `|v|` goes above 9.5V.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeakTrigger {
    above: bool,
}

impl PeakTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn process(&mut self, voltage: f32) -> bool {
        let above = voltage.abs() > PEAK_THRESHOLD;
        let fired = above && !self.above;
        self.above = above;
        fired
    }

    pub fn reset(&mut self) {
        self.above = false;
    }
}

/// Generates a high output for a fixed duration after each trigger.
#[derive(Debug, Clone, Copy, Default)]
pub struct PulseGenerator {
    remaining: f32,
}

impl PulseGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) a pulse lasting `duration` seconds
    pub fn trigger(&mut self, duration: f32) {
        self.remaining = self.remaining.max(duration);
    }

    /// Advance by `dt` seconds, returning whether the pulse is high this sample
    #[inline]
    pub fn process(&mut self, dt: f32) -> bool {
        if self.remaining > 0.0 {
            self.remaining -= dt;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.remaining = 0.0;
    }
}

/// Voltage for a boolean gate level
#[inline]
pub fn gate_voltage(high: bool) -> f64 {
    if high {
        GATE_VOLTAGE as f64
    } else {
        0.0
    }
}
