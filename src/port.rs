//! Signal Conventions, Ports and Parameters
//!
//! This module defines the signal types, port and parameter definitions, and the
//! type-erased module interface that every module in the crate implements. It is
//! the per-sample contract between a host (or [`crate::graph::Patch`]) and a
//! module: resolved parameter values and input voltages go in, output voltages
//! come out.

use crate::serialize::StateError;
use serde::{Deserialize, Serialize};

/// Unique identifier for a port within a module
pub type PortId = u32;

/// Unique identifier for a parameter within a module
pub type ParamId = u32;

/// Upper bound (exclusive) on port ids; port buffers are fixed-size
pub const MAX_PORTS: usize = 128;

/// Semantic signal classification following hardware modular conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    /// Audio signal, AC-coupled, typically ±5V peak
    Audio,

    /// Bipolar control voltage, ±5V
    CvBipolar,

    /// Unipolar control voltage, 0–10V (envelopes, knob CV)
    CvUnipolar,

    /// Pitch CV following 1V/octave standard, 0V = C4
    VoltPerOctave,

    /// Gate signal, high while an event is active
    Gate,

    /// Trigger signal, short pulse at +10V
    Trigger,

    /// Clock signal, regular trigger pulses at tempo
    Clock,
}

impl SignalKind {
    /// Returns the typical voltage range (min, max) for this signal type
    pub fn voltage_range(&self) -> (f64, f64) {
        match self {
            SignalKind::Audio | SignalKind::CvBipolar | SignalKind::VoltPerOctave => (-5.0, 5.0),
            SignalKind::CvUnipolar
            | SignalKind::Gate
            | SignalKind::Trigger
            | SignalKind::Clock => (0.0, 10.0),
        }
    }

    /// Whether multiple cables into one input of this kind are summed
    pub fn is_summable(&self) -> bool {
        matches!(
            self,
            SignalKind::Audio
                | SignalKind::CvBipolar
                | SignalKind::CvUnipolar
                | SignalKind::VoltPerOctave
        )
    }
}

/// Definition of a single port (input or output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDef {
    /// Unique identifier within the module
    pub id: PortId,

    /// Human-readable name (e.g., "clock", "env1", "left")
    pub name: String,

    /// Signal type for validation and UI hints
    pub kind: SignalKind,

    /// Neutral value when no cable is connected
    pub default: f64,

    /// For inputs: another input this one copies when unpatched
    pub normalled_to: Option<PortId>,
}

impl PortDef {
    pub fn new(id: PortId, name: impl Into<String>, kind: SignalKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            default: 0.0,
            normalled_to: None,
        }
    }

    pub fn with_default(mut self, default: f64) -> Self {
        self.default = default;
        self
    }

    pub fn normalled_to(mut self, port: PortId) -> Self {
        self.normalled_to = Some(port);
        self
    }
}

/// Specification of all ports for a module
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortSpec {
    pub inputs: Vec<PortDef>,
    pub outputs: Vec<PortDef>,
}

impl PortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_by_name(&self, name: &str) -> Option<&PortDef> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output_by_name(&self, name: &str) -> Option<&PortDef> {
        self.outputs.iter().find(|p| p.name == name)
    }

    pub fn input_by_id(&self, id: PortId) -> Option<&PortDef> {
        self.inputs.iter().find(|p| p.id == id)
    }

    pub fn output_by_id(&self, id: PortId) -> Option<&PortDef> {
        self.outputs.iter().find(|p| p.id == id)
    }

    /// Effective value of an input.
    ///
    /// A patched input reads its own value. An unpatched input follows its
    /// normalling chain to the first patched input, and otherwise reads its
    /// own value or declared default.
    pub fn resolve(&self, values: &PortValues, id: PortId) -> f64 {
        let mut current = id;
        for _ in 0..MAX_PORTS {
            let Some(def) = self.input_by_id(current) else {
                return values.get_or(current, 0.0);
            };
            if values.is_connected(current) {
                return values.get_or(current, def.default);
            }
            match def.normalled_to {
                Some(next) if next != current => current = next,
                _ => break,
            }
        }
        let default = self.input_by_id(id).map_or(0.0, |d| d.default);
        values.get_or(id, default)
    }
}

/// Runtime port values.
///
/// Fixed-capacity so a patch can reuse one instance per node without
/// allocating on the audio thread. Alongside each value it tracks whether the
/// port was written this tick and, for inputs, whether a cable feeds it.
#[derive(Debug, Clone)]
pub struct PortValues {
    values: [f64; MAX_PORTS],
    present: u128,
    connected: u128,
}

impl Default for PortValues {
    fn default() -> Self {
        Self {
            values: [0.0; MAX_PORTS],
            present: 0,
            connected: 0,
        }
    }
}

impl PortValues {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn bit(id: PortId) -> Option<u128> {
        if (id as usize) < MAX_PORTS {
            Some(1u128 << id)
        } else {
            None
        }
    }

    pub fn get(&self, id: PortId) -> Option<f64> {
        let bit = Self::bit(id)?;
        if self.present & bit != 0 {
            Some(self.values[id as usize])
        } else {
            None
        }
    }

    pub fn get_or(&self, id: PortId, default: f64) -> f64 {
        self.get(id).unwrap_or(default)
    }

    /// Writes a value; ids outside the fixed capacity are ignored
    pub fn set(&mut self, id: PortId, value: f64) {
        if let Some(bit) = Self::bit(id) {
            self.values[id as usize] = value;
            self.present |= bit;
        }
    }

    /// Accumulate (sum) a value into a port, for hardware-style input mixing
    pub fn accumulate(&mut self, id: PortId, value: f64) {
        let current = self.get_or(id, 0.0);
        self.set(id, current + value);
    }

    pub fn has(&self, id: PortId) -> bool {
        self.get(id).is_some()
    }

    /// Whether a cable feeds this input
    pub fn is_connected(&self, id: PortId) -> bool {
        Self::bit(id).is_some_and(|bit| self.connected & bit != 0)
    }

    pub fn set_connected(&mut self, id: PortId, connected: bool) {
        if let Some(bit) = Self::bit(id) {
            if connected {
                self.connected |= bit;
            } else {
                self.connected &= !bit;
            }
        }
    }

    /// Sets a value and marks the port as patched
    pub fn patch(&mut self, id: PortId, value: f64) {
        self.set(id, value);
        self.set_connected(id, true);
    }

    /// Iterate over the ports that hold a value
    pub fn iter(&self) -> impl Iterator<Item = (PortId, f64)> + '_ {
        (0..MAX_PORTS as PortId).filter_map(move |id| self.get(id).map(|v| (id, v)))
    }

    pub fn clear(&mut self) {
        self.present = 0;
        self.connected = 0;
    }
}

/// Value range of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamRange {
    /// Continuous value in [min, max]
    Linear { min: f64, max: f64 },

    /// Continuous value in [min, max] with a logarithmic knob law
    /// (frequencies); `min` must be positive
    Exponential { min: f64, max: f64 },

    /// Whole-number value in [min, max] (lengths, modes, toggles)
    Integer { min: i32, max: i32 },
}

impl ParamRange {
    /// Unit-interval knob
    pub const UNIT: ParamRange = ParamRange::Linear { min: 0.0, max: 1.0 };

    /// On/off switch
    pub const TOGGLE: ParamRange = ParamRange::Integer { min: 0, max: 1 };

    pub fn clamp(&self, value: f64) -> f64 {
        match *self {
            ParamRange::Linear { min, max } | ParamRange::Exponential { min, max } => {
                if value.is_nan() {
                    min
                } else {
                    value.clamp(min, max)
                }
            }
            ParamRange::Integer { min, max } => {
                if value.is_nan() {
                    min as f64
                } else {
                    value.round().clamp(min as f64, max as f64)
                }
            }
        }
    }

    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            ParamRange::Linear { min, max } | ParamRange::Exponential { min, max } => (min, max),
            ParamRange::Integer { min, max } => (min as f64, max as f64),
        }
    }

    /// Map a value into 0–1 for UI binding
    pub fn normalize(&self, value: f64) -> f64 {
        let (min, max) = self.bounds();
        if max <= min {
            return 0.0;
        }
        let value = self.clamp(value);
        let normalized = match *self {
            ParamRange::Exponential { .. } if min > 0.0 => {
                libm::log(value / min) / libm::log(max / min)
            }
            _ => (value - min) / (max - min),
        };
        normalized.clamp(0.0, 1.0)
    }

    /// Inverse of [`ParamRange::normalize`]
    pub fn denormalize(&self, normalized: f64) -> f64 {
        let (min, max) = self.bounds();
        let n = normalized.clamp(0.0, 1.0);
        match *self {
            ParamRange::Exponential { .. } if min > 0.0 => {
                self.clamp(min * libm::pow(max / min, n))
            }
            _ => self.clamp(min + n * (max - min)),
        }
    }
}

/// Display unit of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamUnit {
    Plain,
    Percent,
    /// 0–1 knob mapped to seconds through [`knob_to_seconds`]
    KnobSeconds,
    Hertz,
    Bpm,
    /// Signed clock ratio: negative divides, positive multiplies
    DivMult,
    Steps,
    Toggle,
}

/// Parameter definition for UI binding and persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDef {
    pub id: ParamId,
    pub name: String,
    pub default: f64,
    pub range: ParamRange,
    pub unit: ParamUnit,
}

impl ParamDef {
    pub fn new(id: ParamId, name: impl Into<String>, range: ParamRange, default: f64) -> Self {
        Self {
            id,
            name: name.into(),
            default: range.clamp(default),
            range,
            unit: ParamUnit::Plain,
        }
    }

    pub fn unit(mut self, unit: ParamUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Human-readable rendering of `value` in this parameter's unit
    pub fn display(&self, value: f64) -> String {
        format_value(self.unit, self.range.clamp(value))
    }
}

/// Shortest envelope stage a knob can select
pub const MIN_STAGE_SECONDS: f32 = 0.001;

/// Exponential knob-to-time law: `10^((v - 0.5) * 6)` seconds, at least 1ms.
///
/// Spans 1ms at the bottom of the knob to 1000s at the top, centred on 1s.
pub fn knob_to_seconds(v: f32) -> f32 {
    libm::powf(10.0, (v.clamp(0.0, 1.0) - 0.5) * 6.0).max(MIN_STAGE_SECONDS)
}

/// Format a parameter value for display.
pub fn format_value(unit: ParamUnit, value: f64) -> String {
    match unit {
        ParamUnit::Plain => format!("{:.2}", value),
        ParamUnit::Percent => format!("{:.0}%", value * 100.0),
        ParamUnit::KnobSeconds => {
            let seconds = knob_to_seconds(value as f32) as f64;
            if seconds < 1.0 {
                format!("{:.1} ms", seconds * 1000.0)
            } else {
                format!("{:.2} s", seconds)
            }
        }
        ParamUnit::Hertz => {
            if value >= 1000.0 {
                format!("{:.2} kHz", value / 1000.0)
            } else {
                format!("{:.1} Hz", value)
            }
        }
        ParamUnit::Bpm => format!("{:.0} BPM", value),
        ParamUnit::DivMult => {
            let v = value.round() as i32;
            match v.cmp(&0) {
                core::cmp::Ordering::Greater => format!("x{}", v + 1),
                core::cmp::Ordering::Less => format!("/{}", 1 - v),
                core::cmp::Ordering::Equal => "1:1".to_string(),
            }
        }
        ParamUnit::Steps => format!("{}", value.round() as i64),
        ParamUnit::Toggle => {
            if value >= 0.5 {
                "On".to_string()
            } else {
                "Off".to_string()
            }
        }
    }
}

/// Storage for a module's parameter values, indexed by definition order.
///
/// Parameter ids are expected to equal their index in the definition table.
#[derive(Debug, Clone)]
pub struct ParamBank {
    defs: Vec<ParamDef>,
    values: Vec<f64>,
}

impl ParamBank {
    pub fn new(defs: Vec<ParamDef>) -> Self {
        debug_assert!(defs.iter().enumerate().all(|(i, d)| d.id as usize == i));
        let values = defs.iter().map(|d| d.default).collect();
        Self { defs, values }
    }

    pub fn defs(&self) -> &[ParamDef] {
        &self.defs
    }

    pub fn get(&self, id: ParamId) -> Option<f64> {
        self.values.get(id as usize).copied()
    }

    /// Parameter value, or 0.0 for an unknown id
    #[inline]
    pub fn value(&self, id: ParamId) -> f32 {
        self.values.get(id as usize).copied().unwrap_or(0.0) as f32
    }

    /// Parameter value rounded to an integer
    #[inline]
    pub fn int(&self, id: ParamId) -> i32 {
        self.values.get(id as usize).copied().unwrap_or(0.0).round() as i32
    }

    #[inline]
    pub fn flag(&self, id: ParamId) -> bool {
        self.int(id) != 0
    }

    /// Clamps to the declared range; unknown ids are ignored
    pub fn set(&mut self, id: ParamId, value: f64) {
        if let (Some(def), Some(slot)) = (self.defs.get(id as usize), self.values.get_mut(id as usize))
        {
            *slot = def.range.clamp(value);
        }
    }

    pub fn reset_to_defaults(&mut self) {
        for (slot, def) in self.values.iter_mut().zip(&self.defs) {
            *slot = def.default;
        }
    }
}

/// Type-erased module interface for graph-based patching.
///
/// `tick` is the real-time entry point: it must not block or allocate.
pub trait GraphModule: Send {
    /// Returns the module's port specification
    fn port_spec(&self) -> &PortSpec;

    /// Process one sample given port values
    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues);

    /// Reset internal state
    fn reset(&mut self);

    /// Set sample rate
    fn set_sample_rate(&mut self, sample_rate: f64);

    /// Get parameter definitions for UI binding
    fn params(&self) -> &[ParamDef] {
        &[]
    }

    /// Get a parameter value
    fn get_param(&self, _id: ParamId) -> Option<f64> {
        None
    }

    /// Set a parameter value (clamped to its declared range)
    fn set_param(&mut self, _id: ParamId, _value: f64) {}

    /// Get module type identifier for serialization
    fn type_id(&self) -> &'static str {
        "unknown"
    }

    /// Serialize the non-parameter state needed to restore the module
    fn serialize_state(&self) -> Option<serde_json::Value> {
        None
    }

    /// Restore state written by [`GraphModule::serialize_state`]
    fn deserialize_state(&mut self, _state: &serde_json::Value) -> Result<(), StateError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_signal_kind_ranges() {
        assert_eq!(SignalKind::Audio.voltage_range(), (-5.0, 5.0));
        assert_eq!(SignalKind::Gate.voltage_range(), (0.0, 10.0));
        assert_eq!(SignalKind::CvUnipolar.voltage_range(), (0.0, 10.0));
    }

    #[test]
    fn test_signal_kind_summable() {
        assert!(SignalKind::Audio.is_summable());
        assert!(SignalKind::CvBipolar.is_summable());
        assert!(!SignalKind::Gate.is_summable());
        assert!(!SignalKind::Clock.is_summable());
    }

    #[test]
    fn test_port_values() {
        let mut pv = PortValues::new();
        pv.set(0, 1.0);
        pv.set(1, 2.0);
        assert_eq!(pv.get(0), Some(1.0));
        assert_eq!(pv.get(1), Some(2.0));
        assert_eq!(pv.get(2), None);
        assert_eq!(pv.get_or(2, 5.0), 5.0);

        pv.accumulate(0, 0.5);
        assert_eq!(pv.get(0), Some(1.5));

        pv.clear();
        assert_eq!(pv.get(0), None);
    }

    #[test]
    fn test_port_values_out_of_range_ids_are_ignored() {
        let mut pv = PortValues::new();
        pv.set(MAX_PORTS as PortId, 3.0);
        pv.set_connected(500, true);
        assert_eq!(pv.get(MAX_PORTS as PortId), None);
        assert!(!pv.is_connected(500));
        assert_eq!(pv.iter().count(), 0);
    }

    #[test]
    fn test_port_values_connected_flag() {
        let mut pv = PortValues::new();
        pv.set(3, 0.0);
        assert!(!pv.is_connected(3));
        pv.patch(4, 1.0);
        assert!(pv.is_connected(4));
        pv.set_connected(4, false);
        assert!(!pv.is_connected(4));
    }

    #[test]
    fn test_param_range_clamp() {
        let range = ParamRange::Linear { min: -1.0, max: 1.0 };
        assert_eq!(range.clamp(3.0), 1.0);
        assert_eq!(range.clamp(f64::NAN), -1.0);

        let steps = ParamRange::Integer { min: 1, max: 32 };
        assert_eq!(steps.clamp(16.4), 16.0);
        assert_eq!(steps.clamp(0.0), 1.0);
        assert_eq!(steps.clamp(99.0), 32.0);
    }

    #[test]
    fn test_param_range_normalize_roundtrip_endpoints() {
        let range = ParamRange::Integer { min: -3, max: 3 };
        assert_relative_eq!(range.normalize(-3.0), 0.0);
        assert_relative_eq!(range.normalize(3.0), 1.0);
        assert_relative_eq!(range.denormalize(0.5), 0.0);
    }

    #[test]
    fn test_exponential_range() {
        let range = ParamRange::Exponential { min: 20.0, max: 20000.0 };
        assert_relative_eq!(range.normalize(20.0), 0.0);
        assert_relative_eq!(range.normalize(20000.0), 1.0);
        assert_relative_eq!(range.denormalize(0.5), 632.455, epsilon = 1e-2);
        assert_relative_eq!(range.normalize(range.denormalize(0.3)), 0.3, epsilon = 1e-9);
        assert_eq!(range.clamp(5.0), 20.0);
    }

    #[test]
    fn test_knob_to_seconds() {
        assert_relative_eq!(knob_to_seconds(0.5), 1.0, epsilon = 1e-6);
        assert_relative_eq!(knob_to_seconds(0.0), 0.001, epsilon = 1e-7);
        assert!(knob_to_seconds(1.0) > 900.0);
        // below-range knob values still respect the floor
        assert_relative_eq!(knob_to_seconds(-4.0), 0.001, epsilon = 1e-7);
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(ParamUnit::DivMult, 2.0), "x3");
        assert_eq!(format_value(ParamUnit::DivMult, -1.0), "/2");
        assert_eq!(format_value(ParamUnit::DivMult, 0.0), "1:1");
        assert_eq!(format_value(ParamUnit::Percent, 0.25), "25%");
        assert_eq!(format_value(ParamUnit::Toggle, 1.0), "On");
        assert_eq!(format_value(ParamUnit::KnobSeconds, 0.5), "1.00 s");
        assert_eq!(format_value(ParamUnit::Hertz, 2500.0), "2.50 kHz");

        let fill = ParamDef::new(0, "fill", ParamRange::UNIT, 0.25).unit(ParamUnit::Percent);
        assert_eq!(fill.display(1.5), "100%");
    }

    #[test]
    fn test_param_bank() {
        let mut bank = ParamBank::new(vec![
            ParamDef::new(0, "length", ParamRange::Integer { min: 1, max: 32 }, 16.0),
            ParamDef::new(1, "curve", ParamRange::Linear { min: -0.99, max: 0.99 }, 0.0),
        ]);
        assert_eq!(bank.int(0), 16);
        bank.set(0, 40.0);
        assert_eq!(bank.int(0), 32);
        bank.set(7, 1.0);
        assert_eq!(bank.get(7), None);
        assert_eq!(bank.value(7), 0.0);
        bank.reset_to_defaults();
        assert_eq!(bank.int(0), 16);
    }

    #[test]
    fn test_port_spec_lookup() {
        let spec = PortSpec {
            inputs: vec![
                PortDef::new(0, "in1", SignalKind::Audio),
                PortDef::new(1, "in2", SignalKind::CvBipolar).normalled_to(0),
            ],
            outputs: vec![PortDef::new(10, "out1", SignalKind::Audio)],
        };
        assert_eq!(spec.input_by_name("in2").map(|p| p.id), Some(1));
        assert_eq!(spec.input_by_id(1).and_then(|p| p.normalled_to), Some(0));
        assert!(spec.output_by_name("missing").is_none());
        assert_eq!(spec.output_by_id(10).map(|p| p.name.as_str()), Some("out1"));
    }

    #[test]
    fn test_resolve_follows_normalling() {
        let spec = PortSpec {
            inputs: vec![
                PortDef::new(0, "a", SignalKind::Trigger),
                PortDef::new(1, "b", SignalKind::Trigger).normalled_to(0),
                PortDef::new(2, "c", SignalKind::Trigger).normalled_to(1),
                PortDef::new(3, "level", SignalKind::CvUnipolar).with_default(10.0),
            ],
            outputs: vec![],
        };
        let mut pv = PortValues::new();
        assert_eq!(spec.resolve(&pv, 2), 0.0);
        assert_eq!(spec.resolve(&pv, 3), 10.0);

        pv.patch(0, 5.0);
        assert_eq!(spec.resolve(&pv, 1), 5.0);
        assert_eq!(spec.resolve(&pv, 2), 5.0);

        pv.patch(1, 1.0);
        assert_eq!(spec.resolve(&pv, 2), 1.0);
        assert_eq!(spec.resolve(&pv, 0), 5.0);

        // an unpatched value without normalling is read as-is
        pv.set(3, 4.0);
        assert_eq!(spec.resolve(&pv, 3), 4.0);
    }
}
