//! Serialization and Persistence
//!
//! Patches are saved as a [`PatchDef`]: the patch configuration, every module
//! with its parameter values and its small JSON state, and every cable as a
//! pair of `"module.port"` references. Derived DSP state (patterns, filter
//! and delay memories) is never stored; it is rebuilt from the parameters.
//!
//! Loading goes through a [`ModuleRegistry`] that maps `type_id`s to
//! factories. A module whose state fails to restore is logged and kept with
//! its default state so one bad entry does not lose the whole patch.

use crate::config::PatchConfig;
use crate::graph::{NodeHandle, NodeId, Patch, PatchError};
use crate::modules::{AdGenerator, EllenRipley, EuclideanRhythm, Maddy, SineVco, StereoMixer};
use crate::port::{GraphModule, PortSpec};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

pub const PATCH_VERSION: u32 = 1;

/// Why a module rejected its persisted state
#[derive(Debug, Clone, PartialEq)]
pub enum StateError {
    MissingField(String),
    WrongType {
        field: String,
        expected: &'static str,
    },
    OutOfRange {
        field: String,
        value: String,
    },
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateError::MissingField(field) => write!(f, "missing field '{}'", field),
            StateError::WrongType { field, expected } => {
                write!(f, "field '{}' should be {}", field, expected)
            }
            StateError::OutOfRange { field, value } => {
                write!(f, "field '{}' has out-of-range value {}", field, value)
            }
        }
    }
}

impl std::error::Error for StateError {}

fn wrong_type(field: &str, expected: &'static str) -> StateError {
    StateError::WrongType {
        field: field.to_string(),
        expected,
    }
}

pub fn state_field<'a>(state: &'a Value, field: &str) -> Result<&'a Value, StateError> {
    state
        .get(field)
        .ok_or_else(|| StateError::MissingField(field.to_string()))
}

pub fn state_u64(state: &Value, field: &str) -> Result<u64, StateError> {
    state_field(state, field)?
        .as_u64()
        .ok_or_else(|| wrong_type(field, "an unsigned integer"))
}

pub fn state_bool(state: &Value, field: &str) -> Result<bool, StateError> {
    state_field(state, field)?
        .as_bool()
        .ok_or_else(|| wrong_type(field, "a boolean"))
}

pub fn state_str<'a>(state: &'a Value, field: &str) -> Result<&'a str, StateError> {
    state_field(state, field)?
        .as_str()
        .ok_or_else(|| wrong_type(field, "a string"))
}

/// Array of integers, each within `min..=max`
pub fn state_int_list(
    state: &Value,
    field: &str,
    min: i64,
    max: i64,
) -> Result<Vec<i64>, StateError> {
    let items = state_field(state, field)?
        .as_array()
        .ok_or_else(|| wrong_type(field, "an array of integers"))?;
    items
        .iter()
        .map(|item| {
            let value = item
                .as_i64()
                .ok_or_else(|| wrong_type(field, "an array of integers"))?;
            if (min..=max).contains(&value) {
                Ok(value)
            } else {
                Err(StateError::OutOfRange {
                    field: field.to_string(),
                    value: value.to_string(),
                })
            }
        })
        .collect()
}

/// Serializable patch definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchDef {
    /// Schema version for forward compatibility
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub config: PatchConfig,
    pub modules: Vec<ModuleDef>,
    pub cables: Vec<CableDef>,
}

impl PatchDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: PATCH_VERSION,
            name: name.into(),
            config: PatchConfig::default(),
            modules: vec![],
            cables: vec![],
        }
    }

    pub fn with_config(mut self, config: PatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Default for PatchDef {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

/// Serializable module definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDef {
    /// Unique instance name
    pub name: String,
    pub module_type: String,
    /// Parameter values by parameter name
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
}

impl ModuleDef {
    pub fn new(name: impl Into<String>, module_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module_type: module_type.into(),
            params: BTreeMap::new(),
            state: None,
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn with_state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }
}

/// Serializable cable definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CableDef {
    /// Source: "module_name.port_name"
    pub from: String,
    /// Destination: "module_name.port_name"
    pub to: String,
    /// Optional gain (0.0 to 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attenuation: Option<f64>,
}

impl CableDef {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            attenuation: None,
        }
    }

    pub fn with_attenuation(mut self, attenuation: f64) -> Self {
        self.attenuation = Some(attenuation);
        self
    }
}

/// Builds a module from a sample rate and a random seed
pub type ModuleFactory = Box<dyn Fn(f64, u64) -> Box<dyn GraphModule> + Send + Sync>;

/// Metadata about a registered module type
#[derive(Debug, Clone)]
pub struct ModuleMetadata {
    pub type_id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub port_spec: PortSpec,
}

/// Registry of available module types for instantiation
pub struct ModuleRegistry {
    factories: HashMap<String, ModuleFactory>,
    metadata: HashMap<String, ModuleMetadata>,
}

impl ModuleRegistry {
    /// Registry holding every built-in module
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_builtin();
        registry
    }

    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    fn register_builtin(&mut self) {
        self.register_factory(
            "euclidean_rhythm",
            "Euclidean Rhythm",
            "Sequencers",
            "Three clocked Euclidean tracks with trigger, gate and envelope outputs",
            |sr, _| Box::new(EuclideanRhythm::new(sr)),
        );
        self.register_factory(
            "maddy",
            "Maddy",
            "Sequencers",
            "Internal clock, three chained Euclidean tracks and a CV step sequencer",
            |sr, _| Box::new(Maddy::new(sr)),
        );
        self.register_factory(
            "ad_generator",
            "AD Generator",
            "Envelopes",
            "Three AD/AHR envelopes with envelope followers",
            |sr, _| Box::new(AdGenerator::new(sr)),
        );
        self.register_factory(
            "ellen_ripley",
            "Ellen Ripley",
            "Effects",
            "Stereo granular delay and reverb with a chaotic modulator",
            |sr, seed| Box::new(EllenRipley::with_seed(sr, seed)),
        );
        self.register_factory(
            "sine_vco",
            "Sine VCO",
            "Oscillators",
            "Sine oscillator with a folded morphing output",
            |sr, _| Box::new(SineVco::new(sr)),
        );
        self.register_factory(
            "stereo_mixer",
            "Stereo Mixer",
            "Utilities",
            "Four-channel mixer with equal-power panning",
            |sr, _| Box::new(StereoMixer::new(sr)),
        );
    }

    /// Register a module factory with metadata
    pub fn register_factory<F>(
        &mut self,
        type_id: &str,
        name: &str,
        category: &str,
        description: &str,
        factory: F,
    ) where
        F: Fn(f64, u64) -> Box<dyn GraphModule> + Send + Sync + 'static,
    {
        // Get port spec from a temporary instance
        let port_spec = factory(44100.0, 0).port_spec().clone();

        self.factories
            .insert(type_id.to_string(), Box::new(factory));
        self.metadata.insert(
            type_id.to_string(),
            ModuleMetadata {
                type_id: type_id.to_string(),
                name: name.to_string(),
                category: category.to_string(),
                description: description.to_string(),
                port_spec,
            },
        );
    }

    /// Instantiate a module by type ID
    pub fn instantiate(
        &self,
        type_id: &str,
        sample_rate: f64,
        seed: u64,
    ) -> Option<Box<dyn GraphModule>> {
        self.factories.get(type_id).map(|f| f(sample_rate, seed))
    }

    pub fn list_modules(&self) -> impl Iterator<Item = &ModuleMetadata> {
        self.metadata.values()
    }

    pub fn get_metadata(&self, type_id: &str) -> Option<&ModuleMetadata> {
        self.metadata.get(type_id)
    }

    pub fn list_by_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a ModuleMetadata> {
        self.metadata
            .values()
            .filter(move |m| m.category == category)
    }

    /// Get all unique categories, sorted
    pub fn categories(&self) -> Vec<String> {
        let mut cats: Vec<_> = self.metadata.values().map(|m| m.category.clone()).collect();
        cats.sort();
        cats.dedup();
        cats
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Extension methods for Patch to support serialization
impl Patch {
    /// Convert patch to a serializable definition
    pub fn to_def(&self, name: &str) -> PatchDef {
        let modules = self
            .nodes()
            .map(|(_, node_name, module)| ModuleDef {
                name: node_name.to_string(),
                module_type: module.type_id().to_string(),
                params: module
                    .params()
                    .iter()
                    .filter_map(|def| Some((def.name.clone(), module.get_param(def.id)?)))
                    .collect(),
                state: module.serialize_state(),
            })
            .collect();

        let cables = self
            .cables()
            .iter()
            .filter_map(|cable| {
                let from = self.module(cable.from.node)?;
                let to = self.module(cable.to.node)?;
                let from_port = from.port_spec().output_by_id(cable.from.port)?;
                let to_port = to.port_spec().input_by_id(cable.to.port)?;
                Some(CableDef {
                    from: format!("{}.{}", self.get_name(cable.from.node)?, from_port.name),
                    to: format!("{}.{}", self.get_name(cable.to.node)?, to_port.name),
                    attenuation: cable.attenuation,
                })
            })
            .collect();

        PatchDef {
            version: PATCH_VERSION,
            name: name.to_string(),
            config: PatchConfig::new(self.sample_rate()),
            modules,
            cables,
        }
    }

    /// Restore one module's persisted state
    pub fn restore_state(&mut self, node: NodeId, state: &Value) -> Result<(), PatchError> {
        let name = self.get_name(node).unwrap_or_default().to_string();
        let module = self.module_mut(node).ok_or(PatchError::InvalidNode)?;
        module
            .deserialize_state(state)
            .map_err(|e| PatchError::State {
                module: name,
                message: e.to_string(),
            })
    }

    /// Build and compile a patch from a definition.
    ///
    /// The output is the module named `output`, or else the last module with
    /// a `left` output.
    pub fn from_def(def: &PatchDef, registry: &ModuleRegistry) -> Result<Self, PatchError> {
        let config = def.config;
        if !config.is_valid() {
            return Err(PatchError::InvalidConfig(format!(
                "sample rate {}",
                config.sample_rate
            )));
        }

        let mut patch = Patch::new(config.sample_rate);
        let mut handles: HashMap<&str, NodeHandle> = HashMap::new();

        for (index, module_def) in def.modules.iter().enumerate() {
            if handles.contains_key(module_def.name.as_str()) {
                return Err(PatchError::DuplicateModule(module_def.name.clone()));
            }
            let mut module = registry
                .instantiate(
                    &module_def.module_type,
                    config.sample_rate,
                    config.module_seed(index),
                )
                .ok_or_else(|| PatchError::UnknownModuleType(module_def.module_type.clone()))?;

            for (param, &value) in &module_def.params {
                let id = module.params().iter().find(|d| &d.name == param).map(|d| d.id);
                match id {
                    Some(id) => module.set_param(id, value),
                    None => warn!("{}: ignoring unknown parameter '{}'", module_def.name, param),
                }
            }

            let handle = patch.add_boxed(module_def.name.as_str(), module);
            if let Some(state) = &module_def.state {
                if let Err(e) = patch.restore_state(handle.id(), state) {
                    warn!("{}; keeping defaults", e);
                }
            }
            handles.insert(module_def.name.as_str(), handle);
        }

        for cable_def in &def.cables {
            let (from_module, from_port) = parse_port_ref(&cable_def.from)?;
            let (to_module, to_port) = parse_port_ref(&cable_def.to)?;
            let from = handles
                .get(from_module)
                .ok_or_else(|| PatchError::UnknownModule(from_module.to_string()))?
                .out(from_port)?;
            let to = handles
                .get(to_module)
                .ok_or_else(|| PatchError::UnknownModule(to_module.to_string()))?
                .in_(to_port)?;
            match cable_def.attenuation {
                Some(attenuation) => patch.connect_attenuated(from, to, attenuation)?,
                None => patch.connect(from, to)?,
            };
        }

        let output = handles.get("output").or_else(|| {
            def.modules.iter().rev().find_map(|m| {
                handles
                    .get(m.name.as_str())
                    .filter(|h| h.spec().output_by_name("left").is_some())
            })
        });
        if let Some(handle) = output {
            patch.set_output(handle.id())?;
        }

        patch.compile()?;
        info!(
            "loaded patch '{}': {} modules, {} cables at {} Hz",
            def.name,
            patch.node_count(),
            patch.cable_count(),
            config.sample_rate
        );
        Ok(patch)
    }
}

fn parse_port_ref(s: &str) -> Result<(&str, &str), PatchError> {
    match s.split_once('.') {
        Some((module, port)) if !module.is_empty() && !port.is_empty() => Ok((module, port)),
        _ => Err(PatchError::BadPortRef(s.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{ellen_ripley, maddy, sine_vco};
    use serde_json::json;

    #[test]
    fn test_state_helpers() {
        let state = json!({ "flag": true, "mode": 3, "name": "slow", "list": [1, 2, 9] });
        assert_eq!(state_bool(&state, "flag"), Ok(true));
        assert_eq!(state_u64(&state, "mode"), Ok(3));
        assert_eq!(state_str(&state, "name"), Ok("slow"));
        assert_eq!(
            state_bool(&state, "absent"),
            Err(StateError::MissingField("absent".to_string()))
        );
        assert!(matches!(
            state_u64(&state, "name"),
            Err(StateError::WrongType { .. })
        ));
        assert_eq!(state_int_list(&state, "list", 0, 9), Ok(vec![1, 2, 9]));
        assert_eq!(
            state_int_list(&state, "list", 0, 8),
            Err(StateError::OutOfRange {
                field: "list".to_string(),
                value: "9".to_string()
            })
        );
        assert!(matches!(
            state_int_list(&state, "flag", 0, 1),
            Err(StateError::WrongType { .. })
        ));
    }

    #[test]
    fn test_patch_def_json_defaults() {
        let def = PatchDef::from_json(
            r#"{ "version": 1, "name": "bare", "modules": [
                 { "name": "mix", "module_type": "stereo_mixer" } ], "cables": [] }"#,
        )
        .unwrap();
        assert_eq!(def.config, PatchConfig::default());
        assert!(def.modules[0].params.is_empty());
        assert!(def.modules[0].state.is_none());

        let json = def.to_json().unwrap();
        assert!(!json.contains("state"));
        assert_eq!(PatchDef::from_json(&json).unwrap().name, "bare");
    }

    #[test]
    fn test_registry_builtins() {
        let registry = ModuleRegistry::default();
        assert_eq!(registry.list_modules().count(), 6);
        for meta in registry.list_modules() {
            let module = registry.instantiate(&meta.type_id, 48000.0, 1).unwrap();
            assert_eq!(module.type_id(), meta.type_id);
        }
        assert_eq!(registry.list_by_category("Sequencers").count(), 2);
        assert_eq!(
            registry.categories(),
            vec!["Effects", "Envelopes", "Oscillators", "Sequencers", "Utilities"]
        );
        assert!(registry.instantiate("nope", 48000.0, 1).is_none());
    }

    fn voice_patch() -> Patch {
        let mut patch = Patch::new(48000.0);
        let vco = patch.add("vco", SineVco::new(48000.0));
        let fx = patch.add("fx", EllenRipley::new(48000.0));
        let mix = patch.add("mix", StereoMixer::new(48000.0));
        patch.set_param(vco.id(), sine_vco::TUNE, 440.0);
        patch.set_param(fx.id(), ellen_ripley::REVERB_MIX, 0.6);
        patch
            .connect(vco.out("sine").unwrap(), fx.in_("left").unwrap())
            .unwrap();
        patch
            .connect(fx.out("left").unwrap(), mix.in_("left1").unwrap())
            .unwrap();
        patch
            .connect_attenuated(fx.out("right").unwrap(), mix.in_("right1").unwrap(), 0.5)
            .unwrap();
        patch
    }

    #[test]
    fn test_patch_roundtrip() {
        let patch = voice_patch();
        let def = patch.to_def("voice");
        assert_eq!(def.modules.len(), 3);
        assert_eq!(def.cables.len(), 3);
        assert_eq!(def.config.sample_rate, 48000.0);
        assert_eq!(def.modules[0].params.get("tune"), Some(&440.0));

        let json = def.to_json().unwrap();
        let registry = ModuleRegistry::new();
        let mut loaded = Patch::from_def(&PatchDef::from_json(&json).unwrap(), &registry).unwrap();
        assert_eq!(loaded.node_count(), 3);
        assert_eq!(loaded.cable_count(), 3);

        let vco = loaded.find("vco").unwrap();
        assert_eq!(loaded.get_param(vco, sine_vco::TUNE), Some(440.0));
        let fx = loaded.find("fx").unwrap();
        assert_eq!(
            loaded.get_param(fx, ellen_ripley::REVERB_MIX),
            Some(0.6)
        );
        assert_eq!(loaded.cables()[2].attenuation, Some(0.5));

        // the mixer is the last module with a left output
        let mut heard = false;
        for _ in 0..4800 {
            let (l, r) = loaded.tick();
            assert!(l.is_finite() && r.is_finite());
            heard |= l.abs() > 0.1;
        }
        assert!(heard);
    }

    #[test]
    fn test_module_state_survives_reload() {
        let mut patch = Patch::new(44100.0);
        let seq = patch.add("seq", Maddy::new(44100.0));
        patch
            .restore_state(seq.id(), &json!({ "mode": 4, "chain": [1, 1, 0] }))
            .unwrap();

        let def = patch.to_def("seq");
        let loaded = Patch::from_def(&def, &ModuleRegistry::new()).unwrap();
        let node = loaded.find("seq").unwrap();
        let state = loaded.module(node).and_then(|m| m.serialize_state());
        assert_eq!(state, Some(json!({ "mode": 4, "chain": [1, 1, 0] })));
    }

    #[test]
    fn test_bad_state_is_skipped() {
        let mut def = PatchDef::new("bad state");
        def.modules.push(
            ModuleDef::new("seq", "maddy")
                .with_param("bpm", 90.0)
                .with_param("no_such_knob", 1.0)
                .with_state(json!({ "mode": 99, "chain": [0] })),
        );
        let patch = Patch::from_def(&def, &ModuleRegistry::new()).unwrap();
        let node = patch.find("seq").unwrap();
        assert_eq!(patch.get_param(node, maddy::BPM), Some(90.0));
        let state = patch.module(node).and_then(|m| m.serialize_state());
        assert_eq!(state, Some(json!({ "mode": 0, "chain": [0, 1, 2] })));

        let mut patch = patch;
        assert!(matches!(
            patch.restore_state(node, &json!({})),
            Err(PatchError::State { .. })
        ));
    }

    #[test]
    fn test_load_errors() {
        let registry = ModuleRegistry::new();

        let mut def = PatchDef::new("unknown type");
        def.modules.push(ModuleDef::new("x", "theremin"));
        assert_eq!(
            Patch::from_def(&def, &registry).err(),
            Some(PatchError::UnknownModuleType("theremin".to_string()))
        );

        let mut def = PatchDef::new("duplicate");
        def.modules.push(ModuleDef::new("a", "sine_vco"));
        def.modules.push(ModuleDef::new("a", "sine_vco"));
        assert!(matches!(
            Patch::from_def(&def, &registry),
            Err(PatchError::DuplicateModule(_))
        ));

        let mut def = PatchDef::new("cables");
        def.modules.push(ModuleDef::new("a", "sine_vco"));
        def.modules.push(ModuleDef::new("b", "stereo_mixer"));
        def.cables.push(CableDef::new("a", "b.left1"));
        assert!(matches!(
            Patch::from_def(&def, &registry),
            Err(PatchError::BadPortRef(_))
        ));
        def.cables[0] = CableDef::new("a.saw", "b.left1");
        assert!(matches!(
            Patch::from_def(&def, &registry),
            Err(PatchError::UnknownPort { .. })
        ));
        def.cables[0] = CableDef::new("c.sine", "b.left1");
        assert!(matches!(
            Patch::from_def(&def, &registry),
            Err(PatchError::UnknownModule(_))
        ));

        let def = PatchDef::new("rate").with_config(PatchConfig::new(0.0));
        assert!(matches!(
            Patch::from_def(&def, &registry),
            Err(PatchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_seeded_loads_are_reproducible() {
        let mut def = PatchDef::new("grains").with_config(PatchConfig::new(48000.0).with_seed(7));
        def.modules.push(ModuleDef::new("vco", "sine_vco"));
        def.modules.push(
            ModuleDef::new("fx", "ellen_ripley")
                .with_param("chaos_amount", 1.0)
                .with_param("grain_mix", 1.0)
                .with_state(json!({ "chaos_enabled": true })),
        );
        def.cables.push(CableDef::new("vco.sine", "fx.left"));

        let render = || -> Vec<(f64, f64)> {
            let mut patch = Patch::from_def(&def, &ModuleRegistry::new()).unwrap();
            (0..6000).map(|_| patch.tick()).collect()
        };
        assert_eq!(render(), render());
    }

    #[test]
    fn test_output_node_named_output() {
        let mut def = PatchDef::new("named");
        def.modules.push(ModuleDef::new("output", "stereo_mixer").with_param("master", 0.5));
        def.modules.push(ModuleDef::new("later", "stereo_mixer"));
        def.modules.push(ModuleDef::new("vco", "sine_vco"));
        def.cables.push(CableDef::new("vco.sine", "output.left1"));
        let mut patch = Patch::from_def(&def, &ModuleRegistry::new()).unwrap();
        let peak = (0..2000)
            .map(|_| patch.tick().0.abs())
            .fold(0.0, f64::max);
        assert!(peak > 1.0);
    }
}
