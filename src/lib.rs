//! # Voltmod: Eurorack-Style DSP Modules
//!
//! `voltmod` implements a small family of Eurorack modules as per-sample DSP
//! and patches them together in a runtime-configurable graph.
//!
//! ## Architecture
//!
//! The library is organized in three layers:
//!
//! - **Layer 1: DSP Primitives** ([`dsp`]) - Euclidean patterns, clock division,
//!   curved envelopes, filters, delays, grains, reverb, chaos and oscillators
//! - **Layer 2: Port System** ([`port`]) - Signal conventions, port and parameter
//!   definitions, and the type-erased [`GraphModule`](port::GraphModule) interface
//! - **Layer 3: Patch Graph** ([`graph`], [`serialize`]) - Named modules, cables,
//!   topological execution and JSON persistence
//!
//! The modules themselves live in [`modules`]: two Euclidean sequencers, a
//! triple AD envelope, a granular/reverb/chaos effect, a sine VCO and a stereo
//! mixer.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use voltmod::prelude::*;
//!
//! # fn main() -> Result<(), PatchError> {
//! let mut patch = Patch::new(48000.0);
//!
//! let vco = patch.add("vco", SineVco::new(48000.0));
//! let fx = patch.add("fx", EllenRipley::new(48000.0));
//! let mix = patch.add("mix", StereoMixer::new(48000.0));
//!
//! patch.connect(vco.out("sine")?, fx.in_("left")?)?;
//! patch.connect(fx.out("left")?, mix.in_("left1")?)?;
//! patch.connect(fx.out("right")?, mix.in_("right1")?)?;
//!
//! patch.set_output(mix.id())?;
//! patch.compile()?;
//!
//! let (left, right) = patch.tick();
//! # let _ = (left, right);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dsp;
pub mod graph;
pub mod modules;
pub mod port;
pub mod rng;
pub mod serialize;
pub mod trigger;

/// Prelude module for convenient imports
pub mod prelude {
    // Layer 2: Port System
    pub use crate::port::{
        GraphModule, ParamBank, ParamDef, ParamId, ParamRange, ParamUnit, PortDef, PortId,
        PortSpec, PortValues, SignalKind,
    };

    // Layer 3: Patch Graph
    pub use crate::graph::{Cable, CableId, NodeHandle, NodeId, Patch, PatchError, PortRef};

    // Modules
    pub use crate::modules::{
        AdGenerator, AttackPreset, EllenRipley, EuclideanRhythm, Maddy, SequencerMode, SineVco,
        StereoMixer,
    };

    // Triggers and randomness
    pub use crate::rng::Rng;
    pub use crate::trigger::{PulseGenerator, SchmittTrigger};

    // Configuration and serialization
    pub use crate::config::PatchConfig;
    pub use crate::serialize::{
        CableDef, ModuleDef, ModuleMetadata, ModuleRegistry, PatchDef, StateError,
    };
}

// Re-export key types at crate root for convenience
pub use prelude::*;
