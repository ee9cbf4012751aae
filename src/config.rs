//! Patch-level configuration
//!
//! Settings that apply to a whole patch rather than to one module. They are
//! stored alongside the modules and cables in a [`PatchDef`](crate::serialize::PatchDef)
//! and can also be loaded on their own from JSON.

use serde::{Deserialize, Serialize};

pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    /// Sample rate in Hz
    pub sample_rate: f64,
    /// Base seed for module random generators. `None` seeds each module from
    /// OS entropy (with the `std` feature), so loads are not reproducible.
    pub seed: Option<u64>,
}

impl PatchConfig {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Whether the sample rate is usable
    pub fn is_valid(&self) -> bool {
        self.sample_rate.is_finite() && self.sample_rate >= 1.0
    }

    /// Seed for the module at `index` in load order
    pub fn module_seed(&self, index: usize) -> u64 {
        match self.seed {
            Some(seed) => seed ^ (index as u64 + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15),
            None => entropy_seed(),
        }
    }
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

#[cfg(feature = "std")]
fn entropy_seed() -> u64 {
    rand::random()
}

/// Without an entropy source every module shares one fixed seed
#[cfg(not(feature = "std"))]
fn entropy_seed() -> u64 {
    0x2545_f491_4f6c_dd1d
}
