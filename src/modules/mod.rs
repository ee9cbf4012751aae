//! Patchable modules
//!
//! Each module wraps the primitives in [`crate::dsp`] behind the
//! [`GraphModule`](crate::port::GraphModule) interface: a port table, a
//! parameter table, a per-sample `tick`, and a small persisted state where
//! the module has one.
//!
//! | type id            | module                 |
//! | ------------------ | ---------------------- |
//! | `euclidean_rhythm` | [`EuclideanRhythm`]    |
//! | `maddy`            | [`Maddy`]              |
//! | `ad_generator`     | [`AdGenerator`]        |
//! | `ellen_ripley`     | [`EllenRipley`]        |
//! | `sine_vco`         | [`SineVco`]            |
//! | `stereo_mixer`     | [`StereoMixer`]        |

pub mod ad_generator;
pub mod ellen_ripley;
pub mod euclidean_rhythm;
pub mod maddy;
pub mod sine_vco;
pub mod stereo_mixer;
pub mod track;

pub use ad_generator::{AdGenerator, AttackPreset};
pub use ellen_ripley::EllenRipley;
pub use euclidean_rhythm::EuclideanRhythm;
pub use maddy::{Maddy, SequencerMode};
pub use sine_vco::SineVco;
pub use stereo_mixer::StereoMixer;
pub use track::{EuclideanTrack, TrackFrame, TrackSettings};
