//! Granular processor
//!
//! Input is recorded continuously into an 8192-sample ring. A density-driven
//! phase accumulator spawns grains that replay short Hann-windowed slices of
//! that history, optionally reversed or repitched when chaos is enabled.

use super::delay::DelayLine;
use crate::rng::Rng;
use libm::Libm;
use std::f32::consts::TAU;

/// Length of the recording ring in samples
pub const BUFFER_SIZE: usize = 8192;

/// Maximum number of simultaneous grains
pub const MAX_GRAINS: usize = 16;

/// Shortest grain in samples
const MIN_GRAIN_SAMPLES: f32 = 16.0;

/// How far chaos can push the read position, as a fraction of the buffer
const POSITION_JITTER: f32 = 0.2;

#[derive(Debug, Clone, Copy, Default)]
struct Grain {
    active: bool,
    position: f32,
    size: f32,
    envelope: f32,
    direction: f32,
    pitch: f32,
}

impl Grain {
    #[inline]
    fn window(&self) -> f32 {
        let phase = self.envelope / self.size;
        0.5 * (1.0 - Libm::<f32>::cos(TAU * phase))
    }
}

/// Per-sample controls for [`GrainProcessor::process`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainSettings {
    /// Grain length in seconds
    pub size: f32,
    /// 0–1, mapped to `density * 50 + 1` grains per second
    pub density: f32,
    /// 0–1, how far back in the buffer grains start
    pub position: f32,
    /// 0–1 amount of position/direction/pitch randomisation
    pub chaos: f32,
    pub chaos_enabled: bool,
}

impl Default for GrainSettings {
    fn default() -> Self {
        Self {
            size: 0.05,
            density: 0.5,
            position: 0.25,
            chaos: 0.0,
            chaos_enabled: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GrainProcessor {
    buffer: DelayLine,
    grains: [Grain; MAX_GRAINS],
    phase: f32,
    sample_rate: f32,
    rng: Rng,
}

impl GrainProcessor {
    pub fn new(sample_rate: f32, seed: u64) -> Self {
        Self {
            buffer: DelayLine::new(BUFFER_SIZE),
            grains: [Grain::default(); MAX_GRAINS],
            phase: 0.0,
            sample_rate: sample_rate.max(1.0),
            rng: Rng::from_seed(seed),
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate.max(1.0);
    }

    pub fn active_count(&self) -> usize {
        self.grains.iter().filter(|g| g.active).count()
    }

    fn spawn(&mut self, settings: &GrainSettings) {
        let Some(slot) = self.grains.iter().position(|g| !g.active) else {
            return;
        };

        let chaos = if settings.chaos_enabled {
            settings.chaos.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let jitter = self.rng.next_f32_bipolar() * chaos * POSITION_JITTER;
        let position = (settings.position + jitter).clamp(0.0, 1.0);

        let (direction, pitch) = if settings.chaos_enabled {
            let direction = if self.rng.chance(chaos * 0.3) { -1.0 } else { 1.0 };
            let pitch = if self.rng.chance(chaos * 0.2) {
                if self.rng.chance(0.5) {
                    0.5
                } else {
                    2.0
                }
            } else {
                1.0
            };
            (direction, pitch)
        } else {
            (1.0, 1.0)
        };

        let max_size = (BUFFER_SIZE / 2) as f32;
        let size = (settings.size * self.sample_rate).clamp(MIN_GRAIN_SAMPLES, max_size);
        let span = (BUFFER_SIZE - 1) as f32;
        let start = self.buffer.write_position() as f32 - 1.0 - position * span;

        self.grains[slot] = Grain {
            active: true,
            position: start,
            size,
            envelope: 0.0,
            direction,
            pitch,
        };
    }

    /// Record `input`, spawn grains as the density clock wraps, and return the
    /// mix of all active grains
    pub fn process(&mut self, input: f32, settings: &GrainSettings) -> f32 {
        self.buffer.write(if input.is_finite() { input } else { 0.0 });

        let density = settings.density.clamp(0.0, 1.0);
        self.phase += (density * 50.0 + 1.0) / self.sample_rate;
        if self.phase >= 1.0 {
            self.phase -= libm::floorf(self.phase);
            self.spawn(settings);
        }

        let mut sum = 0.0;
        let mut active = 0usize;
        for grain in self.grains.iter_mut().filter(|g| g.active) {
            sum += self.buffer.read_at(grain.position) * grain.window();
            active += 1;
            grain.position += grain.direction * grain.pitch;
            grain.envelope += 1.0;
            if grain.envelope / grain.size >= 1.0 {
                grain.active = false;
            }
        }

        if active == 0 {
            return 0.0;
        }
        sum / Libm::<f32>::sqrt(active as f32)
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.grains = [Grain::default(); MAX_GRAINS];
        self.phase = 0.0;
    }
}
