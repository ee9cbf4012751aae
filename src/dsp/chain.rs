//! Chained track sequencing
//!
//! A chain plays up to four tracks one after another. Each slot stays active
//! for one full cycle of its track, measured in external clock edges, then
//! hands over to the next slot (wrapping). Slots may repeat a track.

/// Maximum number of chain slots
pub const MAX_SLOTS: usize = 4;

/// Number of external clock edges one full cycle of a track lasts:
/// `length * division / multiplication`, at least 1.
#[inline]
pub fn track_cycle_clock(length: usize, division: u32, multiplication: u32) -> u64 {
    let cycle = (length as u64 * division as u64) / multiplication.max(1) as u64;
    cycle.max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainedSequencer {
    slots: [usize; MAX_SLOTS],
    slot_count: usize,
    current_index: usize,
    global_ticks: u64,
    slot_start_tick: u64,
}

impl ChainedSequencer {
    pub fn new() -> Self {
        Self {
            slots: [0; MAX_SLOTS],
            slot_count: 0,
            current_index: 0,
            global_ticks: 0,
            slot_start_tick: 0,
        }
    }

    /// Replace the chain; anything past [`MAX_SLOTS`] is dropped
    pub fn set_slots(&mut self, tracks: &[usize]) {
        self.slot_count = tracks.len().min(MAX_SLOTS);
        self.slots[..self.slot_count].copy_from_slice(&tracks[..self.slot_count]);
        if self.current_index >= self.slot_count {
            self.current_index = 0;
        }
    }

    pub fn slots(&self) -> &[usize] {
        &self.slots[..self.slot_count]
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Track index of the active slot, `None` for an empty chain
    pub fn current_track(&self) -> Option<usize> {
        self.slots().get(self.current_index).copied()
    }

    pub fn global_ticks(&self) -> u64 {
        self.global_ticks
    }

    /// Register one external clock edge.
    ///
    /// `cycle_clocks[t]` is the cycle length of track `t` in edges. A slot
    /// naming a track outside that table lasts one edge. Returns true when the
    /// chain moved on to the next slot on this edge.
    pub fn clock(&mut self, cycle_clocks: &[u64]) -> bool {
        let mut transitioned = false;
        if let Some(track) = self.current_track() {
            let cycle = cycle_clocks.get(track).copied().unwrap_or(1).max(1);
            if self.global_ticks - self.slot_start_tick >= cycle {
                self.current_index = (self.current_index + 1) % self.slot_count;
                self.slot_start_tick = self.global_ticks;
                transitioned = true;
            }
        }
        self.global_ticks += 1;
        transitioned
    }

    /// Active track's value from `values`, or silence for an empty chain or a
    /// track outside the table
    #[inline]
    pub fn output(&self, values: &[f32]) -> f32 {
        self.current_track()
            .and_then(|track| values.get(track).copied())
            .unwrap_or(0.0)
    }

    /// Back to the first slot with the tick counter cleared
    pub fn reset(&mut self) {
        self.current_index = 0;
        self.global_ticks = 0;
        self.slot_start_tick = 0;
    }
}

impl Default for ChainedSequencer {
    fn default() -> Self {
        Self::new()
    }
}
