//! Circular delay line
//!
//! Capacity is fixed at construction. Delay lengths are indices into that
//! buffer, so a sample-rate change only rescales the lengths callers ask for.

/// Fixed-capacity circular buffer of single-precision samples.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    /// Create a zeroed line holding `capacity` samples (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1)],
            write_pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Write a sample and advance the write head
    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    /// Read the sample written `delay` writes ago (0 is the latest).
    ///
    /// Delays at or beyond the capacity read silence.
    #[inline]
    pub fn read(&self, delay: usize) -> f32 {
        let size = self.buffer.len();
        if delay >= size {
            return 0.0;
        }
        self.buffer[(self.write_pos + size - delay - 1) % size]
    }

    /// Read with fractional delay using linear interpolation
    #[inline]
    pub fn read_interp(&self, delay: f32) -> f32 {
        if !(delay >= 0.0) {
            return self.read(0);
        }
        let whole = libm::floorf(delay);
        let frac = delay - whole;
        let index = whole as usize;
        let a = self.read(index);
        let b = self.read(index + 1);
        a + frac * (b - a)
    }

    /// Read at an absolute buffer position, wrapping in both directions and
    /// interpolating between neighbours
    #[inline]
    pub fn read_at(&self, position: f32) -> f32 {
        let size = self.buffer.len();
        if !position.is_finite() {
            return 0.0;
        }
        let wrapped = position.rem_euclid(size as f32);
        let whole = libm::floorf(wrapped);
        let frac = wrapped - whole;
        let i0 = (whole as usize) % size;
        let i1 = (i0 + 1) % size;
        self.buffer[i0] + frac * (self.buffer[i1] - self.buffer[i0])
    }

    /// Absolute index the next write lands on
    pub fn write_position(&self) -> usize {
        self.write_pos
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// Feedback comb with one-pole damping in the loop, reading `length` samples
/// back inside a [`DelayLine`].
#[derive(Debug, Clone)]
pub struct CombLine {
    line: DelayLine,
    length: usize,
    damping_state: f32,
}

impl CombLine {
    pub fn new(capacity: usize, length: usize) -> Self {
        let line = DelayLine::new(capacity);
        let length = length.clamp(1, line.capacity());
        Self {
            line,
            length,
            damping_state: 0.0,
        }
    }

    pub fn set_length(&mut self, length: usize) {
        self.length = length.clamp(1, self.line.capacity());
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// `lp += (out - lp) * damping`, write `input + lp * feedback`, return `out`
    #[inline]
    pub fn process(&mut self, input: f32, feedback: f32, damping: f32) -> f32 {
        let out = self.line.read(self.length - 1);
        self.damping_state += (out - self.damping_state) * damping;
        self.line.write(input + self.damping_state * feedback);
        out
    }

    /// Read `delay` samples back without disturbing the loop
    #[inline]
    pub fn tap(&self, delay: f32) -> f32 {
        self.line.read_interp(delay.clamp(0.0, (self.length - 1) as f32))
    }

    pub fn clear(&mut self) {
        self.line.clear();
        self.damping_state = 0.0;
    }
}

/// Schroeder allpass: `out = -in * 0.5 + delayed`, stores `in + delayed * 0.5`.
#[derive(Debug, Clone)]
pub struct AllpassLine {
    line: DelayLine,
    length: usize,
}

impl AllpassLine {
    pub fn new(capacity: usize, length: usize) -> Self {
        let line = DelayLine::new(capacity);
        let length = length.clamp(1, line.capacity());
        Self { line, length }
    }

    pub fn set_length(&mut self, length: usize) {
        self.length = length.clamp(1, self.line.capacity());
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let delayed = self.line.read(self.length - 1);
        self.line.write(input + delayed * 0.5);
        -input * 0.5 + delayed
    }

    pub fn clear(&mut self) {
        self.line.clear();
    }
}
