//! Bounded interleaved frame buffer between the capture callback and the
//! sampling scheduler.
//!
//! The audio callback appends interleaved samples; each sampler tick drains
//! everything captured since the previous tick as planar channels.  When the
//! reader falls behind, the **oldest** frames are overwritten so the buffer
//! always holds the most recent `capacity` frames.
//!
//! # Example
//!
//! ```rust
//! use mic_check::audio::FrameBuffer;
//!
//! let mut buf = FrameBuffer::new(2, 3);
//! buf.push_interleaved(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8]); // 4 frames → oldest dropped
//! assert_eq!(buf.drain_planar(), vec![vec![0.3, 0.5, 0.7], vec![0.4, 0.6, 0.8]]);
//! ```

use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// FrameBuffer
// ---------------------------------------------------------------------------

/// A fixed-capacity FIFO of interleaved `f32` frames.
pub struct FrameBuffer {
    samples: VecDeque<f32>,
    channels: usize,
    /// Capacity in frames.
    capacity: usize,
    /// Frames discarded because the reader fell behind.
    overwritten: u64,
}

impl FrameBuffer {
    /// Create a buffer holding up to `capacity` frames of `channels` samples.
    ///
    /// # Panics
    ///
    /// Panics if `channels == 0` or `capacity == 0`.
    pub fn new(channels: u16, capacity: usize) -> Self {
        assert!(channels > 0, "FrameBuffer needs at least one channel");
        assert!(capacity > 0, "FrameBuffer capacity must be > 0");
        let channels = channels as usize;
        Self {
            samples: VecDeque::with_capacity(capacity * channels),
            channels,
            capacity,
            overwritten: 0,
        }
    }

    /// Sized to hold `secs` seconds at `sample_rate`.
    pub fn with_duration(channels: u16, sample_rate: u32, secs: f32) -> Self {
        let frames = (sample_rate as f32 * secs).ceil().max(1.0) as usize;
        Self::new(channels, frames)
    }

    /// Append interleaved samples.  A trailing partial frame is dropped.
    pub fn push_interleaved(&mut self, data: &[f32]) {
        let whole = data.len() - data.len() % self.channels;
        self.samples.extend(&data[..whole]);

        let limit = self.capacity * self.channels;
        if self.samples.len() > limit {
            let excess = self.samples.len() - limit;
            self.samples.drain(..excess);
            self.overwritten += (excess / self.channels) as u64;
        }
    }

    /// Remove every stored frame, returning one `Vec` per channel in
    /// chronological order.
    pub fn drain_planar(&mut self) -> Vec<Vec<f32>> {
        let frames = self.len();
        let mut planar = vec![Vec::with_capacity(frames); self.channels];
        for (i, sample) in self.samples.drain(..).enumerate() {
            planar[i % self.channels].push(sample);
        }
        planar
    }

    /// Stored frames.
    pub fn len(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn channels(&self) -> u16 {
        self.channels as u16
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames lost to overflow since the previous call.
    pub fn take_overwritten(&mut self) -> u64 {
        std::mem::take(&mut self.overwritten)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
