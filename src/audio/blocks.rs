//! Overlapping measurement blocks over a weighted sample stream.
//!
//! [`BlockCollector`] receives K-weighted samples in arbitrarily sized
//! pieces and emits one [`AudioBlock`] every `hop_len` samples once a full
//! `block_len` window is available.  With the default 400 ms block and
//! 100 ms hop, consecutive blocks overlap by 75 %.
//!
//! ## Truncation
//!
//! Every block holds exactly `block_len` samples.  Samples at the end of a
//! pass that never complete a block are **discarded**, not padded or
//! interpolated; [`BlockCollector::uncovered_samples`] reports how many.

use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// AudioBlock
// ---------------------------------------------------------------------------

/// One fixed-length window of weighted samples, reduced to its energy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioBlock {
    /// Mean of the squared weighted samples in the window.
    pub energy: f64,
}

// ---------------------------------------------------------------------------
// BlockCollector
// ---------------------------------------------------------------------------

/// Segments a continuous stream into overlapping fixed-length blocks.
///
/// # Example
///
/// ```rust
/// use mic_check::audio::BlockCollector;
///
/// // 4-sample blocks, 2-sample hop
/// let mut collector = BlockCollector::new(4, 2);
/// collector.push(&[1.0, 1.0, 1.0, 1.0, 0.0, 0.0]);
/// assert_eq!(collector.blocks().len(), 2);
/// assert_eq!(collector.blocks()[0].energy, 1.0);
/// assert_eq!(collector.blocks()[1].energy, 0.5);
/// ```
#[derive(Debug, Clone)]
pub struct BlockCollector {
    block_len: usize,
    hop_len: usize,
    /// Squared samples not yet consumed by a hop.
    window: VecDeque<f64>,
    blocks: Vec<AudioBlock>,
    total_samples: usize,
}

impl BlockCollector {
    /// Create a collector producing `block_len`-sample blocks every
    /// `hop_len` samples.
    ///
    /// # Panics
    ///
    /// Panics unless `0 < hop_len <= block_len`.
    pub fn new(block_len: usize, hop_len: usize) -> Self {
        assert!(
            hop_len > 0 && hop_len <= block_len,
            "hop_len must be in 1..=block_len"
        );
        Self {
            block_len,
            hop_len,
            window: VecDeque::with_capacity(block_len),
            blocks: Vec::new(),
            total_samples: 0,
        }
    }

    /// Build a collector from millisecond durations at `sample_rate` Hz.
    pub fn from_durations(sample_rate: u32, block_ms: u32, hop_ms: u32) -> Self {
        let to_samples = |ms: u32| ((sample_rate as u64 * ms as u64) / 1_000).max(1) as usize;
        let block_len = to_samples(block_ms);
        let hop_len = to_samples(hop_ms).min(block_len);
        Self::new(block_len, hop_len)
    }

    /// Append weighted samples, emitting every block they complete.
    pub fn push(&mut self, weighted: &[f64]) {
        for &s in weighted {
            self.window.push_back(s * s);
            self.total_samples += 1;

            if self.window.len() == self.block_len {
                let energy = self.window.iter().sum::<f64>() / self.block_len as f64;
                self.blocks.push(AudioBlock { energy });
                self.window.drain(..self.hop_len);
            }
        }
    }

    /// Blocks emitted so far, in stream order.
    pub fn blocks(&self) -> &[AudioBlock] {
        &self.blocks
    }

    /// Block energies, in stream order.
    pub fn energies(&self) -> Vec<f64> {
        self.blocks.iter().map(|b| b.energy).collect()
    }

    pub fn block_len(&self) -> usize {
        self.block_len
    }

    pub fn hop_len(&self) -> usize {
        self.hop_len
    }

    /// Total samples pushed since construction or the last reset.
    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    /// Trailing samples that are not part of any emitted block.
    pub fn uncovered_samples(&self) -> usize {
        let covered = match self.blocks.len() {
            0 => 0,
            n => (n - 1) * self.hop_len + self.block_len,
        };
        self.total_samples - covered
    }

    /// Drop all blocks and buffered samples.
    pub fn reset(&mut self) {
        self.window.clear();
        self.blocks.clear();
        self.total_samples = 0;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
