//! Gated integrated loudness (BS.1770 style) over a streaming input.
//!
//! ## Algorithm
//!
//! 1. K-weight the input ([`KWeighting`]).
//! 2. Cut it into overlapping 400 ms blocks ([`BlockCollector`]).
//! 3. Convert each block energy to loudness: `L = -0.691 + 10·log10(energy)`.
//! 4. **Absolute gate**: drop blocks at or below −70 LUFS.
//! 5. **Relative gate**: drop blocks more than 10 LU below the average of
//!    the blocks that passed step 4.
//! 6. The loudness of the mean energy of the remaining blocks is the
//!    integrated loudness.
//!
//! When no block survives, the result is `None`: the pass contained no
//! measurable signal.  `None` must never be fed into a rating table.

use crate::config::LoudnessConfig;

use super::blocks::BlockCollector;
use super::weighting::KWeighting;

/// Offset between block energy in dB and LUFS.
pub const LUFS_OFFSET: f64 = -0.691;

/// Loudness (LUFS) of a block energy.  Zero energy maps to `-inf`.
pub fn energy_to_lufs(energy: f64) -> f64 {
    LUFS_OFFSET + 10.0 * energy.log10()
}

/// Block energy corresponding to a loudness in LUFS.
pub fn lufs_to_energy(lufs: f64) -> f64 {
    10.0_f64.powf((lufs - LUFS_OFFSET) / 10.0)
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// The two gate thresholds applied to block energies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gate {
    /// Absolute threshold in LUFS.
    pub absolute_lufs: f64,
    /// Relative margin in LU below the absolute-gated average.
    pub relative_lu: f64,
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            absolute_lufs: -70.0,
            relative_lu: 10.0,
        }
    }
}

impl From<&LoudnessConfig> for Gate {
    fn from(cfg: &LoudnessConfig) -> Self {
        Self {
            absolute_lufs: cfg.absolute_gate_lufs,
            relative_lu: cfg.relative_gate_lu,
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

impl Gate {
    /// Energies of the blocks above the absolute gate.
    fn absolute_survivors(&self, energies: &[f64]) -> Vec<f64> {
        let threshold = lufs_to_energy(self.absolute_lufs);
        energies.iter().copied().filter(|&e| e > threshold).collect()
    }

    /// Loudness of the blocks above the absolute gate only.
    ///
    /// Used for background-noise measurement, where the relative gate would
    /// discard exactly the blocks of interest.
    pub fn ungated_loudness(&self, energies: &[f64]) -> Option<f64> {
        mean(&self.absolute_survivors(energies)).map(energy_to_lufs)
    }

    /// Integrated loudness after both gates, or `None` when nothing survives.
    ///
    /// ```rust
    /// use mic_check::audio::loudness::{lufs_to_energy, Gate};
    ///
    /// let gate = Gate::default();
    /// let speech = lufs_to_energy(-23.0);
    /// let noise = lufs_to_energy(-50.0);
    ///
    /// // The noise block falls under the relative gate.
    /// let lufs = gate.integrated_loudness(&[speech, speech, noise]).unwrap();
    /// assert!((lufs + 23.0).abs() < 1e-9);
    ///
    /// assert_eq!(gate.integrated_loudness(&[0.0, 0.0]), None);
    /// ```
    pub fn integrated_loudness(&self, energies: &[f64]) -> Option<f64> {
        let survivors = self.absolute_survivors(energies);
        let ungated = energy_to_lufs(mean(&survivors)?);

        let threshold = lufs_to_energy(ungated - self.relative_lu);
        let gated: Vec<f64> = survivors.into_iter().filter(|&e| e > threshold).collect();

        mean(&gated).map(energy_to_lufs)
    }
}

// ---------------------------------------------------------------------------
// LoudnessMeter
// ---------------------------------------------------------------------------

/// Streaming meter: weighting → blocks → gating.
///
/// Feed mono samples with [`process`](Self::process) for the duration of a
/// pass, then read [`integrated`](Self::integrated).
///
/// # Example
///
/// ```rust
/// use mic_check::audio::LoudnessMeter;
/// use mic_check::config::LoudnessConfig;
///
/// let mut meter = LoudnessMeter::new(48_000, &LoudnessConfig::default());
/// meter.process(&vec![0.0_f32; 48_000]);
/// assert_eq!(meter.integrated(), None); // silence
/// ```
#[derive(Debug, Clone)]
pub struct LoudnessMeter {
    weighting: KWeighting,
    collector: BlockCollector,
    gate: Gate,
    scratch: Vec<f64>,
}

impl LoudnessMeter {
    pub fn new(sample_rate: u32, config: &LoudnessConfig) -> Self {
        Self {
            weighting: KWeighting::new(sample_rate),
            collector: BlockCollector::from_durations(sample_rate, config.block_ms, config.hop_ms),
            gate: Gate::from(config),
            scratch: Vec::new(),
        }
    }

    /// Weight and accumulate `samples`.
    pub fn process(&mut self, samples: &[f32]) {
        self.scratch.resize(samples.len(), 0.0);
        self.weighting.process(samples, &mut self.scratch);
        self.collector.push(&self.scratch);
    }

    /// Gated integrated loudness of everything processed so far.
    pub fn integrated(&self) -> Option<f64> {
        self.gate.integrated_loudness(&self.collector.energies())
    }

    /// Absolute-gated loudness of everything processed so far.
    pub fn ungated(&self) -> Option<f64> {
        self.gate.ungated_loudness(&self.collector.energies())
    }

    /// Number of complete blocks collected.
    pub fn block_count(&self) -> usize {
        self.collector.blocks().len()
    }

    /// Trailing samples discarded because they never filled a block.
    pub fn uncovered_samples(&self) -> usize {
        self.collector.uncovered_samples()
    }

    /// Start a new pass: clears filter memory and collected blocks.
    pub fn reset(&mut self) {
        self.weighting.reset();
        self.collector.reset();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
