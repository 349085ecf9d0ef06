//! Qualitative ratings for numeric audio metrics.
//!
//! | Table | Good | Marginal | Direction |
//! |-------|------|----------|-----------|
//! | [`RatingTable::LoudnessAgc`] | ≥ −40 LUFS | ≥ −50 LUFS | higher is better |
//! | [`RatingTable::LoudnessRaw`] | ≥ −30 LUFS | ≥ −40 LUFS | higher is better |
//! | [`RatingTable::SignalToNoise`] | ≥ 20 LU | ≥ 10 LU | higher is better |
//! | [`RatingTable::NoiseFloor`] | ≤ −60 LUFS | ≤ −45 LUFS | lower is better |
//!
//! The two loudness tables are **not** interchangeable.  A stream with
//! automatic gain control has already been levelled upstream and is judged
//! with the looser `LoudnessAgc` bands; an unprocessed stream must use
//! `LoudnessRaw`.  Picking the wrong one yields a plausible but misleading
//! rating, so select through [`RatingTable::loudness_for`].
//!
//! `LoudnessRaw` rates speech only.  The raw noise-floor pass is rated with
//! `NoiseFloor` instead: a quiet background must come out good, and a
//! higher-is-better loudness table would call it poor.

use serde::Serialize;

// ---------------------------------------------------------------------------
// Rating
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Poor,
    Marginal,
    Good,
}

impl Rating {
    pub fn label(&self) -> &'static str {
        match self {
            Rating::Good => "good",
            Rating::Marginal => "marginal",
            Rating::Poor => "poor",
        }
    }
}

// ---------------------------------------------------------------------------
// RatingTable
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RatingTable {
    /// Speech loudness of a stream with automatic gain control active.
    LoudnessAgc,
    /// Speech loudness of an unprocessed stream.
    LoudnessRaw,
    /// Speech loudness minus background loudness.
    SignalToNoise,
    /// Background loudness with nobody speaking.
    NoiseFloor,
}

impl RatingTable {
    /// Loudness table matching the processing state of the rated stream.
    pub fn loudness_for(auto_gain_control: bool) -> Self {
        if auto_gain_control {
            RatingTable::LoudnessAgc
        } else {
            RatingTable::LoudnessRaw
        }
    }

    /// `(good, marginal)` band edges of the table.
    pub fn thresholds(&self) -> (f64, f64) {
        match self {
            RatingTable::LoudnessAgc => (-40.0, -50.0),
            RatingTable::LoudnessRaw => (-30.0, -40.0),
            RatingTable::SignalToNoise => (20.0, 10.0),
            RatingTable::NoiseFloor => (-60.0, -45.0),
        }
    }

    fn higher_is_better(&self) -> bool {
        !matches!(self, RatingTable::NoiseFloor)
    }

    /// Rate `value` against this table.
    ///
    /// ```rust
    /// use mic_check::audio::{Rating, RatingTable};
    ///
    /// assert_eq!(RatingTable::SignalToNoise.rate(25.0), Rating::Good);
    /// assert_eq!(RatingTable::SignalToNoise.rate(12.0), Rating::Marginal);
    /// assert_eq!(RatingTable::NoiseFloor.rate(-30.0), Rating::Poor);
    /// ```
    pub fn rate(&self, value: f64) -> Rating {
        let (good, marginal) = self.thresholds();
        let at_least = |edge: f64| {
            if self.higher_is_better() {
                value >= edge
            } else {
                value <= edge
            }
        };

        if at_least(good) {
            Rating::Good
        } else if at_least(marginal) {
            Rating::Marginal
        } else {
            Rating::Poor
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
