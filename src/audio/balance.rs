//! Stereo channel balance and dead-channel detection.
//!
//! Many USB and XLR interfaces present a mono microphone on one side of a
//! stereo pair.  Downstream software that reads only the other side hears
//! silence.  [`analyze_balance`] compares the per-channel level samples
//! collected during a measurement pass and flags that situation.
//!
//! A channel is reported **dead** when either
//!
//! * the two average levels differ by more than `imbalance_db`, or
//! * one average sits below `noise_floor_dbfs` while the other is above
//!   `signal_dbfs` (an electrically idle input next to a speaking one,
//!   even if their difference is under `imbalance_db`).

use serde::Serialize;

use crate::config::BalanceConfig;

use super::level::linear_to_db;

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Left,
    Right,
}

impl Channel {
    pub fn label(&self) -> &'static str {
        match self {
            Channel::Left => "left",
            Channel::Right => "right",
        }
    }
}

// ---------------------------------------------------------------------------
// ChannelStats / ChannelBalance
// ---------------------------------------------------------------------------

/// Log-scale level statistics of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    pub average_db: f64,
    pub peak_db: f64,
}

impl ChannelStats {
    fn from_levels(levels: &[f32]) -> Self {
        let dbs = levels.iter().map(|&l| linear_to_db(l));
        let (sum, peak) = dbs.fold((0.0, f64::NEG_INFINITY), |(sum, peak), db| {
            (sum + db, peak.max(db))
        });
        Self {
            average_db: sum / levels.len() as f64,
            peak_db: peak,
        }
    }
}

/// Result of comparing the two channels of a stereo input.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelBalance {
    pub left: ChannelStats,
    pub right: ChannelStats,
    /// `|left.average_db − right.average_db|`.
    pub difference_db: f64,
    pub has_dead_channel: bool,
    /// The lower-level channel when `has_dead_channel` is set.
    pub dead_channel: Option<Channel>,
}

// ---------------------------------------------------------------------------
// analyze_balance
// ---------------------------------------------------------------------------

/// Compare two synchronised level sequences (linear, `0.0..=1.0`).
///
/// Returns `None` when either sequence is empty.  Sequences of unequal
/// length are compared over their common prefix.
///
/// # Example
///
/// ```rust
/// use mic_check::audio::balance::{analyze_balance, Channel};
/// use mic_check::config::BalanceConfig;
///
/// let left = vec![0.1_f32; 20];     // −20 dBFS
/// let right = vec![0.001_f32; 20];  // −60 dBFS
/// let balance = analyze_balance(&left, &right, &BalanceConfig::default()).unwrap();
/// assert!(balance.has_dead_channel);
/// assert_eq!(balance.dead_channel, Some(Channel::Right));
/// ```
pub fn analyze_balance(
    left: &[f32],
    right: &[f32],
    config: &BalanceConfig,
) -> Option<ChannelBalance> {
    let len = left.len().min(right.len());
    if len == 0 {
        return None;
    }

    let l = ChannelStats::from_levels(&left[..len]);
    let r = ChannelStats::from_levels(&right[..len]);
    let difference_db = (l.average_db - r.average_db).abs();

    let (quieter, louder, quieter_side) = if l.average_db < r.average_db {
        (l.average_db, r.average_db, Channel::Left)
    } else {
        (r.average_db, l.average_db, Channel::Right)
    };

    let imbalanced = difference_db > config.imbalance_db;
    let idle_next_to_active = quieter < config.noise_floor_dbfs && louder > config.signal_dbfs;
    let has_dead_channel = imbalanced || idle_next_to_active;

    Some(ChannelBalance {
        left: l,
        right: r,
        difference_db,
        has_dead_channel,
        dead_channel: has_dead_channel.then_some(quieter_side),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
