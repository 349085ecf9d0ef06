//! Fixed-duration sampling pass over a live capture stream.
//!
//! [`run_pass`] is the scheduler driving one measurement pass:
//!
//! ```text
//! loop until `duration` has elapsed:
//!     clock.sleep(interval)
//!     frames = stream.read()          ← audio captured since the last tick
//!     mono   = downmix(frames)
//!     LoudnessMeter::process(mono)    ← K-weighting → blocks
//!     track tick RMS (overall + per channel) and sample peak
//!     progress(ProgressEvent)
//! ```
//!
//! Ticks are strictly sequential: the progress callback of one tick returns
//! before the next delay starts.  A failing `read` is logged and counted but
//! does not abort the pass; a pass where no tick delivered audio is a
//! [`SamplerError::NoAudio`].

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::{BalanceConfig, LoudnessConfig};
use crate::host::{CaptureStream, Frames};

use super::balance::{analyze_balance, ChannelBalance};
use super::clock::Clock;
use super::level::{downmix, linear_to_db, peak, rms};
use super::loudness::LoudnessMeter;

// ---------------------------------------------------------------------------
// ProgressEvent
// ---------------------------------------------------------------------------

/// Emitted once per tick while a pass is running.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub elapsed_ms: u64,
    pub remaining_ms: u64,
    /// `remaining_ms` rounded up to whole seconds, for countdown displays.
    pub remaining_seconds: u64,
    /// RMS level of this tick, linear.
    pub level: f32,
    /// RMS level of this tick in dBFS.
    pub level_db: f64,
}

impl ProgressEvent {
    fn new(elapsed: Duration, duration: Duration, level: f32) -> Self {
        let remaining_ms = duration.saturating_sub(elapsed).as_millis() as u64;
        Self {
            elapsed_ms: elapsed.as_millis() as u64,
            remaining_ms,
            remaining_seconds: remaining_ms.div_ceil(1_000),
            level,
            level_db: linear_to_db(level),
        }
    }
}

/// Caller-supplied progress sink.
pub type ProgressFn = dyn Fn(&ProgressEvent) + Send + Sync;

// ---------------------------------------------------------------------------
// PassSettings / SamplerError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassSettings {
    pub duration: Duration,
    pub interval: Duration,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SamplerError {
    #[error("no audio was captured during the measurement ({failed} of {ticks} reads failed)")]
    NoAudio { ticks: usize, failed: usize },
}

// ---------------------------------------------------------------------------
// PassReport
// ---------------------------------------------------------------------------

/// Everything measured during one pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    /// Gated integrated loudness; `None` when the pass held no measurable signal.
    pub integrated_lufs: Option<f64>,
    /// Absolute-gated loudness (no relative gate).
    pub ungated_lufs: Option<f64>,
    /// Highest absolute sample value, linear.
    pub peak: f32,
    pub peak_db: f64,
    /// Mean of the per-tick RMS levels in dBFS.
    pub average_level_db: f64,
    pub ticks: usize,
    pub failed_ticks: usize,
    pub blocks: usize,
    /// Trailing samples that did not complete a loudness block.
    pub uncovered_samples: usize,
    /// Per-channel RMS level of every tick that delivered audio.
    pub channel_levels: Vec<Vec<f32>>,
}

impl PassReport {
    /// Balance of the first two channels; `None` for mono input.
    pub fn channel_balance(&self, config: &BalanceConfig) -> Option<ChannelBalance> {
        match self.channel_levels.as_slice() {
            [left, right, ..] => analyze_balance(left, right, config),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

struct Accumulator {
    meter: LoudnessMeter,
    peak: f32,
    level_db_sum: f64,
    audio_ticks: usize,
    ticks: usize,
    failed_ticks: usize,
    channel_levels: Vec<Vec<f32>>,
}

impl Accumulator {
    fn new(sample_rate: u32, channel_count: u16, loudness: &LoudnessConfig) -> Self {
        Self {
            meter: LoudnessMeter::new(sample_rate, loudness),
            peak: 0.0,
            level_db_sum: 0.0,
            audio_ticks: 0,
            ticks: 0,
            failed_ticks: 0,
            channel_levels: vec![Vec::new(); channel_count as usize],
        }
    }

    /// Fold one tick of audio in; returns the tick's RMS level.
    fn feed(&mut self, frames: &Frames) -> f32 {
        self.ticks += 1;
        if frames.is_empty() {
            return 0.0;
        }

        let mono = downmix(&frames.channels);
        self.meter.process(&mono);

        let level = rms(&mono);
        self.level_db_sum += linear_to_db(level);
        self.audio_ticks += 1;

        for (i, channel) in frames.channels.iter().enumerate() {
            self.peak = self.peak.max(peak(channel));
            if let Some(levels) = self.channel_levels.get_mut(i) {
                levels.push(rms(channel));
            }
        }
        level
    }

    fn fail(&mut self) {
        self.ticks += 1;
        self.failed_ticks += 1;
    }

    fn finish(self) -> Result<PassReport, SamplerError> {
        if self.audio_ticks == 0 {
            return Err(SamplerError::NoAudio {
                ticks: self.ticks,
                failed: self.failed_ticks,
            });
        }

        Ok(PassReport {
            integrated_lufs: self.meter.integrated(),
            ungated_lufs: self.meter.ungated(),
            peak: self.peak,
            peak_db: linear_to_db(self.peak),
            average_level_db: self.level_db_sum / self.audio_ticks as f64,
            ticks: self.ticks,
            failed_ticks: self.failed_ticks,
            blocks: self.meter.block_count(),
            uncovered_samples: self.meter.uncovered_samples(),
            channel_levels: self.channel_levels,
        })
    }
}

// ---------------------------------------------------------------------------
// run_pass
// ---------------------------------------------------------------------------

/// Sample `stream` every `settings.interval` until `settings.duration` has
/// elapsed on `clock`.
pub async fn run_pass(
    stream: &mut dyn CaptureStream,
    clock: &dyn Clock,
    settings: PassSettings,
    loudness: &LoudnessConfig,
    progress: Option<&ProgressFn>,
) -> Result<PassReport, SamplerError> {
    let info = stream.info();
    let mut acc = Accumulator::new(info.sample_rate, info.channel_count, loudness);

    // Discard whatever accumulated before the pass started.
    if let Err(e) = stream.read() {
        log::debug!("sampler: initial drain failed: {e}");
    }

    let start = clock.now();
    loop {
        clock.sleep(settings.interval).await;
        let elapsed = clock.now().saturating_sub(start);

        let level = match stream.read() {
            Ok(frames) => acc.feed(&frames),
            Err(e) => {
                log::warn!("sampler: tick {} read failed: {e}", acc.ticks);
                acc.fail();
                0.0
            }
        };

        if let Some(cb) = progress {
            cb(&ProgressEvent::new(elapsed, settings.duration, level));
        }

        if elapsed >= settings.duration {
            break;
        }
    }

    log::debug!(
        "sampler: pass finished after {} ticks ({} failed)",
        acc.ticks,
        acc.failed_ticks
    );
    acc.finish()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
