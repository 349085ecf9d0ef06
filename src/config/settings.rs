//! Calibration settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files.  Every numeric default
//! reproduces the reference calibration of the meter; change them only when
//! deliberately recalibrating.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// LoudnessConfig
// ---------------------------------------------------------------------------

/// Block segmentation and gating constants for integrated loudness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoudnessConfig {
    /// Length of one measurement block in milliseconds.
    pub block_ms: u32,
    /// Distance between consecutive block starts in milliseconds.  Must be
    /// smaller than `block_ms` (overlapping windows).
    pub hop_ms: u32,
    /// Blocks at or below this loudness (LUFS) are treated as silence.
    pub absolute_gate_lufs: f64,
    /// Blocks more than this many LU below the ungated average are dropped.
    pub relative_gate_lu: f64,
}

impl Default for LoudnessConfig {
    fn default() -> Self {
        Self {
            block_ms: 400,
            hop_ms: 100,
            absolute_gate_lufs: -70.0,
            relative_gate_lu: 10.0,
        }
    }
}

// ---------------------------------------------------------------------------
// BalanceConfig
// ---------------------------------------------------------------------------

/// Dead-channel thresholds for the stereo balance check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    /// Average-level difference (dB) above which one channel is considered dead.
    pub imbalance_db: f64,
    /// A channel averaging below this level (dBFS) sits at the noise floor.
    pub noise_floor_dbfs: f64,
    /// A channel averaging above this level (dBFS) carries real signal.
    pub signal_dbfs: f64,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            imbalance_db: 15.0,
            noise_floor_dbfs: -42.0,
            signal_dbfs: -35.0,
        }
    }
}

// ---------------------------------------------------------------------------
// SamplingConfig
// ---------------------------------------------------------------------------

/// Wall-clock timing of the measurement passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Length of the speech measurement pass in milliseconds.
    pub speech_duration_ms: u64,
    /// Length of the background-noise pass in milliseconds.
    pub noise_duration_ms: u64,
    /// Delay between two sampling ticks in milliseconds.
    pub interval_ms: u64,
}

impl SamplingConfig {
    pub fn speech_duration(&self) -> Duration {
        Duration::from_millis(self.speech_duration_ms)
    }

    pub fn noise_duration(&self) -> Duration {
        Duration::from_millis(self.noise_duration_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            speech_duration_ms: 10_000,
            noise_duration_ms: 3_000,
            interval_ms: 50,
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureConfig
// ---------------------------------------------------------------------------

/// Settings for the desktop capture host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Input device id; `None` means the system default.
    pub device: Option<String>,
    /// Seconds of audio retained between two reads before the oldest frames
    /// are overwritten.
    pub buffer_secs: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: None,
            buffer_secs: 2.0,
        }
    }
}

// ---------------------------------------------------------------------------
// AnalysisConfig
// ---------------------------------------------------------------------------

/// Thresholds applied to the speech pass besides loudness ratings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Peak level (dBFS) at or above which the input is reported as clipping.
    pub clipping_dbfs: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self { clipping_dbfs: -0.5 }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use mic_check::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// assert_eq!(config.loudness.block_ms, 400);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub loudness: LoudnessConfig,
    pub balance: BalanceConfig,
    pub sampling: SamplingConfig,
    pub capture: CaptureConfig,
    pub analysis: AnalysisConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
