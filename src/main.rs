//! mic-check entry point.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk; on first run, write the defaults so
//!    the calibration constants can be edited.
//! 3. Create a current-thread [`tokio`] runtime.
//! 4. Wire the `cpal` desktop host into a [`UnitEnv`].
//! 5. Run every diagnostic, logging progress while measuring.
//! 6. Print the results table as JSON and exit non-zero on failure.
//!
//! Usage: `mic-check [DEVICE]`.  `DEVICE` is an input device name as shown
//! in the `device-enumeration` details; the configured or host default
//! device is used when it is omitted.

use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use mic_check::{
    audio::{ProgressEvent, TokioClock},
    config::{AppConfig, AppPaths},
    diagnostics::{Orchestrator, OverallStatus, UnitEnv},
    host::desktop::DesktopHost,
};

/// Logs the countdown once per second instead of once per tick.
fn progress_logger() -> impl Fn(&ProgressEvent) + Send + Sync {
    let last = AtomicU64::new(u64::MAX);
    move |event: &ProgressEvent| {
        if last.swap(event.remaining_seconds, Ordering::Relaxed) != event.remaining_seconds {
            log::info!(
                "measuring: {}s left, level {:.1} dBFS",
                event.remaining_seconds,
                event.level_db
            );
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("mic-check starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    let settings_file = AppPaths::new().settings_file;
    if !settings_file.exists() {
        match config.save() {
            Ok(()) => log::info!("Wrote default settings to {}", settings_file.display()),
            Err(e) => log::warn!("Could not write default settings ({e})"),
        }
    }
    let device = std::env::args().nth(1).or_else(|| config.capture.device.clone());

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4. Host and unit environment
    let env = UnitEnv {
        host: DesktopHost::services(&config.capture),
        config,
        clock: Arc::new(TokioClock::new()),
        progress: Some(Arc::new(progress_logger())),
    };

    // 5. Run
    let mut orchestrator = Orchestrator::with_default_units(env).on_update(|table| {
        log::debug!("overall status: {}", table.overall_status().label());
    });
    orchestrator.select_device(device);
    let results = rt.block_on(orchestrator.run());

    // 6. Report
    let report = serde_json::to_string_pretty(results).context("failed to serialize results")?;
    println!("{report}");

    Ok(match results.overall_status() {
        OverallStatus::Fail | OverallStatus::Pending => ExitCode::FAILURE,
        OverallStatus::Pass | OverallStatus::Warn => ExitCode::SUCCESS,
    })
}
