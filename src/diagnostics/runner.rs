//! Diagnostic orchestrator.
//!
//! Runs the unit catalogue in phases, gating everything that needs the
//! microphone behind the environment and permission checks:
//!
//! ```text
//! pre-permission   units without requires_permission, in order
//!   │  capability fail ─────────────▶ skip everything left, stop
//!   │  permission denied ───────────▶ skip permission units, stop
//!   ▼
//! permission       units with requires_permission, in order
//!   │  stream acquired ─▶ permission-status := pass,
//!   │                     device-enumeration re-run once
//!   │  stream failed ───────────────▶ skip rest of phase, stop
//!   ▼
//! release resources
//! ```
//!
//! [`Orchestrator::rerun_device_scope`] repeats only the `Device` scope
//! units for a newly selected device.  A stream opened there still marks
//! `context.permission` as granted but leaves the site-scoped
//! `permission-status` row alone.
//!
//! Every unit execution goes `pending → running → outcome` (or straight to
//! `skip` when its prerequisites are missing), and the update callback sees
//! the whole table after each transition.  A unit that returns an error or
//! panics ends as `fail`; the run carries on with the next unit.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use super::context::DiagnosticContext;
use super::error::DiagnosticError;
use super::outcome::{DiagnosticOutcome, OverallStatus, ResultStatus, ResultsTable};
use super::unit::{DiagnosticUnit, Scope, UnitEnv, UnitKind};
use super::units::default_units;
use crate::host::PermissionState;

/// Receives the results table after every transition.
pub type UpdateFn = dyn Fn(&ResultsTable) + Send + Sync;

const SKIP_UNSUPPORTED: &str = "Skipped: the environment does not support microphone access.";
const SKIP_DENIED: &str = "Skipped: microphone permission was denied.";
const SKIP_NO_STREAM: &str = "Skipped: the audio stream could not be opened.";

pub struct Orchestrator {
    units: Vec<Box<dyn DiagnosticUnit>>,
    env: UnitEnv,
    context: DiagnosticContext,
    results: ResultsTable,
    on_update: Option<Arc<UpdateFn>>,
}

impl Orchestrator {
    pub fn new(units: Vec<Box<dyn DiagnosticUnit>>, env: UnitEnv) -> Self {
        let results = ResultsTable::new(units.iter().map(|u| u.info()));
        Self {
            units,
            env,
            context: DiagnosticContext::new(),
            results,
            on_update: None,
        }
    }

    /// Orchestrator over [`default_units`].
    pub fn with_default_units(env: UnitEnv) -> Self {
        Self::new(default_units(), env)
    }

    pub fn on_update(mut self, callback: impl Fn(&ResultsTable) + Send + Sync + 'static) -> Self {
        self.on_update = Some(Arc::new(callback));
        self
    }

    /// Device used by the next [`run`](Self::run); `None` for the host default.
    pub fn select_device(&mut self, device_id: Option<String>) {
        self.context.selected_device = device_id;
    }

    pub fn results(&self) -> &ResultsTable {
        &self.results
    }

    pub fn context(&self) -> &DiagnosticContext {
        &self.context
    }

    pub fn overall_status(&self) -> OverallStatus {
        self.results.overall_status()
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Run the whole catalogue from a clean state.
    pub async fn run(&mut self) -> &ResultsTable {
        let selected = self.context.selected_device.take();
        self.context = DiagnosticContext::for_device(selected);
        self.reset_where(|_| true);
        log::info!("diagnostics: starting run of {} units", self.units.len());

        self.run_phases().await;

        self.context.release_resources();
        log::info!("diagnostics: run finished: {}", self.overall_status().label());
        &self.results
    }

    /// Re-run the device-scoped units against `device_id`.
    pub async fn rerun_device_scope(&mut self, device_id: Option<String>) -> &ResultsTable {
        self.context.clear_device_state();
        self.context.selected_device = device_id;
        self.reset_where(|scope| scope == Scope::Device);
        log::info!(
            "diagnostics: re-running device checks for {}",
            self.context.selected_device.as_deref().unwrap_or("the default device")
        );

        let device_units = self.indices(|u| u.scope == Scope::Device);
        if let Some(reason) = self.gate_reason() {
            self.skip_pending(&device_units, reason);
        } else {
            self.run_gated_phase(&device_units, false).await;
        }

        self.context.release_resources();
        &self.results
    }

    async fn run_phases(&mut self) {
        // Pre-permission phase.
        for idx in self.indices(|u| !u.requires_permission) {
            self.execute(idx).await;
            if self.units[idx].info().kind == UnitKind::Capability
                && self.results.row(idx).map(|r| r.status) == Some(ResultStatus::Fail)
            {
                log::warn!("diagnostics: environment unsupported, stopping");
                break;
            }
        }

        // Gate.
        if let Some(reason) = self.gate_reason() {
            let pending = self.indices(|_| true);
            self.skip_pending(&pending, reason);
            return;
        }

        // Permission phase.
        let gated = self.indices(|u| u.requires_permission);
        self.run_gated_phase(&gated, true).await;
    }

    /// Run `indices` in order, applying stream-acquisition propagation.
    ///
    /// `full_run` is false for a device rescope: site rows are left as they
    /// are and enumeration is not repeated.
    async fn run_gated_phase(&mut self, indices: &[usize], full_run: bool) {
        for (pos, &idx) in indices.iter().enumerate() {
            self.execute(idx).await;
            if self.units[idx].info().kind != UnitKind::StreamAcquisition {
                continue;
            }

            if self.results.row(idx).map(|r| r.status) == Some(ResultStatus::Pass) {
                self.confirm_permission(full_run);
                if full_run {
                    for enum_idx in self.indices(|u| u.kind == UnitKind::DeviceEnumeration) {
                        self.execute(enum_idx).await;
                    }
                }
            } else {
                log::warn!("diagnostics: no audio stream, skipping remaining checks");
                self.skip_pending(&indices[pos + 1..], SKIP_NO_STREAM);
                return;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Single unit
    // -----------------------------------------------------------------------

    async fn execute(&mut self, idx: usize) {
        let unit = &self.units[idx];
        let id = unit.info().id;

        if !unit.can_run(&self.context, &self.results) {
            let reason = unit.skip_reason();
            log::debug!("diagnostics: {id} cannot run");
            self.settle(idx, DiagnosticOutcome::skip(reason));
            return;
        }

        if let Some(row) = self.results.row_mut(idx) {
            row.set_running();
        }
        log::debug!("diagnostics: {id} running");
        self.notify();

        let result = AssertUnwindSafe(unit.test(&mut self.context, &self.env))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                let reason = panic_message(&*payload);
                log::error!("diagnostics: {id} panicked: {reason}");
                Err(DiagnosticError::Measurement(format!("{id} crashed: {reason}")))
            });

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("diagnostics: {id} failed with error: {e}");
                DiagnosticOutcome::fail(e.to_string()).with_optional_fix(e.fix())
            }
        };
        self.settle(idx, outcome);
    }

    fn settle(&mut self, idx: usize, outcome: DiagnosticOutcome) {
        if let Some(row) = self.results.row_mut(idx) {
            log::info!(
                "diagnostics: {} → {}: {}",
                row.id,
                ResultStatus::from(outcome.status()).label(),
                outcome.message()
            );
            row.apply(outcome);
        }
        self.notify();
    }

    // -----------------------------------------------------------------------
    // Propagation helpers
    // -----------------------------------------------------------------------

    /// Why permission-requiring units must not run, if they must not.
    fn gate_reason(&self) -> Option<&'static str> {
        let capability_failed = self.units.iter().enumerate().any(|(idx, u)| {
            u.info().kind == UnitKind::Capability
                && self.results.row(idx).map(|r| r.status) == Some(ResultStatus::Fail)
        });
        if capability_failed {
            Some(SKIP_UNSUPPORTED)
        } else if self.context.permission == Some(PermissionState::Denied) {
            Some(SKIP_DENIED)
        } else {
            None
        }
    }

    /// A live stream proves access: correct the permission record, and the
    /// `permission-status` row when `rewrite_row` is set.
    fn confirm_permission(&mut self, rewrite_row: bool) {
        self.context.permission = Some(PermissionState::Granted);
        if !rewrite_row {
            return;
        }
        for idx in self.indices(|u| u.kind == UnitKind::PermissionStatus) {
            let already = self.results.row(idx).map(|r| r.status) == Some(ResultStatus::Pass);
            if !already {
                self.settle(
                    idx,
                    DiagnosticOutcome::pass("Microphone access is granted (confirmed by opening a stream)."),
                );
            }
        }
    }

    fn skip_pending(&mut self, indices: &[usize], reason: &str) {
        for &idx in indices {
            let pending = self.results.row(idx).map(|r| r.status) == Some(ResultStatus::Pending);
            if pending {
                self.settle(idx, DiagnosticOutcome::skip(reason));
            }
        }
    }

    fn reset_where(&mut self, matches: impl Fn(Scope) -> bool) {
        for (idx, unit) in self.units.iter().enumerate() {
            if matches(unit.info().scope) {
                if let Some(row) = self.results.row_mut(idx) {
                    row.reset();
                }
            }
        }
        self.notify();
    }

    fn indices(&self, filter: impl Fn(&super::unit::UnitInfo) -> bool) -> Vec<usize> {
        self.units
            .iter()
            .enumerate()
            .filter(|(_, u)| filter(u.info()))
            .map(|(idx, _)| idx)
            .collect()
    }

    fn notify(&self) {
        if let Some(cb) = &self.on_update {
            cb(&self.results);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{ManualClock, ProgressEvent};
    use crate::config::AppConfig;
    use crate::diagnostics::error::DiagnosticError;
    use crate::diagnostics::unit::UnitInfo;
    use crate::host::fake::{FakeHost, Script};
    use crate::host::{Capabilities, CaptureError, DeviceInfo};
    use async_trait::async_trait;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn env(host: &FakeHost) -> UnitEnv {
        UnitEnv {
            host: host.services(),
            config: AppConfig::default(),
            clock: Arc::new(ManualClock::new()),
            progress: None,
        }
    }

    fn status(o: &Orchestrator, id: &str) -> ResultStatus {
        o.results().status_of(id).expect("unit exists")
    }

    fn message(o: &Orchestrator, id: &str) -> String {
        o.results()
            .get(id)
            .and_then(|r| r.message.clone())
            .unwrap_or_default()
    }

    const PERMISSION_UNITS: [&str; 4] =
        ["audio-stream", "noise-floor", "signal-analysis", "channel-balance"];

    // ---- Happy path --------------------------------------------------------

    #[tokio::test]
    async fn healthy_microphone_passes_everything() {
        let host = FakeHost::healthy();
        let mut o = Orchestrator::with_default_units(env(&host));
        o.run().await;

        for row in o.results().iter() {
            assert_eq!(row.status, ResultStatus::Pass, "{}: {:?}", row.id, row.message);
        }
        assert_eq!(o.overall_status(), OverallStatus::Pass);
        assert_eq!(host.permission_queries(), 1);
        assert_eq!(host.acquisitions(), 1);
        assert_eq!(host.releases(), 1);
        assert!(o.context().stream.is_none());
    }

    #[tokio::test]
    async fn measurements_land_in_the_context() {
        let host = FakeHost::healthy();
        let mut o = Orchestrator::with_default_units(env(&host));
        o.run().await;

        let ctx = o.context();
        let noise = ctx.noise_floor.expect("noise measured");
        let floor = noise.loudness_lufs.expect("above the gate");
        assert!((floor + 69.0).abs() < 0.5, "noise floor {floor}");

        let speech = ctx.speech.expect("speech measured");
        let lufs = speech.loudness_lufs.expect("speech detected");
        assert!((lufs + 23.0).abs() < 0.5, "speech {lufs}");
        let snr = speech.snr_db.expect("snr known");
        assert!((snr - 46.0).abs() < 1.0, "snr {snr}");
        assert!(!speech.clipping);
        assert!(ctx.channel_balance.as_ref().is_some_and(|b| !b.has_dead_channel));
    }

    // ---- Gating ------------------------------------------------------------

    #[tokio::test]
    async fn missing_capability_skips_everything_without_touching_the_host() {
        let caps = Capabilities {
            audio_processing: false,
            ..Capabilities::all()
        };
        let host = FakeHost::with(
            caps,
            PermissionState::Granted,
            vec![DeviceInfo::input("mic-1", "USB Microphone")],
            Script::stereo_speech(),
        );
        let mut o = Orchestrator::with_default_units(env(&host));
        o.run().await;

        assert_eq!(status(&o, "environment-support"), ResultStatus::Fail);
        assert!(message(&o, "environment-support").contains("audio processing"));
        for id in ["permission-status", "device-enumeration"]
            .into_iter()
            .chain(PERMISSION_UNITS)
        {
            assert_eq!(status(&o, id), ResultStatus::Skip, "{id}");
        }
        assert_eq!(o.overall_status(), OverallStatus::Fail);
        assert_eq!(host.permission_queries(), 0);
        assert_eq!(host.enumerations(), 0);
        assert_eq!(host.acquisitions(), 0);
    }

    #[tokio::test]
    async fn denied_permission_never_opens_the_microphone() {
        let host = FakeHost::with(
            Capabilities::all(),
            PermissionState::Denied,
            vec![DeviceInfo::input("mic-1", "USB Microphone")],
            Script::stereo_speech(),
        );
        let mut o = Orchestrator::with_default_units(env(&host));
        o.run().await;

        assert_eq!(status(&o, "permission-status"), ResultStatus::Fail);
        assert_eq!(status(&o, "device-enumeration"), ResultStatus::Pass);
        for id in PERMISSION_UNITS {
            assert_eq!(status(&o, id), ResultStatus::Skip, "{id}");
            assert!(message(&o, id).contains("denied"), "{id}");
        }
        assert_eq!(host.acquisitions(), 0);
        assert_eq!(o.overall_status(), OverallStatus::Fail);
    }

    // ---- Stream acquisition propagation ------------------------------------

    #[tokio::test]
    async fn acquired_stream_confirms_permission_and_reenumerates() {
        let host = FakeHost::with(
            Capabilities::all(),
            PermissionState::Unsupported,
            vec![DeviceInfo::input("mic-1", "")],
            Script::stereo_speech(),
        );
        let mut o = Orchestrator::with_default_units(env(&host));
        o.run().await;

        assert_eq!(status(&o, "permission-status"), ResultStatus::Pass);
        assert_eq!(o.context().permission, Some(PermissionState::Granted));
        assert_eq!(host.enumerations(), 2);
        assert_eq!(host.permission_queries(), 1);
    }

    #[tokio::test]
    async fn prompt_is_overridden_once_the_stream_opens() {
        let host = FakeHost::with(
            Capabilities::all(),
            PermissionState::Prompt,
            vec![DeviceInfo::input("mic-1", "USB Microphone")],
            Script::stereo_speech(),
        );
        let mut o = Orchestrator::with_default_units(env(&host));
        o.run().await;

        assert_eq!(status(&o, "permission-status"), ResultStatus::Pass);
        assert!(message(&o, "permission-status").contains("confirmed"));
        assert_eq!(o.context().permission, Some(PermissionState::Granted));
        assert_eq!(host.enumerations(), 2);
        assert_eq!(host.acquisitions(), 1);
        assert_eq!(o.overall_status(), OverallStatus::Pass);
    }

    #[tokio::test]
    async fn failed_stream_skips_the_rest_of_the_phase() {
        let host = FakeHost::with(
            Capabilities::all(),
            PermissionState::Prompt,
            vec![DeviceInfo::input("mic-1", "USB Microphone")],
            Script::stereo_speech(),
        )
        .failing_capture(CaptureError::Backend("device busy".into()));
        let mut o = Orchestrator::with_default_units(env(&host));
        o.run().await;

        assert_eq!(status(&o, "audio-stream"), ResultStatus::Fail);
        let row = o.results().get("audio-stream").unwrap();
        assert!(row.message.as_deref().unwrap().contains("device busy"));
        assert!(row.fix.is_some());
        for id in ["noise-floor", "signal-analysis", "channel-balance"] {
            assert_eq!(status(&o, id), ResultStatus::Skip, "{id}");
        }
        // Not confirmed, so the reported state stands and nothing is re-enumerated.
        assert_eq!(status(&o, "permission-status"), ResultStatus::Info);
        assert_eq!(host.enumerations(), 1);
        assert_eq!(o.overall_status(), OverallStatus::Fail);
    }

    // ---- Error conversion --------------------------------------------------

    #[tokio::test]
    async fn unit_error_becomes_fail_and_the_run_continues() {
        let host = FakeHost::healthy().failing_enumeration();
        let mut o = Orchestrator::with_default_units(env(&host));
        o.run().await;

        assert_eq!(status(&o, "device-enumeration"), ResultStatus::Fail);
        assert!(message(&o, "device-enumeration").contains("backend unavailable"));
        assert_eq!(status(&o, "audio-stream"), ResultStatus::Pass);
        assert_eq!(status(&o, "signal-analysis"), ResultStatus::Pass);
        assert_eq!(o.overall_status(), OverallStatus::Fail);
    }

    struct Crashing;

    const CRASHING: UnitInfo = UnitInfo {
        id: "calibration",
        name: "Calibration",
        description: "panics while running",
        scope: Scope::Site,
        requires_permission: false,
        kind: UnitKind::Report,
    };

    #[async_trait]
    impl DiagnosticUnit for Crashing {
        fn info(&self) -> &UnitInfo {
            &CRASHING
        }

        async fn test(
            &self,
            _: &mut DiagnosticContext,
            _: &UnitEnv,
        ) -> Result<DiagnosticOutcome, DiagnosticError> {
            let table: Vec<f64> = Vec::new();
            panic!("no calibration entry ({} loaded)", table.len());
        }
    }

    #[tokio::test]
    async fn panicking_unit_becomes_fail_and_the_run_continues() {
        let host = FakeHost::healthy();
        let mut units = default_units();
        units.insert(0, Box::new(Crashing));
        let mut o = Orchestrator::new(units, env(&host));
        o.run().await;

        let row = o.results().get("calibration").unwrap();
        assert_eq!(row.status, ResultStatus::Fail);
        assert!(row.message.as_deref().unwrap().contains("no calibration entry (0 loaded)"));
        assert!(row.fix.is_some());
        assert_eq!(status(&o, "signal-analysis"), ResultStatus::Pass);
        assert_eq!(status(&o, "channel-balance"), ResultStatus::Pass);
        assert_eq!(host.releases(), 1);
        assert_eq!(o.overall_status(), OverallStatus::Fail);
    }

    #[test]
    fn panic_payloads_are_readable() {
        let text: Box<dyn Any + Send> = Box::new("static text");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned text"));
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*text), "static text");
        assert_eq!(panic_message(&*owned), "owned text");
        assert_eq!(panic_message(&*other), "unknown panic");
    }

    #[tokio::test]
    async fn measurement_failure_skips_dependent_report() {
        let mut script = Script::stereo_speech();
        script.failing_reads = (0..10_000).collect();
        let host = FakeHost::with(
            Capabilities::all(),
            PermissionState::Granted,
            vec![DeviceInfo::input("mic-1", "USB Microphone")],
            script,
        );
        let mut o = Orchestrator::with_default_units(env(&host));
        o.run().await;

        assert_eq!(status(&o, "noise-floor"), ResultStatus::Fail);
        assert_eq!(status(&o, "signal-analysis"), ResultStatus::Fail);
        assert!(message(&o, "signal-analysis").starts_with("measurement failed"));
        assert_eq!(status(&o, "channel-balance"), ResultStatus::Skip);
        assert_eq!(host.releases(), 1);
    }

    // ---- Device outcomes ---------------------------------------------------

    #[tokio::test]
    async fn no_inputs_fails_enumeration() {
        let host = FakeHost::with(
            Capabilities::all(),
            PermissionState::Granted,
            Vec::new(),
            Script::stereo_speech(),
        );
        let mut o = Orchestrator::with_default_units(env(&host));
        o.run().await;

        assert_eq!(status(&o, "device-enumeration"), ResultStatus::Fail);
        assert!(o.results().get("device-enumeration").unwrap().fix.is_some());
    }

    #[tokio::test]
    async fn mono_input_skips_channel_balance() {
        let host = FakeHost::with(
            Capabilities::all(),
            PermissionState::Granted,
            vec![DeviceInfo::input("mic-1", "Headset")],
            Script::mono_speech(),
        );
        let mut o = Orchestrator::with_default_units(env(&host));
        o.run().await;

        assert_eq!(status(&o, "channel-balance"), ResultStatus::Skip);
        assert_eq!(o.overall_status(), OverallStatus::Pass);
    }

    #[tokio::test]
    async fn dead_channel_warns() {
        let mut script = Script::stereo_speech();
        script.speech = vec![0.1, 0.0];
        let host = FakeHost::with(
            Capabilities::all(),
            PermissionState::Granted,
            vec![DeviceInfo::input("mic-1", "Interface")],
            script,
        );
        let mut o = Orchestrator::with_default_units(env(&host));
        o.run().await;

        assert_eq!(status(&o, "signal-analysis"), ResultStatus::Pass);
        assert_eq!(status(&o, "channel-balance"), ResultStatus::Warn);
        assert!(message(&o, "channel-balance").contains("right"));
        assert_eq!(o.overall_status(), OverallStatus::Warn);
    }

    #[tokio::test]
    async fn silence_warns_about_missing_speech() {
        let mut script = Script::stereo_speech();
        script.speech = vec![0.0, 0.0];
        let host = FakeHost::with(
            Capabilities::all(),
            PermissionState::Granted,
            vec![DeviceInfo::input("mic-1", "USB Microphone")],
            script,
        );
        let mut o = Orchestrator::with_default_units(env(&host));
        o.run().await;

        assert_eq!(status(&o, "signal-analysis"), ResultStatus::Warn);
        assert!(message(&o, "signal-analysis").contains("No speech"));
        assert_eq!(o.context().speech.and_then(|s| s.loudness_lufs), None);
        assert_eq!(o.overall_status(), OverallStatus::Warn);
    }

    #[tokio::test]
    async fn agc_stream_is_rated_with_the_agc_table() {
        // 0.02 peak → ≈ −37 LUFS: marginal for a raw stream, good with AGC.
        let mut script = Script::mono_speech();
        script.speech = vec![0.02];
        script.info.auto_gain_control = true;
        let host = FakeHost::with(
            Capabilities::all(),
            PermissionState::Granted,
            vec![DeviceInfo::input("mic-1", "Webcam")],
            script,
        );
        let mut o = Orchestrator::with_default_units(env(&host));
        o.run().await;

        assert_eq!(status(&o, "signal-analysis"), ResultStatus::Pass);
        let details = o.results().get("signal-analysis").unwrap().details.clone().unwrap();
        assert_eq!(details.get("ratingTable"), Some(&serde_json::json!("loudnessAgc")));
    }

    #[tokio::test]
    async fn quiet_raw_stream_warns() {
        let mut script = Script::mono_speech();
        script.speech = vec![0.02];
        let host = FakeHost::with(
            Capabilities::all(),
            PermissionState::Granted,
            vec![DeviceInfo::input("mic-1", "Webcam")],
            script,
        );
        let mut o = Orchestrator::with_default_units(env(&host));
        o.run().await;

        assert_eq!(status(&o, "signal-analysis"), ResultStatus::Warn);
        assert!(o.results().get("signal-analysis").unwrap().fix.is_some());
    }

    // ---- Callbacks ---------------------------------------------------------

    #[tokio::test]
    async fn update_callback_sees_every_transition() {
        let host = FakeHost::healthy();
        let seen: Arc<Mutex<Vec<ResultStatus>>> = Arc::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let (sink, counter) = (Arc::clone(&seen), Arc::clone(&calls));

        let mut o = Orchestrator::with_default_units(env(&host)).on_update(move |table| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(s) = table.status_of("audio-stream") {
                let mut seen = sink.lock().unwrap();
                if seen.last() != Some(&s) {
                    seen.push(s);
                }
            }
        });
        o.run().await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![ResultStatus::Pending, ResultStatus::Running, ResultStatus::Pass]
        );
        // Reset, running + outcome for 7 units, enumeration re-run.
        assert_eq!(calls.load(Ordering::SeqCst), 1 + 7 * 2 + 2);
    }

    #[tokio::test]
    async fn every_skipped_unit_is_reported_separately() {
        let host = FakeHost::with(
            Capabilities::all(),
            PermissionState::Denied,
            vec![DeviceInfo::input("mic-1", "USB Microphone")],
            Script::stereo_speech(),
        );
        let skips_seen: Arc<Mutex<Vec<usize>>> = Arc::default();
        let sink = Arc::clone(&skips_seen);
        let mut o = Orchestrator::with_default_units(env(&host)).on_update(move |table| {
            let skipped = table.iter().filter(|r| r.status == ResultStatus::Skip).count();
            sink.lock().unwrap().push(skipped);
        });
        o.run().await;

        // Reset, running + outcome for the 3 pre-permission units, one per skip.
        let seen = skips_seen.lock().unwrap();
        assert_eq!(seen.len(), 1 + 3 * 2 + 4);
        assert_eq!(seen[seen.len() - 4..], [1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn progress_callback_ticks_through_both_passes() {
        let host = FakeHost::healthy();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let mut env = env(&host);
        env.progress = Some(Arc::new(move |_: &ProgressEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        Orchestrator::with_default_units(env).run().await;

        // 3 s + 10 s at 50 ms.
        assert_eq!(ticks.load(Ordering::SeqCst), 60 + 200);
    }

    // ---- Device rescope ----------------------------------------------------

    #[tokio::test]
    async fn rescope_reruns_only_device_units() {
        let host = FakeHost::healthy();
        let mut o = Orchestrator::with_default_units(env(&host));
        o.run().await;
        let site_before = o.results().get("device-enumeration").cloned();

        o.rerun_device_scope(Some("mic-2".into())).await;

        assert_eq!(host.acquisitions(), 2);
        assert_eq!(host.releases(), 2);
        assert_eq!(host.enumerations(), 2);
        assert_eq!(host.permission_queries(), 1);
        assert_eq!(
            host.capture.last_device.lock().unwrap().as_deref(),
            Some("mic-2")
        );
        assert_eq!(o.results().get("device-enumeration").cloned(), site_before);
        for id in PERMISSION_UNITS {
            assert_eq!(status(&o, id), ResultStatus::Pass, "{id}");
        }
    }

    #[tokio::test]
    async fn rescope_with_failing_stream_skips_measurements() {
        let host = FakeHost::healthy().failing_capture(CaptureError::DeviceNotFound("mic-9".into()));
        let mut o = Orchestrator::with_default_units(env(&host));
        o.rerun_device_scope(Some("mic-9".into())).await;

        assert_eq!(status(&o, "audio-stream"), ResultStatus::Fail);
        for id in ["noise-floor", "signal-analysis", "channel-balance"] {
            assert_eq!(status(&o, id), ResultStatus::Skip, "{id}");
        }
        // Site units were never part of the rescope.
        assert_eq!(status(&o, "permission-status"), ResultStatus::Pending);
    }

    #[tokio::test]
    async fn rescope_grants_permission_without_touching_the_site_row() {
        let host = FakeHost::with(
            Capabilities::all(),
            PermissionState::Prompt,
            vec![DeviceInfo::input("mic-1", "USB Microphone")],
            Script::stereo_speech(),
        );
        let mut o = Orchestrator::with_default_units(env(&host));
        o.rerun_device_scope(Some("mic-1".into())).await;

        assert_eq!(status(&o, "audio-stream"), ResultStatus::Pass);
        assert_eq!(o.context().permission, Some(PermissionState::Granted));
        assert_eq!(status(&o, "permission-status"), ResultStatus::Pending);
        assert_eq!(host.enumerations(), 0);
    }

    #[tokio::test]
    async fn rescope_after_denial_stays_gated() {
        let host = FakeHost::with(
            Capabilities::all(),
            PermissionState::Denied,
            vec![DeviceInfo::input("mic-1", "USB Microphone")],
            Script::stereo_speech(),
        );
        let mut o = Orchestrator::with_default_units(env(&host));
        o.run().await;
        o.rerun_device_scope(Some("mic-1".into())).await;

        assert_eq!(host.acquisitions(), 0);
        assert_eq!(status(&o, "audio-stream"), ResultStatus::Skip);
    }

    // ---- can_run -----------------------------------------------------------

    struct Blocked;

    const BLOCKED: UnitInfo = UnitInfo {
        id: "blocked",
        name: "Blocked",
        description: "never runnable",
        scope: Scope::Site,
        requires_permission: false,
        kind: UnitKind::Report,
    };

    #[async_trait]
    impl DiagnosticUnit for Blocked {
        fn info(&self) -> &UnitInfo {
            &BLOCKED
        }

        fn can_run(&self, _: &DiagnosticContext, _: &ResultsTable) -> bool {
            false
        }

        fn skip_reason(&self) -> String {
            "needs something else first".into()
        }

        async fn test(
            &self,
            _: &mut DiagnosticContext,
            _: &UnitEnv,
        ) -> Result<DiagnosticOutcome, DiagnosticError> {
            panic!("must not be called");
        }
    }

    #[tokio::test]
    async fn unrunnable_unit_is_skipped_with_its_reason() {
        let host = FakeHost::healthy();
        let mut o = Orchestrator::new(vec![Box::new(Blocked)], env(&host));
        o.run().await;

        assert_eq!(status(&o, "blocked"), ResultStatus::Skip);
        assert_eq!(message(&o, "blocked"), "needs something else first");
        assert_eq!(o.overall_status(), OverallStatus::Pass);
    }
}
