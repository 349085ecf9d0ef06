//! Microphone diagnostics: the unit catalogue and the orchestrator that
//! sequences it.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mic_check::audio::TokioClock;
//! use mic_check::config::AppConfig;
//! use mic_check::diagnostics::{Orchestrator, UnitEnv};
//! use mic_check::host::desktop::DesktopHost;
//!
//! # async fn example() {
//! let config = AppConfig::default();
//! let env = UnitEnv {
//!     host: DesktopHost::services(&config.capture),
//!     config,
//!     clock: Arc::new(TokioClock::new()),
//!     progress: None,
//! };
//! let mut orchestrator = Orchestrator::with_default_units(env)
//!     .on_update(|table| println!("{}", table.overall_status().label()));
//! let results = orchestrator.run().await;
//! println!("{}", serde_json::to_string_pretty(results).unwrap());
//! # }
//! ```

pub mod context;
pub mod error;
pub mod outcome;
pub mod runner;
pub mod unit;
pub mod units;

pub use context::{DiagnosticContext, NoiseMeasurement, SpeechMeasurement};
pub use error::DiagnosticError;
pub use outcome::{
    Details, DiagnosticOutcome, DiagnosticResult, OutcomeStatus, OverallStatus, ResultStatus,
    ResultsTable,
};
pub use runner::{Orchestrator, UpdateFn};
pub use unit::{DiagnosticUnit, Scope, UnitEnv, UnitInfo, UnitKind};
pub use units::default_units;
