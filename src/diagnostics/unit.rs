//! The [`DiagnosticUnit`] trait and its static identity.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::audio::{Clock, ProgressFn};
use crate::config::AppConfig;
use crate::host::HostServices;

use super::context::DiagnosticContext;
use super::error::DiagnosticError;
use super::outcome::{DiagnosticOutcome, ResultsTable};

/// Granularity at which a unit's verdict holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// The runtime environment as a whole.
    Environment,
    /// The application's standing with the host (permission, device list).
    Site,
    /// One selected input device; re-run when the selection changes.
    Device,
}

/// Role a unit plays in the run's control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UnitKind {
    /// Failure stops the run.
    Capability,
    /// Forced to pass once a stream has been acquired.
    PermissionStatus,
    /// Re-run once after the first successful stream acquisition.
    DeviceEnumeration,
    /// Failure skips the rest of the permission phase.
    StreamAcquisition,
    SignalAnalysis,
    Report,
}

/// Static identity of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub scope: Scope,
    pub requires_permission: bool,
    pub kind: UnitKind,
}

/// Everything a unit may use besides the context.
#[derive(Clone)]
pub struct UnitEnv {
    pub host: HostServices,
    pub config: AppConfig,
    pub clock: Arc<dyn Clock>,
    pub progress: Option<Arc<ProgressFn>>,
}

/// One check.
///
/// `test` writes whatever it measures into the context fields it owns and
/// returns its verdict.  An `Err` is not fatal to the run: the orchestrator
/// turns it into a `fail` outcome and moves on.
#[async_trait]
pub trait DiagnosticUnit: Send + Sync {
    fn info(&self) -> &UnitInfo;

    /// Whether the unit's prerequisites are met.
    fn can_run(&self, _context: &DiagnosticContext, _results: &ResultsTable) -> bool {
        true
    }

    /// Message recorded when `can_run` returns `false`.
    fn skip_reason(&self) -> String {
        "Prerequisites for this check were not met.".to_string()
    }

    async fn test(
        &self,
        context: &mut DiagnosticContext,
        env: &UnitEnv,
    ) -> Result<DiagnosticOutcome, DiagnosticError>;
}
