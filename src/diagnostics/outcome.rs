//! Outcomes of individual units and the table of results for a whole run.
//!
//! A unit's [`DiagnosticOutcome`] is one of five terminal statuses.  The
//! orchestrator copies it into the unit's row of the [`ResultsTable`],
//! whose [`ResultStatus`] additionally knows `pending` and `running`.
//!
//! ```text
//! pending ──▶ running ──▶ pass | fail | warn | info
//!    └──────────────────▶ skip
//! ```
//!
//! The overall verdict reduces the table: `pending` if anything is still
//! pending or running, else `fail` if any row failed, else `warn` if any row
//! warned, else `pass`.  `skip` and `info` rows never lower the verdict.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;

use super::unit::{Scope, UnitInfo};

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// Terminal status of one unit execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Pass,
    Fail,
    Warn,
    Skip,
    Info,
}

/// Status of a row in the [`ResultsTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Pending,
    Running,
    Pass,
    Fail,
    Warn,
    Skip,
    Info,
}

impl From<OutcomeStatus> for ResultStatus {
    fn from(s: OutcomeStatus) -> Self {
        match s {
            OutcomeStatus::Pass => ResultStatus::Pass,
            OutcomeStatus::Fail => ResultStatus::Fail,
            OutcomeStatus::Warn => ResultStatus::Warn,
            OutcomeStatus::Skip => ResultStatus::Skip,
            OutcomeStatus::Info => ResultStatus::Info,
        }
    }
}

impl ResultStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ResultStatus::Pending => "pending",
            ResultStatus::Running => "running",
            ResultStatus::Pass => "pass",
            ResultStatus::Fail => "fail",
            ResultStatus::Warn => "warn",
            ResultStatus::Skip => "skip",
            ResultStatus::Info => "info",
        }
    }

    /// `false` while the row is pending or running.
    pub fn is_settled(&self) -> bool {
        !matches!(self, ResultStatus::Pending | ResultStatus::Running)
    }
}

/// Reduction of a whole [`ResultsTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Pending,
    Fail,
    Warn,
    Pass,
}

impl OverallStatus {
    pub fn label(&self) -> &'static str {
        match self {
            OverallStatus::Pending => "pending",
            OverallStatus::Fail => "fail",
            OverallStatus::Warn => "warn",
            OverallStatus::Pass => "pass",
        }
    }
}

// ---------------------------------------------------------------------------
// Details
// ---------------------------------------------------------------------------

/// Structured payload of an outcome: key → JSON value, kept in insertion
/// order and serialized as a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Details(Vec<(String, Value)>);

impl Details {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        self.insert(key, value);
        self
    }

    /// Set `key`, replacing an earlier value in place.  Values that cannot be
    /// represented in JSON (e.g. NaN) are stored as `null`.
    pub fn insert(&mut self, key: &str, value: impl Serialize) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Details {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// DiagnosticOutcome
// ---------------------------------------------------------------------------

/// What a unit concluded.  Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticOutcome {
    status: OutcomeStatus,
    message: String,
    details: Option<Details>,
    fix: Option<String>,
}

impl DiagnosticOutcome {
    fn new(status: OutcomeStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
            fix: None,
        }
    }

    pub fn pass(message: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::Pass, message)
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::Fail, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::Warn, message)
    }

    pub fn skip(message: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::Skip, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::Info, message)
    }

    pub fn with_details(mut self, details: Details) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }

    /// Attach `fix` when there is one.
    pub fn with_optional_fix(mut self, fix: Option<String>) -> Self {
        self.fix = fix;
        self
    }

    pub fn status(&self) -> OutcomeStatus {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&Details> {
        self.details.as_ref()
    }

    pub fn fix(&self) -> Option<&str> {
        self.fix.as_deref()
    }
}

// ---------------------------------------------------------------------------
// DiagnosticResult
// ---------------------------------------------------------------------------

/// One row of the results table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticResult {
    pub id: &'static str,
    pub name: &'static str,
    pub scope: Scope,
    pub status: ResultStatus,
    pub message: Option<String>,
    pub details: Option<Details>,
    pub fix: Option<String>,
}

impl DiagnosticResult {
    pub fn pending(info: &UnitInfo) -> Self {
        Self {
            id: info.id,
            name: info.name,
            scope: info.scope,
            status: ResultStatus::Pending,
            message: None,
            details: None,
            fix: None,
        }
    }

    pub fn reset(&mut self) {
        self.status = ResultStatus::Pending;
        self.message = None;
        self.details = None;
        self.fix = None;
    }

    pub fn set_running(&mut self) {
        self.reset();
        self.status = ResultStatus::Running;
    }

    pub fn apply(&mut self, outcome: DiagnosticOutcome) {
        self.status = outcome.status.into();
        self.message = Some(outcome.message);
        self.details = outcome.details;
        self.fix = outcome.fix;
    }
}

// ---------------------------------------------------------------------------
// ResultsTable
// ---------------------------------------------------------------------------

/// One [`DiagnosticResult`] per unit, in catalogue order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsTable {
    rows: Vec<DiagnosticResult>,
}

impl ResultsTable {
    pub fn new<'a>(infos: impl IntoIterator<Item = &'a UnitInfo>) -> Self {
        Self {
            rows: infos.into_iter().map(DiagnosticResult::pending).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&DiagnosticResult> {
        self.rows.iter().find(|r| r.id == id)
    }

    pub fn status_of(&self, id: &str) -> Option<ResultStatus> {
        self.get(id).map(|r| r.status)
    }

    /// Row at catalogue position `index`.
    pub fn row(&self, index: usize) -> Option<&DiagnosticResult> {
        self.rows.get(index)
    }

    pub(crate) fn row_mut(&mut self, index: usize) -> Option<&mut DiagnosticResult> {
        self.rows.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiagnosticResult> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Reduce every row to one verdict.
    ///
    /// ```rust
    /// use mic_check::diagnostics::{OverallStatus, ResultsTable};
    ///
    /// // Nothing to run is nothing wrong.
    /// assert_eq!(ResultsTable::default().overall_status(), OverallStatus::Pass);
    /// ```
    pub fn overall_status(&self) -> OverallStatus {
        let any = |s: ResultStatus| self.rows.iter().any(|r| r.status == s);

        if self.rows.iter().any(|r| !r.status.is_settled()) {
            OverallStatus::Pending
        } else if any(ResultStatus::Fail) {
            OverallStatus::Fail
        } else if any(ResultStatus::Warn) {
            OverallStatus::Warn
        } else {
            OverallStatus::Pass
        }
    }
}

impl Serialize for ResultsTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Report<'a> {
            overall: OverallStatus,
            results: &'a [DiagnosticResult],
        }

        Report {
            overall: self.overall_status(),
            results: &self.rows,
        }
        .serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
