//! Per-unit outcomes and the run summary.

use crate::selection::SkipReason;
use crate::types::Bucket;
use serde::Serialize;
use std::fmt;
use strum::Display;

/// Lifecycle steps, in execution order after selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Step {
    Repositories,
    Sources,
    RefreshIndex,
    PreScript,
    Retrieve,
    Install,
    PostScript,
}

impl Step {
    pub const LIFECYCLE: [Step; 7] = [
        Step::Repositories,
        Step::Sources,
        Step::RefreshIndex,
        Step::PreScript,
        Step::Retrieve,
        Step::Install,
        Step::PostScript,
    ];
}

/// A failed lifecycle step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    pub step: Step,
    pub message: String,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.message)
    }
}

/// How a unit's lifecycle ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum UnitOutcome {
    Skipped { reason: SkipReason },
    Completed,
    Failed { failure: StepFailure },
}

impl UnitOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped { reason } => write!(f, "skipped ({})", reason),
            Self::Completed => write!(f, "completed"),
            Self::Failed { failure } => write!(f, "failed ({})", failure),
        }
    }
}

/// Result of one unit, with the external actions taken (or, in dry-run
/// mode, that would have been taken).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    pub name: String,
    pub bucket: Bucket,
    pub outcome: UnitOutcome,
    pub actions: Vec<String>,
}

impl UnitReport {
    /// One status line for the terminal.
    pub fn status_line(&self) -> String {
        let marker = match self.outcome {
            UnitOutcome::Completed => "✓",
            UnitOutcome::Skipped { .. } => "-",
            UnitOutcome::Failed { .. } => "✗",
        };
        format!("{} {}: {}", marker, self.name, self.outcome)
    }
}

/// Everything that happened during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub units: Vec<UnitReport>,
}

impl RunReport {
    pub fn push(&mut self, report: UnitReport) {
        self.units.push(report);
    }

    /// Names of failed units, in execution order.
    pub fn failed(&self) -> Vec<&str> {
        self.units
            .iter()
            .filter(|u| u.outcome.is_failed())
            .map(|u| u.name.as_str())
            .collect()
    }

    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Completed))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Skipped { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.units.iter().any(|u| u.outcome.is_failed())
    }

    fn count(&self, pred: impl Fn(&UnitOutcome) -> bool) -> usize {
        self.units.iter().filter(|u| pred(&u.outcome)).count()
    }

    /// Final summary block.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} completed, {} skipped, {} failed",
            self.completed(),
            self.skipped(),
            self.failed().len()
        );
        if self.has_failures() {
            out.push_str("\nFailed units: ");
            out.push_str(&self.failed().join(", "));
        }
        out
    }
}
