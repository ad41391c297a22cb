//! Phase scheduler.
//!
//! Partitions the registry into the Lead, Main and Trail buckets and runs
//! every unit of each bucket through the [`Sequencer`], strictly in order.
//!
//! # State Flow
//!
//! ```text
//! NotStarted → RunningLead → RunningMain → RunningTrail → Done
//! ```
//!
//! Transitions are forward-only; a scheduler that reached `Done` cannot be
//! run again.

use crate::error::{PackListError, Result};
use crate::installed::InstalledSet;
use crate::lifecycle::Sequencer;
use crate::process_guard;
use crate::registry::Registry;
use crate::report::{RunReport, UnitOutcome, UnitReport};
use crate::selection::{Decision, Selection};
use crate::types::Bucket;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Scheduler states in sequential order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchedulerState {
    NotStarted,
    RunningLead,
    RunningMain,
    RunningTrail,
    Done,
}

impl SchedulerState {
    /// The next state, or None once done.
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::RunningLead),
            Self::RunningLead => Some(Self::RunningMain),
            Self::RunningMain => Some(Self::RunningTrail),
            Self::RunningTrail => Some(Self::Done),
            Self::Done => None,
        }
    }

    /// Bucket executed while in this state.
    pub const fn bucket(self) -> Option<Bucket> {
        match self {
            Self::RunningLead => Some(Bucket::Lead),
            Self::RunningMain => Some(Bucket::Main),
            Self::RunningTrail => Some(Bucket::Trail),
            Self::NotStarted | Self::Done => None,
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotStarted => "not started",
            Self::RunningLead => "running lead units",
            Self::RunningMain => "running main units",
            Self::RunningTrail => "running trail units",
            Self::Done => "done",
        };
        f.write_str(text)
    }
}

/// Invalid scheduler transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Cannot go from {from} to {to} (scheduler is forward-only)")]
    Invalid {
        from: SchedulerState,
        to: SchedulerState,
    },

    #[error("Scheduler is already done")]
    AlreadyDone,
}

/// Drives buckets in order and collects the run report.
pub struct Scheduler<'a> {
    sequencer: Sequencer<'a>,
    stop_on_error: bool,
    state: SchedulerState,
    history: Vec<SchedulerState>,
    report: RunReport,
}

impl<'a> Scheduler<'a> {
    pub fn new(sequencer: Sequencer<'a>, stop_on_error: bool) -> Self {
        Self {
            sequencer,
            stop_on_error,
            state: SchedulerState::NotStarted,
            history: vec![SchedulerState::NotStarted],
            report: RunReport::default(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Units finished so far. Still holds the partial run after an error.
    pub fn report(&self) -> &RunReport {
        &self.report
    }

    /// Every state visited so far, in order.
    pub fn history(&self) -> &[SchedulerState] {
        &self.history
    }

    /// Move to `to`, which must be the immediate successor of the current state.
    pub fn transition_to(&mut self, to: SchedulerState) -> std::result::Result<(), TransitionError> {
        match self.state.next() {
            None => Err(TransitionError::AlreadyDone),
            Some(next) if next == to => {
                tracing::debug!("Scheduler: {} -> {}", self.state, to);
                self.state = to;
                self.history.push(to);
                Ok(())
            }
            Some(_) => Err(TransitionError::Invalid {
                from: self.state,
                to,
            }),
        }
    }

    fn advance(&mut self) -> Result<SchedulerState> {
        let next = self
            .state
            .next()
            .ok_or_else(|| PackListError::environment(TransitionError::AlreadyDone))?;
        self.transition_to(next)
            .map_err(PackListError::environment)?;
        Ok(next)
    }

    /// Run every bucket. `on_unit` is called as soon as each unit finishes.
    ///
    /// Failed units are recorded and the run continues, unless stop-on-error
    /// is set, in which case the first failure aborts with
    /// [`PackListError::Aborted`]. A run that saw an interrupt never ends
    /// in `Ok`.
    pub fn run(
        &mut self,
        registry: &mut Registry,
        mut on_unit: impl FnMut(&UnitReport),
    ) -> Result<RunReport> {
        while let Some(bucket) = self.advance()?.bucket() {
            let units: Vec<_> = registry.phase_mut(bucket).collect();
            if units.is_empty() {
                tracing::info!("No {} units", bucket);
                continue;
            }
            tracing::info!("Running {} {} unit(s)", units.len(), bucket);

            for unit in units {
                let unit_report = self.sequencer.run(unit)?;
                on_unit(&unit_report);

                let abort = match &unit_report.outcome {
                    UnitOutcome::Failed { failure } if self.stop_on_error => {
                        Some(PackListError::Aborted {
                            unit: unit_report.name.clone(),
                            reason: failure.to_string(),
                        })
                    }
                    _ => None,
                };
                self.report.push(unit_report);
                if let Some(err) = abort {
                    return Err(err);
                }
            }
        }

        if process_guard::interrupted() {
            return Err(PackListError::Interrupted);
        }
        Ok(self.report.clone())
    }
}

/// One row of an execution plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub line: usize,
    pub name: String,
    pub bucket: Bucket,
    pub decision: Decision,
}

/// Units in execution order with their selection decision, without
/// running anything.
pub fn plan(
    registry: &Registry,
    selection: &Selection,
    installed: &InstalledSet,
    hostname: &str,
) -> Vec<PlanEntry> {
    registry
        .execution_order()
        .into_iter()
        .map(|entry| PlanEntry {
            line: entry.line,
            name: entry.unit.name.clone(),
            bucket: entry.unit.bucket(),
            decision: selection.evaluate(&entry.unit, installed, hostname),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_order() {
        let mut state = SchedulerState::NotStarted;
        let mut seen = vec![state];
        while let Some(next) = state.next() {
            assert!(next > state);
            seen.push(next);
            state = next;
        }
        assert_eq!(
            seen,
            vec![
                SchedulerState::NotStarted,
                SchedulerState::RunningLead,
                SchedulerState::RunningMain,
                SchedulerState::RunningTrail,
                SchedulerState::Done,
            ]
        );
    }

    #[test]
    fn test_bucket_per_state() {
        assert_eq!(SchedulerState::NotStarted.bucket(), None);
        assert_eq!(SchedulerState::RunningLead.bucket(), Some(Bucket::Lead));
        assert_eq!(SchedulerState::RunningTrail.bucket(), Some(Bucket::Trail));
        assert_eq!(SchedulerState::Done.bucket(), None);
    }
}
