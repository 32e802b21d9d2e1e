//! Append-only accumulation of steps, commands, checks and notes.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::clock::Clock;
use super::model::{CheckRecord, ExecutionReport, Note, NoteLevel, SetRecord, Step};
use crate::signals::value::SignalValue;

/// Collects what a scenario did, in order.
///
/// The current step is always the most recently started one. Sets and notes
/// issued before any step are dropped with a console warning; checks are
/// still kept in the report-wide list so the aggregate verdict stays honest.
#[derive(Debug, Clone)]
pub struct ExecutionRecorder {
    test_name: String,
    description: String,
    dry_run: bool,
    clock: Clock,
    start_time: DateTime<Utc>,
    steps: Vec<Step>,
    checks: Vec<CheckRecord>,
    failed: bool,
}

impl ExecutionRecorder {
    /// Start recording a scenario. The start time is taken from `clock`.
    #[must_use]
    pub fn new(test_name: &str, description: &str, clock: Clock, dry_run: bool) -> Self {
        let start_time = clock.now();
        Self {
            test_name: test_name.to_string(),
            description: description.to_string(),
            dry_run,
            clock,
            start_time,
            steps: Vec::new(),
            checks: Vec::new(),
            failed: false,
        }
    }

    #[must_use]
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// Current time on the recorder's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[must_use]
    pub const fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Advance simulated time; no effect on a wall clock.
    pub fn advance(&mut self, by: Duration) {
        self.clock.advance(by);
    }

    /// Open a new step and make it current.
    pub fn start_step(&mut self, name: &str, description: &str) {
        self.steps.push(Step {
            name: name.to_string(),
            description: description.to_string(),
            timestamp: self.clock.now(),
            sets: Vec::new(),
            checks: Vec::new(),
            notes: Vec::new(),
        });
    }

    /// Name of the open step, if any.
    #[must_use]
    pub fn current_step(&self) -> Option<&str> {
        self.steps.last().map(|s| s.name.as_str())
    }

    /// Attach a command to the current step. Returns whether a step was open.
    pub fn record_set(&mut self, signal: &str, value: &SignalValue) -> bool {
        let timestamp = self.clock.now();
        let Some(step) = self.steps.last_mut() else {
            log::warn!("set of {signal} = {value} recorded outside any step; dropped");
            return false;
        };
        step.sets.push(SetRecord {
            signal: signal.to_string(),
            value: value.clone(),
            timestamp,
        });
        true
    }

    /// Record a check result, stamped now.
    pub fn record_check(
        &mut self,
        signal: &str,
        expected: &SignalValue,
        actual: &SignalValue,
        passed: bool,
        tolerance: Option<f64>,
    ) -> &CheckRecord {
        let record = CheckRecord {
            signal: signal.to_string(),
            expected: expected.clone(),
            actual: actual.clone(),
            passed,
            tolerance,
            timestamp: self.clock.now(),
            observed: None,
        };
        self.push_check(record)
    }

    /// Record a fully built check. It goes to the current step, when one is
    /// open, and always to the report-wide list.
    pub fn push_check(&mut self, record: CheckRecord) -> &CheckRecord {
        if !record.passed {
            self.failed = true;
        }
        match self.steps.last_mut() {
            Some(step) => step.checks.push(record.clone()),
            None => log::warn!(
                "check of {} recorded outside any step; kept in report totals only",
                record.signal
            ),
        }
        self.checks.push(record);
        &self.checks[self.checks.len() - 1]
    }

    /// Attach a note to the current step. Returns whether a step was open.
    pub fn record_note(&mut self, text: &str, level: NoteLevel) -> bool {
        let timestamp = self.clock.now();
        let Some(step) = self.steps.last_mut() else {
            log::warn!("note outside any step dropped: {text}");
            return false;
        };
        step.notes.push(Note {
            text: text.to_string(),
            level,
            timestamp,
        });
        true
    }

    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    #[must_use]
    pub fn checks(&self) -> &[CheckRecord] {
        &self.checks
    }

    /// True once any check has failed. Never reverts.
    #[must_use]
    pub const fn failed(&self) -> bool {
        self.failed
    }

    /// Snapshot the run into a report. Recording may continue afterwards.
    #[must_use]
    pub fn finalize(&self) -> ExecutionReport {
        let end_time = self.clock.now();
        let duration_secs = (end_time - self.start_time)
            .to_std()
            .map_or(0.0, |d| d.as_secs_f64());
        let total_checks = self.checks.len();
        let passed_checks = self.checks.iter().filter(|c| c.passed).count();
        ExecutionReport {
            test_name: self.test_name.clone(),
            description: self.description.clone(),
            dry_run: self.dry_run,
            start_time: self.start_time,
            end_time,
            duration_secs,
            steps: self.steps.clone(),
            checks: self.checks.clone(),
            total_checks,
            passed_checks,
            failed_checks: total_checks - passed_checks,
            failed: self.failed,
        }
    }
}
