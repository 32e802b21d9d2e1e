//! Report data model consumed by report writers.
//!
//! Field names and nesting follow the reporter contract: a report holds
//! steps, each step holds `sets`, `checks` and optional `notes`, and every
//! check is also listed in the report-wide `checks`.

#![allow(missing_docs)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signals::value::SignalValue;

/// A commanded value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRecord {
    pub signal: String,
    pub value: SignalValue,
    pub timestamp: DateTime<Utc>,
}

/// A verified value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub signal: String,
    pub expected: SignalValue,
    /// Live reading in live mode, simulator prediction in dry-run.
    pub actual: SignalValue,
    pub passed: bool,
    pub tolerance: Option<f64>,
    pub timestamp: DateTime<Utc>,
    /// Hardware reading taken alongside a dry-run prediction. Never affects
    /// `passed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<SignalValue>,
}

/// Severity of a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NoteLevel {
    #[default]
    Info,
    Warning,
}

/// Free-text annotation on a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub text: String,
    #[serde(default)]
    pub level: NoteLevel,
    pub timestamp: DateTime<Utc>,
}

/// One scenario step with its nested events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub sets: Vec<SetRecord>,
    pub checks: Vec<CheckRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<Note>,
}

/// Finalized record of one scenario run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub test_name: String,
    pub description: String,
    pub dry_run: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_secs: f64,
    pub steps: Vec<Step>,
    pub checks: Vec<CheckRecord>,
    pub total_checks: usize,
    pub passed_checks: usize,
    pub failed_checks: usize,
    pub failed: bool,
}

impl ExecutionReport {
    /// Failing checks in execution order.
    pub fn failures(&self) -> impl Iterator<Item = &CheckRecord> {
        self.checks.iter().filter(|c| !c.passed)
    }

    /// Warning notes across all steps.
    pub fn warnings(&self) -> impl Iterator<Item = &Note> {
        self.steps
            .iter()
            .flat_map(|s| s.notes.iter())
            .filter(|n| n.level == NoteLevel::Warning)
    }
}
