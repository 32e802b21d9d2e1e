//! Declarative scenario files and their runner.
//!
//! ```toml
//! name = "max_defrost_override"
//! description = "Max defrost forces blower level 10"
//! rules = "builtin:max_defrost"
//!
//! [[steps]]
//! name = "activate"
//! actions = [
//!   { set = "MaxDefrostRequest", value = 1 },
//!   { wait_ms = 500 },
//!   { check = "HVACBlowerLevelStat_BlowerLevel", expected = 10 },
//! ]
//! ```

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::context::ScenarioContext;
use crate::core::errors::{HarnessError, Result};
use crate::signals::value::SignalValue;
use crate::simulator::RuleSet;

/// One scenario file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// `builtin:<name>` or a path relative to the scenario file.
    #[serde(default)]
    pub rules: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
    /// Directory the file was loaded from; rule paths resolve against it.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// A single scenario action. The key naming the signal selects the kind;
/// any key the kind does not know rejects the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Action {
    Set(SetAction),
    Check(CheckAction),
    Require(RequireAction),
    WaitFor(WaitForAction),
    Wait(WaitAction),
    Ramp(RampAction),
    Note(NoteAction),
    EmergencyShutdown(EmergencyShutdownAction),
    ResetState(ResetStateAction),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetAction {
    pub set: String,
    pub value: SignalValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckAction {
    pub check: String,
    pub expected: SignalValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
}

/// Like a check, but a live failure stops the scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequireAction {
    pub require: String,
    pub expected: SignalValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitForAction {
    pub wait_for: String,
    pub expected: SignalValue,
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitAction {
    pub wait_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RampAction {
    pub ramp: String,
    pub target: i64,
    pub steps: u32,
    #[serde(default)]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoteAction {
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmergencyShutdownAction {
    pub emergency_shutdown: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetStateAction {
    pub reset_state: bool,
}

impl Action {
    /// Per-action tolerance, for the kinds that compare a value.
    #[must_use]
    pub const fn tolerance(&self) -> Option<f64> {
        match self {
            Self::Check(a) => a.tolerance,
            Self::Require(a) => a.tolerance,
            Self::WaitFor(a) => a.tolerance,
            _ => None,
        }
    }
}

impl Scenario {
    /// Parse and validate a scenario file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
        let mut scenario = Self::parse(&path.display().to_string(), &raw)?;
        scenario.base_dir = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok(scenario)
    }

    /// Parse and validate TOML text. Rule paths resolve against the current
    /// directory.
    pub fn parse(source_name: &str, raw: &str) -> Result<Self> {
        let invalid = |details: String| HarnessError::InvalidScenario {
            source_name: source_name.to_string(),
            details,
        };
        let scenario: Self = toml::from_str(raw).map_err(|e| invalid(e.to_string()))?;
        scenario.validate().map_err(invalid)?;
        Ok(Self {
            base_dir: PathBuf::from("."),
            ..scenario
        })
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("scenario name is empty".to_string());
        }
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err("step with empty name".to_string());
            }
            for action in &step.actions {
                if let Action::Ramp(RampAction { ramp, steps: 0, .. }) = action {
                    return Err(format!("step '{}': ramp of {ramp} needs steps >= 1", step.name));
                }
                if let Some(t) = action.tolerance()
                    && (!t.is_finite() || t < 0.0)
                {
                    return Err(format!(
                        "step '{}': tolerance must be finite and >= 0, got {t}",
                        step.name
                    ));
                }
            }
        }
        Ok(())
    }

    /// Rule set named by the file, or an empty one when it names none.
    pub fn rule_set(&self) -> Result<RuleSet> {
        match &self.rules {
            Some(reference) => RuleSet::from_reference(reference, &self.base_dir),
            None => Ok(RuleSet::empty("none")),
        }
    }
}

/// Execute every step of `scenario` against `ctx`, in order.
///
/// Failing checks do not stop the run. Errors are connection failures and,
/// in live mode, failed `require` actions.
pub fn run_scenario(scenario: &Scenario, ctx: &mut ScenarioContext) -> Result<()> {
    let default_tolerance = ctx.settings.default_tolerance;
    for step in &scenario.steps {
        ctx.start_step(&step.name, &step.description);
        for action in &step.actions {
            match action {
                Action::Set(a) => ctx.set(&a.set, a.value.clone())?,
                Action::Check(a) => {
                    ctx.check_with_tolerance(
                        &a.check,
                        a.expected.clone(),
                        a.tolerance.unwrap_or(default_tolerance),
                    )?;
                }
                Action::Require(a) => {
                    ctx.require(
                        &a.require,
                        a.expected.clone(),
                        a.tolerance.unwrap_or(default_tolerance),
                    )?;
                }
                Action::WaitFor(a) => {
                    ctx.wait_for(
                        &a.wait_for,
                        a.expected.clone(),
                        a.tolerance.unwrap_or(default_tolerance),
                        Duration::from_millis(a.timeout_ms),
                    )?;
                }
                Action::Wait(a) => ctx.wait(Duration::from_millis(a.wait_ms)),
                Action::Ramp(a) => {
                    ctx.ramp(&a.ramp, a.target, a.steps, Duration::from_millis(a.delay_ms))?;
                }
                Action::Note(a) => ctx.note(&a.note),
                Action::EmergencyShutdown(a) => {
                    if a.emergency_shutdown {
                        ctx.emergency_shutdown()?;
                    }
                }
                Action::ResetState(a) => {
                    if a.reset_state {
                        ctx.reset_state();
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFROST: &str = r#"
name = "max_defrost_override"
description = "Max defrost forces blower level 10"
rules = "builtin:max_defrost"

[[steps]]
name = "baseline"
actions = [
  { set = "HVACBlowerRequest", value = 3 },
  { check = "HVACBlowerLevelStat_BlowerLevel", expected = 3 },
]

[[steps]]
name = "activate"
description = "max defrost on"
actions = [
  { set = "MaxDefrostRequest", value = 1 },
  { wait_ms = 500 },
  { check = "HVACBlowerLevelStat_BlowerLevel", expected = 10 },
  { wait_for = "AirRecirculationStatus", expected = 0, timeout_ms = 2000 },
  { note = "override active" },
]
"#;

    #[test]
    fn actions_parse_by_key() {
        let s = Scenario::parse("defrost.toml", DEFROST).unwrap();
        assert_eq!(s.steps.len(), 2);
        assert_eq!(
            s.steps[1].actions[0],
            Action::Set(SetAction {
                set: "MaxDefrostRequest".to_string(),
                value: SignalValue::Int(1)
            })
        );
        assert_eq!(s.steps[1].actions[1], Action::Wait(WaitAction { wait_ms: 500 }));
        assert!(matches!(
            &s.steps[1].actions[3],
            Action::WaitFor(WaitForAction { timeout_ms: 2000, .. })
        ));
    }

    #[test]
    fn runs_end_to_end_in_dry_run() {
        let s = Scenario::parse("defrost.toml", DEFROST).unwrap();
        let mut ctx = ScenarioContext::builder(&s.name)
            .description(&s.description)
            .rules(s.rule_set().unwrap())
            .build()
            .unwrap();
        run_scenario(&s, &mut ctx).unwrap();
        let report = ctx.finish().into_result().unwrap();
        assert_eq!(report.steps.len(), 2);
        assert_eq!(report.total_checks, 3);
        assert!(!report.failed);
        assert!((report.duration_secs - 0.5).abs() < 1e-9);
    }

    #[test]
    fn dry_run_failures_still_complete() {
        let raw = DEFROST.replace("expected = 10", "expected = 31");
        let s = Scenario::parse("diverged.toml", &raw).unwrap();
        let mut ctx = ScenarioContext::builder(&s.name)
            .rules(s.rule_set().unwrap())
            .build()
            .unwrap();
        run_scenario(&s, &mut ctx).unwrap();
        let outcome = ctx.finish();
        assert!(!outcome.passed());
        let report = outcome.into_result().unwrap();
        assert_eq!(report.failed_checks, 1);
    }

    #[test]
    fn unknown_action_shape_rejected() {
        let raw = r#"
name = "bad"
[[steps]]
name = "s"
actions = [{ sett = "X", value = 1 }]
"#;
        let err = Scenario::parse("bad.toml", raw).unwrap_err();
        assert_eq!(err.code(), "CCMH-1103");
    }

    #[test]
    fn misspelled_action_key_rejected() {
        for action in [
            r#"{ check = "X", expected = 1, tolernce = 5 }"#,
            r#"{ set = "X", value = 1, vlaue = 2 }"#,
            r#"{ wait_for = "X", expected = 1, timeout_ms = 10, timeout = 20 }"#,
            r#"{ ramp = "X", target = 5, steps = 2, delay = 10 }"#,
        ] {
            let raw = format!("name = \"bad\"\n[[steps]]\nname = \"s\"\nactions = [{action}]\n");
            let err = Scenario::parse("bad.toml", &raw).unwrap_err();
            assert_eq!(err.code(), "CCMH-1103", "accepted {action}");
        }
    }

    #[test]
    fn optional_action_keys_default() {
        let raw = r#"
name = "ok"
[[steps]]
name = "s"
actions = [
  { check = "X", expected = 1 },
  { ramp = "Y", target = 5, steps = 2 },
]
"#;
        let s = Scenario::parse("ok.toml", raw).unwrap();
        assert_eq!(s.steps[0].actions[0].tolerance(), None);
        assert_eq!(
            s.steps[0].actions[1],
            Action::Ramp(RampAction {
                ramp: "Y".to_string(),
                target: 5,
                steps: 2,
                delay_ms: 0
            })
        );
    }

    #[test]
    fn negative_tolerance_rejected() {
        let raw = r#"
name = "bad"
[[steps]]
name = "s"
actions = [{ check = "X", expected = 1, tolerance = -1.0 }]
"#;
        let err = Scenario::parse("bad.toml", raw).unwrap_err();
        assert!(err.to_string().contains("tolerance"));
    }

    #[test]
    fn zero_step_ramp_rejected() {
        let raw = r#"
name = "bad"
[[steps]]
name = "s"
actions = [{ ramp = "HVACBlowerRequest", target = 10, steps = 0 }]
"#;
        assert!(Scenario::parse("bad.toml", raw).is_err());
    }

    #[test]
    fn rules_resolve_relative_to_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("cabin.toml"),
            "[[mirrors]]\nstatus = \"CabHeatManStatus\"\nrequest = \"CabHeatManReq\"\n",
        )
        .unwrap();
        let path = dir.path().join("scenario.toml");
        fs::write(&path, "name = \"cabin\"\nrules = \"cabin.toml\"\n").unwrap();
        let s = Scenario::load(&path).unwrap();
        assert_eq!(s.rule_set().unwrap().name(), "cabin");
    }

    #[test]
    fn missing_rules_means_pure_fallback() {
        let s = Scenario::parse("plain.toml", "name = \"plain\"\n").unwrap();
        assert!(s.rule_set().unwrap().is_empty());
    }
}
