//! Signal access: `set`, `check`, `get` and the helpers built on them.
//!
//! Scenario code calls the same methods in both modes; the context's
//! [`Mode`] decides whether commands reach a bus and whether statuses come
//! from the bus or from the simulator.

use std::thread;
use std::time::{Duration, Instant};

use super::context::{Mode, ScenarioContext};
use crate::core::errors::{HarnessError, Result};
use crate::logger::{EventType, Severity};
use crate::recorder::{CheckRecord, NoteLevel};
use crate::signals::catalog::{ChannelPath, Direction};
use crate::signals::value::SignalValue;

/// Requests driven to zero by [`ScenarioContext::emergency_shutdown`].
pub const SAFE_SHUTDOWN: &[(&str, SignalValue)] = &[
    ("MaxDefrostRequest", SignalValue::Int(0)),
    ("HVACBlowerRequest", SignalValue::Int(0)),
    ("CabHeatManReq", SignalValue::Int(0)),
    ("ClimatePowerRequest", SignalValue::Int(0)),
];

impl ScenarioContext {
    /// Command a signal.
    ///
    /// The commanded state is always updated and the command recorded. In
    /// live mode the value is also written to the bus. An unknown name only
    /// produces a warning note. Errors are bus failures.
    pub fn set(&mut self, name: &str, value: impl Into<SignalValue>) -> Result<()> {
        let value = value.into();
        self.state.set(name, value.clone());
        self.recorder.record_set(name, &value);
        log::debug!("[{}] set {name} = {value}", self.name);

        let mut entry = self.entry(EventType::SignalSet, Severity::Info).signal(name);
        entry.value = Some(value.clone());
        entry.dry_run = Some(self.mode.is_dry_run());
        self.emit(entry);

        let path = self.resolve(name, Direction::Command);
        match self.mode {
            Mode::DryRun => {
                if self.settings.annotate {
                    self.note(&format!("DRY RUN: {name} would be set to {value}"));
                }
            }
            Mode::Live => {
                if let Some(path) = path {
                    self.write(&path, &value)?;
                }
            }
        }
        Ok(())
    }

    /// [`check_with_tolerance`](Self::check_with_tolerance) with the default
    /// tolerance.
    pub fn check(&mut self, name: &str, expected: impl Into<SignalValue>) -> Result<bool> {
        let tolerance = self.settings.default_tolerance;
        self.check_with_tolerance(name, expected, tolerance)
    }

    /// Verify a status signal and record the result.
    ///
    /// Dry-run compares the simulator's prediction for the current commanded
    /// state; a hardware reading, when a bus is attached, is kept as an
    /// annotation only, and a failed reading becomes a warning note. Live mode
    /// compares the bus reading, and an unknown name yields `false` with a
    /// warning note and no record.
    pub fn check_with_tolerance(
        &mut self,
        name: &str,
        expected: impl Into<SignalValue>,
        tolerance: f64,
    ) -> Result<bool> {
        let expected = expected.into();
        let path = self.resolve(name, Direction::Status);
        let (actual, observed) = match self.mode {
            Mode::DryRun => {
                let observed = match &path {
                    Some(path) if self.bus.is_some() => self.observe(name, path),
                    _ => None,
                };
                let predicted = self.simulator.simulate(&self.state, name, &expected);
                (predicted, observed)
            }
            Mode::Live => {
                let Some(path) = path else {
                    return Ok(false);
                };
                (self.read(&path)?, None)
            }
        };
        let passed = actual.within_tolerance(&expected, tolerance);
        self.record_check(name, expected, actual, passed, tolerance, observed);
        Ok(passed)
    }

    /// Check that fails the scenario in live mode.
    ///
    /// Returns `CheckMismatch` on a live failure; dry-run only records it.
    pub fn require(
        &mut self,
        name: &str,
        expected: impl Into<SignalValue>,
        tolerance: f64,
    ) -> Result<bool> {
        let expected = expected.into();
        let passed = self.check_with_tolerance(name, expected.clone(), tolerance)?;
        if !passed && self.mode == Mode::Live {
            let actual = self
                .recorder
                .checks()
                .last()
                .filter(|c| c.signal == name)
                .map_or_else(|| "unresolved".to_string(), |c| c.actual.to_string());
            let err = HarnessError::CheckMismatch {
                scenario: self.name.clone(),
                failed_checks: 1,
                first: format!("{name} expected {expected} got {actual}"),
            };
            self.emit_error(&err);
            return Err(err);
        }
        Ok(passed)
    }

    /// Live reading of a signal, or `default` when it cannot be read.
    ///
    /// Never consults the commanded state or the simulator, so in a dry run
    /// without a bus this always returns `default`.
    pub fn get(&mut self, name: &str, default: impl Into<SignalValue>) -> SignalValue {
        let default = default.into();
        let (Some(catalog), true) = (&self.catalog, self.bus.is_some()) else {
            return default;
        };
        let path = catalog
            .resolve(name, Direction::Status)
            .or_else(|_| catalog.resolve(name, Direction::Command))
            .map(|d| d.path.clone());
        let Ok(path) = path else {
            log::debug!("[{}] get {name}: not in catalog, using {default}", self.name);
            return default;
        };
        match self.read(&path) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("[{}] get {name} failed, using {default}: {e}", self.name);
                default
            }
        }
    }

    /// Wait until a status reaches `expected` or `timeout` elapses, then
    /// record one check.
    ///
    /// Live mode polls the bus every poll interval. Dry-run asks the
    /// simulator once; since predictions only change with commands, an
    /// unmet condition advances the simulated clock by the full timeout.
    pub fn wait_for(
        &mut self,
        name: &str,
        expected: impl Into<SignalValue>,
        tolerance: f64,
        timeout: Duration,
    ) -> Result<bool> {
        let expected = expected.into();
        let path = self.resolve(name, Direction::Status);

        let (actual, passed, waited) = match self.mode {
            Mode::DryRun => {
                let predicted = self.simulator.simulate(&self.state, name, &expected);
                let passed = predicted.within_tolerance(&expected, tolerance);
                let waited = if passed { Duration::ZERO } else { timeout };
                self.advance_simulated_time(waited);
                (predicted, passed, waited)
            }
            Mode::Live => {
                let Some(path) = path else {
                    return Ok(false);
                };
                self.poll(&path, &expected, tolerance, timeout)?
            }
        };

        let mut entry = self.entry(EventType::Wait, Severity::Info).signal(name);
        entry.duration_ms = Some(u64::try_from(waited.as_millis()).unwrap_or(u64::MAX));
        entry.passed = Some(passed);
        self.emit(entry);
        if !passed {
            self.add_note(
                &format!(
                    "Timed out after {} ms waiting for {name} == {expected}",
                    timeout.as_millis()
                ),
                NoteLevel::Warning,
            );
        }
        self.record_check(name, expected, actual, passed, tolerance, None);
        Ok(passed)
    }

    /// Raise `name` to `target` in `steps` equal increments, waiting `delay`
    /// after each, starting from 0.
    pub fn ramp(&mut self, name: &str, target: i64, steps: u32, delay: Duration) -> Result<()> {
        let steps = steps.max(1);
        self.note(&format!("Ramping {name} to {target} in {steps} steps"));
        for i in 0..=steps {
            let level = if i == steps {
                target
            } else {
                ramp_level(target, i, steps)
            };
            self.set(name, level)?;
            self.wait(delay);
        }
        Ok(())
    }

    /// Command each pair in order, e.g. a cool-down sequence.
    pub fn apply_safe_state(&mut self, pairs: &[(&str, SignalValue)]) -> Result<()> {
        for (name, value) in pairs {
            self.set(name, value.clone())?;
        }
        Ok(())
    }

    /// Drive every climate request in [`SAFE_SHUTDOWN`] to zero.
    pub fn emergency_shutdown(&mut self) -> Result<()> {
        self.warn("Emergency shutdown: driving climate requests to 0");
        self.apply_safe_state(SAFE_SHUTDOWN)
    }

    /// Catalog path for `name`, or `None` when there is no catalog or the
    /// name is unknown. Unknown names are reported, never raised.
    fn resolve(&mut self, name: &str, direction: Direction) -> Option<ChannelPath> {
        let resolved = self
            .catalog
            .as_ref()?
            .resolve(name, direction)
            .map(|d| d.path.clone());
        match resolved {
            Ok(path) => Some(path),
            Err(missing) => {
                let entry = self
                    .entry(EventType::SignalNotFound, Severity::Warning)
                    .signal(name)
                    .details(missing.to_string());
                self.emit(entry);
                self.warn(&format!("WARNING: Signal '{name}' not found"));
                None
            }
        }
    }

    fn write(&mut self, path: &ChannelPath, value: &SignalValue) -> Result<()> {
        let result = match self.bus.as_mut() {
            Some(bus) => bus.write(path, value),
            None => Err(HarnessError::connection("no HIL bus attached")),
        };
        if let Err(e) = &result {
            self.emit_error(e);
        }
        result
    }

    fn read(&mut self, path: &ChannelPath) -> Result<SignalValue> {
        let result = match self.bus.as_mut() {
            Some(bus) => bus.read(path),
            None => Err(HarnessError::connection("no HIL bus attached")),
        };
        if let Err(e) = &result {
            self.emit_error(e);
        }
        result
    }

    /// Hardware reading kept beside a dry-run prediction. A failed read only
    /// costs the annotation.
    fn observe(&mut self, name: &str, path: &ChannelPath) -> Option<SignalValue> {
        match self.read(path) {
            Ok(value) => Some(value),
            Err(e) => {
                self.warn(&format!("Hardware read of {name} failed: {e}"));
                None
            }
        }
    }

    fn poll(
        &mut self,
        path: &ChannelPath,
        expected: &SignalValue,
        tolerance: f64,
        timeout: Duration,
    ) -> Result<(SignalValue, bool, Duration)> {
        let started = Instant::now();
        loop {
            let actual = self.read(path)?;
            if actual.within_tolerance(expected, tolerance) {
                return Ok((actual, true, started.elapsed()));
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Ok((actual, false, elapsed));
            }
            thread::sleep(self.settings.poll_interval.min(timeout - elapsed));
        }
    }

    fn record_check(
        &mut self,
        name: &str,
        expected: SignalValue,
        actual: SignalValue,
        passed: bool,
        tolerance: f64,
        observed: Option<SignalValue>,
    ) {
        log::debug!(
            "[{}] check {name}: expected {expected}, got {actual} -> {}",
            self.name,
            if passed { "pass" } else { "FAIL" }
        );
        let mut entry = self
            .entry(EventType::SignalCheck, Severity::Info)
            .signal(name);
        if !passed {
            entry.severity = Severity::Warning;
        }
        entry.expected = Some(expected.clone());
        entry.actual = Some(actual.clone());
        entry.passed = Some(passed);
        entry.tolerance = Some(tolerance);
        entry.dry_run = Some(self.mode.is_dry_run());
        self.emit(entry);

        let annotation = observed
            .as_ref()
            .filter(|_| self.settings.annotate)
            .map(|v| format!("Actual hardware value: {v}"));
        let record = CheckRecord {
            signal: name.to_string(),
            expected,
            actual,
            passed,
            tolerance: Some(tolerance),
            timestamp: self.recorder.now(),
            observed,
        };
        self.recorder.push_check(record);
        if let Some(text) = annotation {
            self.note(&text);
        }
    }
}

/// Level at step `i` of `steps` toward `target`, truncated toward zero.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn ramp_level(target: i64, i: u32, steps: u32) -> i64 {
    let target_f = target as f64;
    (target_f * f64::from(i) / f64::from(steps)).trunc() as i64
}
