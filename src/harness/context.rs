//! Scenario context: the explicit bundle of mode, commanded state, simulator,
//! recorder and collaborators that every accessor call goes through.

use std::fmt;
use std::thread;
use std::time::Duration;

use crate::core::config::ExecutionConfig;
use crate::core::errors::{HarnessError, Result};
use crate::logger::{EventLog, EventType, LogEntry, Severity};
use crate::recorder::{Clock, ExecutionRecorder, ExecutionReport, NoteLevel};
use crate::signals::bus::LiveBus;
use crate::signals::catalog::SignalCatalog;
use crate::signals::store::SignalStore;
use crate::simulator::{ResponseSimulator, RuleSet};

/// Execution mode, fixed for the lifetime of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Commands are recorded and statuses predicted.
    DryRun,
    /// Commands go to the bus and statuses are read back.
    Live,
}

impl Mode {
    #[must_use]
    pub const fn from_dry_run(dry_run: bool) -> Self {
        if dry_run { Self::DryRun } else { Self::Live }
    }

    #[must_use]
    pub const fn is_dry_run(self) -> bool {
        matches!(self, Self::DryRun)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DryRun => "dry-run",
            Self::Live => "live",
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) default_tolerance: f64,
    pub(crate) poll_interval: Duration,
    pub(crate) annotate: bool,
}

/// Everything one scenario run reads and writes.
///
/// Each scenario owns its context, so independent scenarios can run side by
/// side without sharing state.
pub struct ScenarioContext {
    pub(crate) name: String,
    pub(crate) mode: Mode,
    pub(crate) state: SignalStore,
    pub(crate) simulator: ResponseSimulator,
    pub(crate) recorder: ExecutionRecorder,
    pub(crate) catalog: Option<Box<dyn SignalCatalog>>,
    pub(crate) bus: Option<Box<dyn LiveBus>>,
    pub(crate) events: Option<EventLog>,
    pub(crate) settings: Settings,
}

impl ScenarioContext {
    /// Start configuring a context for the scenario `name`.
    #[must_use]
    pub fn builder(name: &str) -> ScenarioContextBuilder {
        ScenarioContextBuilder::new(name)
    }

    /// Dry-run context with the given rules and no collaborators.
    #[must_use]
    pub fn dry_run(name: &str, rules: RuleSet) -> Self {
        Self::builder(name).rules(rules).assemble(Mode::DryRun)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Commanded state as written by `set`.
    #[must_use]
    pub const fn state(&self) -> &SignalStore {
        &self.state
    }

    #[must_use]
    pub const fn simulator(&self) -> &ResponseSimulator {
        &self.simulator
    }

    #[must_use]
    pub const fn recorder(&self) -> &ExecutionRecorder {
        &self.recorder
    }

    /// Open a new step; later sets, checks and notes attach to it.
    pub fn start_step(&mut self, name: &str, description: &str) {
        log::debug!("[{}] step: {name}", self.name);
        self.recorder.start_step(name, description);
        let mut entry = self.entry(EventType::StepStart, Severity::Info);
        if !description.is_empty() {
            entry = entry.details(description);
        }
        self.emit(entry);
    }

    /// Informational note on the current step.
    pub fn note(&mut self, text: &str) {
        self.add_note(text, NoteLevel::Info);
    }

    /// Warning note on the current step, echoed to the console.
    pub fn warn(&mut self, text: &str) {
        log::warn!("[{}] {text}", self.name);
        self.add_note(text, NoteLevel::Warning);
    }

    pub(crate) fn add_note(&mut self, text: &str, level: NoteLevel) {
        self.recorder.record_note(text, level);
        let severity = match level {
            NoteLevel::Info => Severity::Info,
            NoteLevel::Warning => Severity::Warning,
        };
        let entry = self.entry(EventType::Note, severity).details(text);
        self.emit(entry);
    }

    /// Move the simulated clock forward without sleeping. A wall clock is
    /// unaffected.
    pub fn advance_simulated_time(&mut self, by: Duration) {
        self.recorder.advance(by);
    }

    /// Let the controller settle. Dry-run, or any run on a simulated clock,
    /// advances the clock; a live run on the wall clock sleeps.
    pub fn wait(&mut self, by: Duration) {
        let mut entry = self.entry(EventType::Wait, Severity::Info);
        entry.duration_ms = Some(u64::try_from(by.as_millis()).unwrap_or(u64::MAX));
        self.emit(entry);
        if self.mode.is_dry_run() || self.recorder.clock().is_simulated() {
            self.advance_simulated_time(by);
        } else {
            thread::sleep(by);
        }
    }

    /// Clear the commanded state. Nothing else clears it.
    pub fn reset_state(&mut self) {
        self.state.reset();
        self.note("Simulated state reset");
    }

    /// Close the run and produce its report.
    #[must_use]
    pub fn finish(self) -> ScenarioOutcome {
        let report = self.recorder.finalize();
        let mut entry = self.entry(EventType::ScenarioFinish, Severity::Info);
        entry.passed = Some(!report.failed);
        entry.duration_ms = Some(secs_to_ms(report.duration_secs));
        entry = entry.details(format!(
            "{}/{} checks passed",
            report.passed_checks, report.total_checks
        ));
        self.emit(entry);
        if let Some(events) = &self.events {
            events.flush();
        }
        log::debug!(
            "[{}] finished: {} checks, {} failed",
            self.name,
            report.total_checks,
            report.failed_checks
        );
        ScenarioOutcome {
            mode: self.mode,
            report,
        }
    }

    pub(crate) fn entry(&self, event: EventType, severity: Severity) -> LogEntry {
        LogEntry::new(event, severity)
            .scenario(&self.name)
            .step(self.recorder.current_step())
    }

    pub(crate) fn emit(&self, entry: LogEntry) {
        if let Some(events) = &self.events {
            events.log(&entry);
        }
    }

    pub(crate) fn emit_error(&self, err: &HarnessError) {
        if let Some(events) = &self.events {
            events.log(
                &LogEntry::from_error(err)
                    .scenario(&self.name)
                    .step(self.recorder.current_step()),
            );
        }
    }
}

impl fmt::Debug for ScenarioContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioContext")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("rules", &self.simulator.rules().name())
            .field("catalog", &self.catalog.is_some())
            .field("bus", &self.bus.is_some())
            .finish_non_exhaustive()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn secs_to_ms(secs: f64) -> u64 {
    (secs * 1000.0).round().max(0.0) as u64
}

/// Configures a [`ScenarioContext`]. The mode is decided here, once.
pub struct ScenarioContextBuilder {
    name: String,
    description: String,
    dry_run: bool,
    simulator: Option<ResponseSimulator>,
    catalog: Option<Box<dyn SignalCatalog>>,
    bus: Option<Box<dyn LiveBus>>,
    events: Option<EventLog>,
    clock: Option<Clock>,
    settings: Settings,
}

impl ScenarioContextBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            dry_run: true,
            simulator: None,
            catalog: None,
            bus: None,
            events: None,
            clock: None,
            settings: Settings {
                default_tolerance: 0.1,
                poll_interval: Duration::from_millis(100),
                annotate: true,
            },
        }
    }

    /// Take mode, tolerance, polling and annotation from configuration.
    #[must_use]
    pub fn execution(mut self, cfg: &ExecutionConfig) -> Self {
        self.dry_run = cfg.dry_run;
        self.settings.default_tolerance = cfg.default_tolerance;
        self.settings.poll_interval = Duration::from_millis(cfg.poll_interval_ms);
        self.settings.annotate = cfg.annotate_dry_run;
        self
    }

    #[must_use]
    pub fn description(mut self, text: &str) -> Self {
        self.description = text.to_string();
        self
    }

    #[must_use]
    pub const fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.simulator = Some(ResponseSimulator::new(rules));
        self
    }

    #[must_use]
    pub fn simulator(mut self, simulator: ResponseSimulator) -> Self {
        self.simulator = Some(simulator);
        self
    }

    #[must_use]
    pub fn catalog(mut self, catalog: impl SignalCatalog + 'static) -> Self {
        self.catalog = Some(Box::new(catalog));
        self
    }

    #[must_use]
    pub fn bus(mut self, bus: impl LiveBus + 'static) -> Self {
        self.bus = Some(Box::new(bus));
        self
    }

    #[must_use]
    pub fn event_log(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    /// Override the clock. Defaults: simulated for dry-run, wall for live.
    #[must_use]
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub const fn default_tolerance(mut self, tolerance: f64) -> Self {
        self.settings.default_tolerance = tolerance;
        self
    }

    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.settings.poll_interval = interval;
        self
    }

    #[must_use]
    pub const fn annotate(mut self, annotate: bool) -> Self {
        self.settings.annotate = annotate;
        self
    }

    /// Validate and build.
    ///
    /// Live mode needs both a bus and a catalog; a missing bus is a
    /// connection failure for the whole scenario.
    pub fn build(self) -> Result<ScenarioContext> {
        let mode = Mode::from_dry_run(self.dry_run);
        if mode == Mode::Live {
            if self.bus.is_none() {
                return Err(HarnessError::connection(format!(
                    "scenario '{}' runs live but no HIL bus is connected",
                    self.name
                )));
            }
            if self.catalog.is_none() {
                return Err(HarnessError::InvalidCatalog {
                    details: format!(
                        "scenario '{}' runs live but no signal catalog was provided",
                        self.name
                    ),
                });
            }
        }
        let tol = self.settings.default_tolerance;
        if !tol.is_finite() || tol < 0.0 {
            return Err(HarnessError::InvalidConfig {
                details: format!("default tolerance must be finite and >= 0, got {tol}"),
            });
        }
        Ok(self.assemble(mode))
    }

    fn assemble(self, mode: Mode) -> ScenarioContext {
        let clock = self.clock.unwrap_or_else(|| match mode {
            Mode::DryRun => Clock::simulated(),
            Mode::Live => Clock::Wall,
        });
        let recorder = ExecutionRecorder::new(&self.name, &self.description, clock, mode.is_dry_run());
        let ctx = ScenarioContext {
            name: self.name,
            mode,
            state: SignalStore::new(),
            simulator: self.simulator.unwrap_or_default(),
            recorder,
            catalog: self.catalog,
            bus: self.bus,
            events: self.events,
            settings: self.settings,
        };

        let mut entry = ctx
            .entry(EventType::ScenarioStart, Severity::Info)
            .details(format!("rules: {}", ctx.simulator.rules().name()));
        entry.dry_run = Some(mode.is_dry_run());
        ctx.emit(entry);
        log::debug!("[{}] started in {mode} mode", ctx.name);
        ctx
    }
}

/// Finished run: the report plus the mode it ran in.
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub mode: Mode,
    pub report: ExecutionReport,
}

impl ScenarioOutcome {
    /// Whether every check passed.
    #[must_use]
    pub const fn passed(&self) -> bool {
        !self.report.failed
    }

    /// Apply the mode's failure convention.
    ///
    /// Dry-run always completes; its report carries the verdict. A live run
    /// with any failing check becomes a `CheckMismatch`.
    pub fn into_result(self) -> Result<ExecutionReport> {
        if self.mode == Mode::Live && self.report.failed {
            let first = self
                .report
                .failures()
                .next()
                .map(|c| format!("{} expected {} got {}", c.signal, c.expected, c.actual))
                .unwrap_or_default();
            return Err(HarnessError::CheckMismatch {
                scenario: self.report.test_name,
                failed_checks: self.report.failed_checks,
                first,
            });
        }
        Ok(self.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::bus::MemoryBus;
    use crate::signals::catalog::{Bus, Direction, ProjectCatalog};
    use crate::signals::value::SignalValue;

    const BLOWER: &str = "HVACBlowerLevelStat_BlowerLevel";

    fn catalog() -> ProjectCatalog {
        ProjectCatalog::new().with(Bus::Can, Direction::Status, BLOWER, "CAN/IN/Blower")
    }

    fn live_builder(bus: MemoryBus) -> ScenarioContextBuilder {
        ScenarioContext::builder("live")
            .dry_run(false)
            .catalog(catalog())
            .bus(bus)
            .clock(Clock::simulated())
    }

    #[test]
    fn live_without_bus_is_connection_failure() {
        let err = ScenarioContext::builder("live")
            .dry_run(false)
            .catalog(catalog())
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "CCMH-3001");
    }

    #[test]
    fn live_without_catalog_is_invalid_catalog() {
        let err = ScenarioContext::builder("live")
            .dry_run(false)
            .bus(MemoryBus::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, HarnessError::InvalidCatalog { .. }));
        assert!(err.to_string().contains("no signal catalog"));
    }

    #[test]
    fn bad_default_tolerance_rejected() {
        for tol in [-0.1, f64::NAN, f64::INFINITY] {
            let err = ScenarioContext::builder("t")
                .default_tolerance(tol)
                .build()
                .unwrap_err();
            assert_eq!(err.code(), "CCMH-1001", "tolerance {tol}");
        }
        assert!(ScenarioContext::builder("t").default_tolerance(0.0).build().is_ok());
    }

    #[test]
    fn live_failure_becomes_check_mismatch() {
        let bus = MemoryBus::new().with_channel("CAN/IN/Blower", SignalValue::Int(4));
        let mut ctx = live_builder(bus).build().unwrap();
        ctx.start_step("s", "");
        assert!(ctx.check(BLOWER, 4).unwrap());
        assert!(!ctx.check(BLOWER, 10).unwrap());

        let outcome = ctx.finish();
        assert_eq!(outcome.mode, Mode::Live);
        assert!(!outcome.passed());
        let err = outcome.into_result().unwrap_err();
        assert_eq!(err.code(), "CCMH-2002");
        match err {
            HarnessError::CheckMismatch {
                scenario,
                failed_checks,
                first,
            } => {
                assert_eq!(scenario, "live");
                assert_eq!(failed_checks, 1);
                assert_eq!(first, format!("{BLOWER} expected 10 got 4"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn passing_live_run_yields_report() {
        let bus = MemoryBus::new().with_channel("CAN/IN/Blower", SignalValue::Int(4));
        let mut ctx = live_builder(bus).build().unwrap();
        ctx.start_step("s", "");
        assert!(ctx.check(BLOWER, 4).unwrap());
        let report = ctx.finish().into_result().unwrap();
        assert!(!report.dry_run);
        assert_eq!(report.total_checks, 1);
    }

    #[test]
    fn dry_run_failure_is_not_an_error() {
        let mut ctx = ScenarioContext::dry_run("dry", RuleSet::builtin("max_defrost").unwrap());
        ctx.start_step("s", "");
        ctx.set("MaxDefrostRequest", 1).unwrap();
        assert!(!ctx.check(BLOWER, 31).unwrap());
        let report = ctx.finish().into_result().unwrap();
        assert!(report.failed);
    }

    #[test]
    fn dry_run_shortcut_matches_builder_defaults() {
        let shortcut = ScenarioContext::dry_run("t", RuleSet::empty("none"));
        let built = ScenarioContext::builder("t").build().unwrap();
        assert_eq!(shortcut.mode(), Mode::DryRun);
        assert_eq!(shortcut.settings.default_tolerance, built.settings.default_tolerance);
        assert_eq!(shortcut.settings.poll_interval, built.settings.poll_interval);
        assert_eq!(shortcut.settings.annotate, built.settings.annotate);
        assert!(shortcut.recorder().clock().is_simulated());
    }

    #[test]
    fn live_wait_on_simulated_clock_does_not_sleep() {
        let mut ctx = live_builder(MemoryBus::new()).build().unwrap();
        let t0 = ctx.recorder().now();
        let started = std::time::Instant::now();
        ctx.wait(Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!((ctx.recorder().now() - t0).num_seconds(), 30);
    }

    #[test]
    fn live_defaults_to_wall_clock() {
        let ctx = ScenarioContext::builder("live")
            .dry_run(false)
            .catalog(catalog())
            .bus(MemoryBus::new())
            .build()
            .unwrap();
        assert!(!ctx.recorder().clock().is_simulated());
    }

    #[test]
    fn reset_clears_commanded_state() {
        let mut ctx = ScenarioContext::dry_run("t", RuleSet::empty("none"));
        ctx.start_step("s", "");
        ctx.set("HVACBlowerRequest", 3).unwrap();
        ctx.reset_state();
        assert!(ctx.state().is_empty());
        assert_eq!(
            ctx.recorder().steps()[0].notes.last().map(|n| n.text.as_str()),
            Some("Simulated state reset")
        );
    }
}
