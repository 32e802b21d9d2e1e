//! Scenario execution: the dual-mode context, signal access and the
//! scenario file runner.

pub mod accessor;
pub mod context;
pub mod scenario;

pub use accessor::SAFE_SHUTDOWN;
pub use context::{Mode, ScenarioContext, ScenarioContextBuilder, ScenarioOutcome};
pub use scenario::{
    Action, CheckAction, EmergencyShutdownAction, NoteAction, RampAction, RequireAction,
    ResetStateAction, Scenario, SetAction, StepSpec, WaitAction, WaitForAction, run_scenario,
};
