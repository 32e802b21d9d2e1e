//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use ccm_harness::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{HarnessError, Result};

// Signals
pub use crate::signals::bus::{LiveBus, MemoryBus};
pub use crate::signals::catalog::{
    Bus, ChannelPath, Direction, ProjectCatalog, ProjectConfig, SignalCatalog, SignalDescriptor,
};
pub use crate::signals::store::SignalStore;
pub use crate::signals::value::SignalValue;

// Simulator
pub use crate::simulator::{Prediction, ResponseSimulator, RuleLibrary, RuleSet};

// Recorder
pub use crate::recorder::{Clock, ExecutionRecorder, ExecutionReport};

// Harness
pub use crate::harness::{Mode, Scenario, ScenarioContext, ScenarioOutcome, run_scenario};
