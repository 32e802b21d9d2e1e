#![forbid(unsafe_code)]

//! Climate-control module (CCM) HIL test harness.
//!
//! Scenarios drive command signals and verify status signals. In dry-run
//! mode no hardware is touched: a rule-driven response simulator predicts
//! what the controller would report, and every step is recorded into a
//! structured execution report.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use ccm_harness::prelude::*;
//!
//! # fn main() -> ccm_harness::core::errors::Result<()> {
//! let mut ctx = ScenarioContext::dry_run("max_defrost", RuleSet::builtin("max_defrost")?);
//! ctx.start_step("activate", "max defrost on");
//! ctx.set("MaxDefrostRequest", SignalValue::Int(1))?;
//! assert!(ctx.check("HVACBlowerLevelStat_BlowerLevel", SignalValue::Int(10))?);
//! let report = ctx.finish().into_result()?;
//! assert!(!report.failed);
//! # Ok(())
//! # }
//! ```

pub mod prelude;

pub mod core;
pub mod harness;
pub mod logger;
pub mod recorder;
pub mod report;
pub mod signals;
pub mod simulator;
