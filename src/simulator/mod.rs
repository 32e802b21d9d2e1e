//! Rule-driven prediction of controller status signals for dry runs.

pub mod engine;
pub mod rules;
pub mod ruleset;

pub use engine::{Prediction, ResponseSimulator};
pub use rules::{Compute, Condition, ConditionTest, Guard, Rule, RuleOrigin};
pub use ruleset::{Divergence, DivergenceKind, RuleLibrary, RuleSet};
