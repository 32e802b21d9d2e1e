//! Response simulator: predicts controller status values from the commanded
//! state.

use super::rules::Rule;
use super::ruleset::RuleSet;
use crate::signals::store::SignalStore;
use crate::signals::value::SignalValue;

/// Outcome of one prediction, with the rule that produced it.
#[derive(Debug, Clone)]
pub struct Prediction<'a> {
    /// Predicted status value.
    pub value: SignalValue,
    /// `None` when no rule matched and the expected value was echoed back.
    pub rule: Option<&'a Rule>,
}

impl Prediction<'_> {
    /// Whether the prediction came from the expected-value fallback.
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        self.rule.is_none()
    }
}

/// Deterministic model of the controller's reported statuses.
///
/// A prediction depends only on the rule table and the state passed in. The
/// first rule for the queried signal whose guard holds supplies the value;
/// when none does, the expected value is returned unchanged so that
/// unmodeled signals never block a dry run.
#[derive(Debug, Clone)]
pub struct ResponseSimulator {
    rules: RuleSet,
}

impl ResponseSimulator {
    /// Simulator over a compiled rule table.
    #[must_use]
    pub const fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    /// Simulator with the built-in maximum-defrost rules.
    pub fn max_defrost() -> crate::core::errors::Result<Self> {
        RuleSet::builtin("max_defrost").map(Self::new)
    }

    /// Rule table in use.
    #[must_use]
    pub const fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Predicted value of `signal` for the given state.
    #[must_use]
    pub fn simulate(&self, state: &SignalStore, signal: &str, expected: &SignalValue) -> SignalValue {
        self.explain(state, signal, expected).value
    }

    /// Like [`simulate`](Self::simulate), also reporting the matching rule.
    #[must_use]
    pub fn explain<'a>(
        &'a self,
        state: &SignalStore,
        signal: &str,
        expected: &SignalValue,
    ) -> Prediction<'a> {
        self.rules
            .rules_for(signal)
            .find_map(|rule| rule.apply(state).map(|value| Prediction { value, rule: Some(rule) }))
            .unwrap_or_else(|| Prediction {
                value: expected.clone(),
                rule: None,
            })
    }

    /// Whether any rule answers for `signal`.
    #[must_use]
    pub fn is_modeled(&self, signal: &str) -> bool {
        self.rules.is_modeled(signal)
    }
}

impl Default for ResponseSimulator {
    /// Empty rule table: every prediction echoes the expected value.
    fn default() -> Self {
        Self::new(RuleSet::empty("empty"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::rules::{Compute, Condition, Guard, Rule, RuleOrigin};

    const BLOWER: &str = "HVACBlowerLevelStat_BlowerLevel";

    fn sim() -> ResponseSimulator {
        ResponseSimulator::max_defrost().unwrap()
    }

    #[test]
    fn override_beats_own_request() {
        let sim = sim();
        let mut s = SignalStore::new();
        s.set("HVACBlowerRequest", SignalValue::Int(3));
        s.set("MaxDefrostRequest", SignalValue::Int(1));
        let p = sim.explain(&s, BLOWER, &SignalValue::Int(10));
        assert_eq!(p.value, SignalValue::Int(10));
        assert_eq!(
            p.rule.map(|r| r.origin.clone()),
            Some(RuleOrigin::Override("max_defrost".to_string()))
        );
    }

    #[test]
    fn status_mirrors_request_without_override() {
        let sim = sim();
        let mut s = SignalStore::new();
        s.set("MaxDefrostRequest", SignalValue::Int(0));
        s.set("HVACBlowerRequest", SignalValue::Int(3));
        assert_eq!(sim.simulate(&s, BLOWER, &SignalValue::Int(99)), SignalValue::Int(3));
    }

    #[test]
    fn blower_defaults_to_one_when_never_requested() {
        assert_eq!(
            sim().simulate(&SignalStore::new(), BLOWER, &SignalValue::Int(7)),
            SignalValue::Int(1)
        );
    }

    #[test]
    fn unmodeled_signal_echoes_expected() {
        let sim = sim();
        let store = SignalStore::new();
        let p = sim.explain(&store, "UnknownSignal", &SignalValue::Int(42));
        assert!(p.is_fallback());
        assert_eq!(p.value, SignalValue::Int(42));
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = RuleSet::empty("order")
            .with_rule(Rule::new(
                "StatusA",
                Guard::Conditions {
                    when: vec![Condition::eq("Mode", 1)],
                    unless: vec![],
                },
                Compute::Constant(SignalValue::Int(10)),
            ))
            .with_rule(Rule::new(
                "StatusA",
                Guard::Always,
                Compute::Mirror {
                    source: "ReqA".to_string(),
                    default: SignalValue::Int(1),
                },
            ));
        let sim = ResponseSimulator::new(rules);
        let mut s = SignalStore::new();
        s.set("Mode", SignalValue::Int(1));
        s.set("ReqA", SignalValue::Int(3));
        assert_eq!(sim.simulate(&s, "StatusA", &SignalValue::Int(0)), SignalValue::Int(10));
        s.set("Mode", SignalValue::Int(0));
        assert_eq!(sim.simulate(&s, "StatusA", &SignalValue::Int(0)), SignalValue::Int(3));
    }

    #[test]
    fn empty_simulator_always_falls_back() {
        let sim = ResponseSimulator::default();
        assert!(!sim.is_modeled(BLOWER));
        assert_eq!(
            sim.simulate(&SignalStore::new(), BLOWER, &SignalValue::Float(2.5)),
            SignalValue::Float(2.5)
        );
    }
}
