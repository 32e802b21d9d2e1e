//! Rule primitives: conditions over the commanded state, guards, and value
//! computations.
//!
//! A [`Rule`] is the `(guard, signal, compute)` triple the simulator walks
//! top to bottom. Guards and computes are data for everything the rule files
//! can express; closures are available for programmatic scenarios.

use std::fmt;
use std::sync::Arc;

use crate::signals::store::SignalStore;
use crate::signals::value::SignalValue;

/// Value an unset signal reads as inside conditions and mirrors.
pub const UNSET_DEFAULT: SignalValue = SignalValue::Int(0);

/// Comparison applied to one signal's commanded value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionTest {
    Eq(SignalValue),
    Ne(SignalValue),
    In(Vec<SignalValue>),
    NotIn(Vec<SignalValue>),
}

/// A test on one signal of the commanded state.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Signal read from the store.
    pub signal: String,
    /// Comparison.
    pub test: ConditionTest,
    /// Value used when the signal was never commanded.
    pub default: SignalValue,
}

impl Condition {
    /// `signal == value`, unset reading as 0.
    #[must_use]
    pub fn eq(signal: &str, value: impl Into<SignalValue>) -> Self {
        Self {
            signal: signal.to_string(),
            test: ConditionTest::Eq(value.into()),
            default: UNSET_DEFAULT,
        }
    }

    /// `signal in values`, unset reading as 0.
    #[must_use]
    pub fn one_of(signal: &str, values: Vec<SignalValue>) -> Self {
        Self {
            signal: signal.to_string(),
            test: ConditionTest::In(values),
            default: UNSET_DEFAULT,
        }
    }

    /// Evaluate against the commanded state.
    #[must_use]
    pub fn holds(&self, state: &SignalStore) -> bool {
        let current = state.get(&self.signal).unwrap_or(&self.default);
        match &self.test {
            ConditionTest::Eq(v) => current.exact_eq(v),
            ConditionTest::Ne(v) => !current.exact_eq(v),
            ConditionTest::In(vs) => vs.iter().any(|v| current.exact_eq(v)),
            ConditionTest::NotIn(vs) => !vs.iter().any(|v| current.exact_eq(v)),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |vs: &[SignalValue]| {
            vs.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        match &self.test {
            ConditionTest::Eq(v) => write!(f, "{} == {v}", self.signal),
            ConditionTest::Ne(v) => write!(f, "{} != {v}", self.signal),
            ConditionTest::In(vs) => write!(f, "{} in [{}]", self.signal, list(vs)),
            ConditionTest::NotIn(vs) => write!(f, "{} not in [{}]", self.signal, list(vs)),
        }
    }
}

/// Predicate over the commanded state.
pub type StatePredicate = Arc<dyn Fn(&SignalStore) -> bool + Send + Sync>;

/// Value derivation from the commanded state.
pub type StateFunction = Arc<dyn Fn(&SignalStore) -> SignalValue + Send + Sync>;

/// When a rule applies.
#[derive(Clone)]
pub enum Guard {
    /// Unconditional.
    Always,
    /// Every `when` condition holds and no `unless` condition does.
    Conditions {
        when: Vec<Condition>,
        unless: Vec<Condition>,
    },
    /// Arbitrary predicate.
    Predicate(StatePredicate),
}

impl Guard {
    /// Evaluate against the commanded state.
    #[must_use]
    pub fn allows(&self, state: &SignalStore) -> bool {
        match self {
            Self::Always => true,
            Self::Conditions { when, unless } => {
                when.iter().all(|c| c.holds(state)) && !unless.iter().any(|c| c.holds(state))
            }
            Self::Predicate(p) => p(state),
        }
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("Always"),
            Self::Conditions { when, unless } => f
                .debug_struct("Conditions")
                .field("when", when)
                .field("unless", unless)
                .finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("always"),
            Self::Conditions { when, unless } => {
                let when: Vec<String> = when.iter().map(ToString::to_string).collect();
                write!(f, "{}", when.join(" && "))?;
                if !unless.is_empty() {
                    let unless: Vec<String> = unless.iter().map(ToString::to_string).collect();
                    write!(f, " unless ({})", unless.join(" || "))?;
                }
                Ok(())
            }
            Self::Predicate(_) => f.write_str("<predicate>"),
        }
    }
}

/// How a rule produces its value.
#[derive(Clone)]
pub enum Compute {
    /// Fixed value, e.g. an override constant.
    Constant(SignalValue),
    /// Last commanded value of `source`, or `default` when never set.
    Mirror { source: String, default: SignalValue },
    /// Arbitrary derivation.
    Derived(StateFunction),
}

impl Compute {
    /// Produce the value for the given state.
    #[must_use]
    pub fn evaluate(&self, state: &SignalStore) -> SignalValue {
        match self {
            Self::Constant(v) => v.clone(),
            Self::Mirror { source, default } => state.get_or(source, default),
            Self::Derived(f) => f(state),
        }
    }
}

impl fmt::Debug for Compute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(v) => f.debug_tuple("Constant").field(v).finish(),
            Self::Mirror { source, default } => f
                .debug_struct("Mirror")
                .field("source", source)
                .field("default", default)
                .finish(),
            Self::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

impl fmt::Display for Compute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(v) => write!(f, "{v}"),
            Self::Mirror { source, default } => write!(f, "last({source}, {default})"),
            Self::Derived(_) => f.write_str("<derived>"),
        }
    }
}

/// Where a rule came from, for explain output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOrigin {
    /// Forced value of a named override profile.
    Override(String),
    /// Normal status-follows-request behavior.
    Mirror,
    /// Added in code.
    Custom,
}

impl fmt::Display for RuleOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Override(name) => write!(f, "override:{name}"),
            Self::Mirror => f.write_str("mirror"),
            Self::Custom => f.write_str("custom"),
        }
    }
}

/// One `(guard, signal, compute)` entry of the rule table.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Status signal this rule answers for.
    pub signal: String,
    /// Applicability.
    pub guard: Guard,
    /// Value production.
    pub compute: Compute,
    /// Provenance.
    pub origin: RuleOrigin,
}

impl Rule {
    /// Programmatic rule.
    #[must_use]
    pub fn new(signal: &str, guard: Guard, compute: Compute) -> Self {
        Self {
            signal: signal.to_string(),
            guard,
            compute,
            origin: RuleOrigin::Custom,
        }
    }

    /// Value this rule yields for `state`, if its guard allows it.
    #[must_use]
    pub fn apply(&self, state: &SignalStore) -> Option<SignalValue> {
        self.guard
            .allows(state)
            .then(|| self.compute.evaluate(state))
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} = {} when {} [{}]",
            self.signal, self.compute, self.guard, self.origin
        )
    }
}
