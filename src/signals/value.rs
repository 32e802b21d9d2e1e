//! Typed signal values and the tolerance comparison used by every check.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A value carried by a bus signal.
///
/// `Bool`, `Int` and `Text` are discrete; `Float` is continuous. The variant
/// decides how a check compares it (see [`SignalValue::within_tolerance`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    /// On/off style signal.
    Bool(bool),
    /// Levels, enum codes, positions.
    Int(i64),
    /// Temperatures and other continuous quantities.
    Float(f64),
    /// Symbolic enum label that has no numeric mapping.
    Text(String),
}

impl SignalValue {
    /// Whether this value is compared with exact equality.
    #[must_use]
    pub const fn is_discrete(&self) -> bool {
        !matches!(self, Self::Float(_))
    }

    /// Numeric view of the value. `Bool` maps to 0/1, `Text` has none.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(_) => None,
        }
    }

    /// Integer view for discrete numerics.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(i) => Some(*i),
            Self::Float(_) | Self::Text(_) => None,
        }
    }

    /// Exact equality with Bool/Int coercion. Text only equals text.
    #[must_use]
    pub fn exact_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Text(_), _) | (_, Self::Text(_)) => false,
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x == y,
                _ => a.as_f64() == b.as_f64(),
            },
        }
    }

    /// Pass/fail comparison for a check.
    ///
    /// If either side is continuous the comparison is `|a - b| <= tolerance`;
    /// otherwise it is exact equality and the tolerance is ignored.
    #[must_use]
    pub fn within_tolerance(&self, expected: &Self, tolerance: f64) -> bool {
        if self.is_discrete() && expected.is_discrete() {
            return self.exact_eq(expected);
        }
        match (self.as_f64(), expected.as_f64()) {
            (Some(a), Some(b)) => (a - b).abs() <= tolerance,
            _ => false,
        }
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl FromStr for SignalValue {
    type Err = std::convert::Infallible;

    /// Parse a command-line literal: `true`/`false`, integers, floats, else text.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(b) = trimmed.parse::<bool>() {
            return Ok(Self::Bool(b));
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Ok(Self::Int(i));
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return Ok(Self::Float(f));
        }
        Ok(Self::Text(trimmed.to_string()))
    }
}

impl From<bool> for SignalValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SignalValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for SignalValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for SignalValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SignalValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SignalValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_comparison_ignores_tolerance() {
        let on = SignalValue::Int(1);
        assert!(on.within_tolerance(&SignalValue::Int(1), 0.1));
        assert!(!SignalValue::Int(0).within_tolerance(&on, 0.1));
        // Even a generous tolerance gives no partial credit.
        assert!(!SignalValue::Int(0).within_tolerance(&on, 5.0));
    }

    #[test]
    fn continuous_comparison_uses_tolerance() {
        let expected = SignalValue::Float(21.5);
        assert!(SignalValue::Float(21.55).within_tolerance(&expected, 0.1));
        assert!(!SignalValue::Float(21.7).within_tolerance(&expected, 0.1));
        // An integer prediction against a float expectation is continuous.
        assert!(SignalValue::Int(22).within_tolerance(&expected, 0.5));
    }

    #[test]
    fn bool_and_int_coerce() {
        assert!(SignalValue::Bool(true).within_tolerance(&SignalValue::Int(1), 0.0));
        assert!(!SignalValue::Bool(false).within_tolerance(&SignalValue::Int(1), 0.0));
    }

    #[test]
    fn text_only_matches_text() {
        let a = SignalValue::from("Running");
        assert!(a.within_tolerance(&SignalValue::from("Running"), 0.1));
        assert!(!a.within_tolerance(&SignalValue::Int(6), 0.1));
        assert!(!SignalValue::Float(1.0).within_tolerance(&a, 10.0));
    }

    #[test]
    fn parses_cli_literals() {
        assert_eq!("1".parse::<SignalValue>().unwrap(), SignalValue::Int(1));
        assert_eq!("21.5".parse::<SignalValue>().unwrap(), SignalValue::Float(21.5));
        assert_eq!("true".parse::<SignalValue>().unwrap(), SignalValue::Bool(true));
        assert_eq!(
            "Running".parse::<SignalValue>().unwrap(),
            SignalValue::Text("Running".to_string())
        );
    }

    #[test]
    fn deserializes_untagged_from_toml() {
        #[derive(Deserialize)]
        struct Probe {
            a: SignalValue,
            b: SignalValue,
            c: SignalValue,
            d: SignalValue,
        }
        let probe: Probe = toml::from_str("a = 1\nb = 2.5\nc = true\nd = \"On\"").unwrap();
        assert_eq!(probe.a, SignalValue::Int(1));
        assert_eq!(probe.b, SignalValue::Float(2.5));
        assert_eq!(probe.c, SignalValue::Bool(true));
        assert_eq!(probe.d, SignalValue::Text("On".to_string()));
    }
}
