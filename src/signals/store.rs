//! Last-commanded signal state shared by the accessor and the simulator.

use std::collections::HashMap;

use serde::Serialize;

use super::value::SignalValue;

/// Map from signal name to its last commanded value.
///
/// Only [`SignalStore::set`] mutates it and nothing clears it implicitly;
/// "previous state" checks across steps depend on that.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignalStore {
    values: HashMap<String, SignalValue>,
}

impl SignalStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last-write-wins update.
    pub fn set(&mut self, name: impl Into<String>, value: SignalValue) {
        self.values.insert(name.into(), value);
    }

    /// Last commanded value, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SignalValue> {
        self.values.get(name)
    }

    /// Last commanded value or `default` when the signal was never set.
    #[must_use]
    pub fn get_or(&self, name: &str, default: &SignalValue) -> SignalValue {
        self.values.get(name).cloned().unwrap_or_else(|| default.clone())
    }

    /// Whether the signal has ever been commanded.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of commanded signals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when nothing has been commanded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Explicit re-initialization.
    pub fn reset(&mut self) {
        self.values.clear();
    }

    /// Sorted `(name, value)` pairs, for stable display.
    #[must_use]
    pub fn sorted(&self) -> Vec<(&str, &SignalValue)> {
        let mut entries: Vec<(&str, &SignalValue)> =
            self.values.iter().map(|(k, v)| (k.as_str(), v)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins() {
        let mut store = SignalStore::new();
        store.set("HVACBlowerRequest", SignalValue::Int(1));
        store.set("HVACBlowerRequest", SignalValue::Int(7));
        assert_eq!(store.get("HVACBlowerRequest"), Some(&SignalValue::Int(7)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_or_falls_back_for_unset() {
        let store = SignalStore::new();
        assert_eq!(
            store.get_or("CabHeatManReq", &SignalValue::Int(0)),
            SignalValue::Int(0)
        );
        assert!(!store.contains("CabHeatManReq"));
    }

    #[test]
    fn reset_is_explicit() {
        let mut store = SignalStore::new();
        store.set("VehicleMode", SignalValue::Int(6));
        assert!(!store.is_empty());
        store.reset();
        assert!(store.is_empty());
    }

    #[test]
    fn sorted_is_stable() {
        let mut store = SignalStore::new();
        store.set("b", SignalValue::Int(2));
        store.set("a", SignalValue::Int(1));
        let names: Vec<&str> = store.sorted().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
