//! Declarative rule sets: TOML model, compilation into an ordered rule table,
//! and cross-file divergence auditing.

#![allow(missing_docs)]

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::rules::{Compute, Condition, ConditionTest, Guard, Rule, RuleOrigin, UNSET_DEFAULT};
use crate::core::errors::{HarnessError, Result};
use crate::signals::value::SignalValue;

/// Prefix selecting a rule set compiled into the binary.
pub const BUILTIN_PREFIX: &str = "builtin:";

const BUILTIN_MAX_DEFROST: &str = include_str!("../../rules/max_defrost.toml");

// ──────────────────── file model ────────────────────

/// On-disk rule file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub enums: BTreeMap<String, BTreeMap<String, i64>>,
    #[serde(default)]
    pub overrides: Vec<OverrideEntry>,
    #[serde(default)]
    pub mirrors: Vec<MirrorEntry>,
}

/// `[[overrides]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverrideEntry {
    pub name: String,
    #[serde(default)]
    pub when: Vec<ConditionEntry>,
    /// Inhibitors: any one holding cancels the override.
    #[serde(default)]
    pub unless: Vec<ConditionEntry>,
    pub forces: BTreeMap<String, SignalValue>,
}

/// `[[mirrors]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MirrorEntry {
    pub status: String,
    #[serde(default)]
    pub request: Option<String>,
    #[serde(default)]
    pub default: Option<SignalValue>,
    #[serde(default)]
    pub value: Option<SignalValue>,
}

/// Condition inside `when`/`unless`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionEntry {
    pub signal: String,
    #[serde(default)]
    pub eq: Option<SignalValue>,
    #[serde(default)]
    pub ne: Option<SignalValue>,
    #[serde(default, rename = "in")]
    pub one_of: Option<Vec<SignalValue>>,
    #[serde(default)]
    pub not_in: Option<Vec<SignalValue>>,
    #[serde(default)]
    pub default: Option<SignalValue>,
}

// ──────────────────── compiled form ────────────────────

/// Constants forced by one named override, kept for auditing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverrideProfile {
    pub name: String,
    pub forces: Vec<(String, SignalValue)>,
}

/// Ordered rule table for one scenario family.
///
/// Rules are evaluated in insertion order: overrides in file order, then
/// mirrors, then anything pushed in code.
#[derive(Debug, Clone)]
pub struct RuleSet {
    name: String,
    rules: Vec<Rule>,
    index: HashMap<String, Vec<usize>>,
    profiles: Vec<OverrideProfile>,
}

impl RuleSet {
    /// Rule set with no rules; every check falls back to the expected value.
    #[must_use]
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rules: Vec::new(),
            index: HashMap::new(),
            profiles: Vec::new(),
        }
    }

    /// Parse and compile TOML text. `source_name` is used in errors and as
    /// the set name when the file does not declare one.
    pub fn parse(source_name: &str, raw: &str) -> Result<Self> {
        let file: RuleFile = toml::from_str(raw).map_err(|e| HarnessError::InvalidRules {
            source_name: source_name.to_string(),
            details: e.to_string(),
        })?;
        Self::compile(source_name, &file)
    }

    /// Read and compile a rule file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("rules")
            .to_string();
        let mut set = Self::parse(&path.display().to_string(), &raw)?;
        if set.name == path.display().to_string() {
            set.name = stem;
        }
        Ok(set)
    }

    /// Rule set compiled into the binary.
    pub fn builtin(name: &str) -> Result<Self> {
        match name {
            "max_defrost" => Self::parse("max_defrost", BUILTIN_MAX_DEFROST),
            other => Err(HarnessError::InvalidRules {
                source_name: format!("{BUILTIN_PREFIX}{other}"),
                details: "no such built-in rule set (available: max_defrost)".to_string(),
            }),
        }
    }

    /// Resolve `builtin:<name>` or a file path relative to `base`.
    pub fn from_reference(reference: &str, base: &Path) -> Result<Self> {
        if let Some(name) = reference.strip_prefix(BUILTIN_PREFIX) {
            return Self::builtin(name.trim());
        }
        let path = PathBuf::from(reference);
        let path = if path.is_absolute() {
            path
        } else {
            base.join(path)
        };
        Self::load(&path)
    }

    fn compile(source_name: &str, file: &RuleFile) -> Result<Self> {
        let invalid = |details: String| HarnessError::InvalidRules {
            source_name: source_name.to_string(),
            details,
        };
        let enums = EnumTables(&file.enums);
        let mut set = Self::empty(
            file.name
                .as_deref()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or(source_name),
        );

        for entry in &file.overrides {
            if entry.name.trim().is_empty() {
                return Err(invalid("override with empty name".to_string()));
            }
            if set.profiles.iter().any(|p| p.name == entry.name) {
                return Err(invalid(format!("duplicate override '{}'", entry.name)));
            }
            if entry.when.is_empty() {
                return Err(invalid(format!(
                    "override '{}' has no 'when' condition",
                    entry.name
                )));
            }
            if entry.forces.is_empty() {
                return Err(invalid(format!("override '{}' forces nothing", entry.name)));
            }
            let when = compile_conditions(&entry.when, &enums).map_err(&invalid)?;
            let unless = compile_conditions(&entry.unless, &enums).map_err(&invalid)?;

            let mut forces = Vec::with_capacity(entry.forces.len());
            for (status, raw) in &entry.forces {
                let value = enums.resolve(status, raw).map_err(&invalid)?;
                forces.push((status.clone(), value.clone()));
                set.insert(Rule {
                    signal: status.clone(),
                    guard: Guard::Conditions {
                        when: when.clone(),
                        unless: unless.clone(),
                    },
                    compute: Compute::Constant(value),
                    origin: RuleOrigin::Override(entry.name.clone()),
                });
            }
            set.profiles.push(OverrideProfile {
                name: entry.name.clone(),
                forces,
            });
        }

        let mut mirrored: Vec<&str> = Vec::new();
        for entry in &file.mirrors {
            if entry.status.trim().is_empty() {
                return Err(invalid("mirror with empty status".to_string()));
            }
            if mirrored.contains(&entry.status.as_str()) {
                return Err(invalid(format!("status '{}' mirrored twice", entry.status)));
            }
            mirrored.push(&entry.status);
            let compute = match (&entry.request, &entry.value) {
                (Some(request), None) => {
                    let default = match &entry.default {
                        Some(d) => enums.resolve(request, d).map_err(&invalid)?,
                        None => UNSET_DEFAULT,
                    };
                    Compute::Mirror {
                        source: request.clone(),
                        default,
                    }
                }
                (None, Some(value)) => {
                    if entry.default.is_some() {
                        return Err(invalid(format!(
                            "mirror '{}': 'default' only applies with 'request'",
                            entry.status
                        )));
                    }
                    Compute::Constant(enums.resolve(&entry.status, value).map_err(&invalid)?)
                }
                _ => {
                    return Err(invalid(format!(
                        "mirror '{}' needs exactly one of 'request' or 'value'",
                        entry.status
                    )));
                }
            };
            set.insert(Rule {
                signal: entry.status.clone(),
                guard: Guard::Always,
                compute,
                origin: RuleOrigin::Mirror,
            });
        }

        Ok(set)
    }

    fn insert(&mut self, rule: Rule) {
        self.index
            .entry(rule.signal.clone())
            .or_default()
            .push(self.rules.len());
        self.rules.push(rule);
    }

    /// Append a rule after everything already in the table.
    pub fn push(&mut self, rule: Rule) {
        self.insert(rule);
    }

    /// Builder form of [`push`](Self::push).
    #[must_use]
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.insert(rule);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Rules answering for `signal`, in evaluation order.
    pub fn rules_for<'a>(&'a self, signal: &str) -> impl Iterator<Item = &'a Rule> + 'a {
        self.index
            .get(signal)
            .into_iter()
            .flatten()
            .map(|&i| &self.rules[i])
    }

    #[must_use]
    pub fn is_modeled(&self, signal: &str) -> bool {
        self.index.contains_key(signal)
    }

    /// Modeled status signals, sorted.
    #[must_use]
    pub fn signals(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.index.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn profiles(&self) -> &[OverrideProfile] {
        &self.profiles
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

struct EnumTables<'a>(&'a BTreeMap<String, BTreeMap<String, i64>>);

impl EnumTables<'_> {
    /// Replace a text label with its integer when `signal` has a table.
    fn resolve(&self, signal: &str, value: &SignalValue) -> std::result::Result<SignalValue, String> {
        let (SignalValue::Text(label), Some(table)) = (value, self.0.get(signal)) else {
            return Ok(value.clone());
        };
        table.get(label).map(|&n| SignalValue::Int(n)).ok_or_else(|| {
            let known: Vec<&str> = table.keys().map(String::as_str).collect();
            format!(
                "unknown label '{label}' for {signal} (known: {})",
                known.join(", ")
            )
        })
    }

    fn resolve_all(
        &self,
        signal: &str,
        values: &[SignalValue],
    ) -> std::result::Result<Vec<SignalValue>, String> {
        values.iter().map(|v| self.resolve(signal, v)).collect()
    }
}

fn compile_conditions(
    entries: &[ConditionEntry],
    enums: &EnumTables<'_>,
) -> std::result::Result<Vec<Condition>, String> {
    entries.iter().map(|e| compile_condition(e, enums)).collect()
}

fn compile_condition(
    entry: &ConditionEntry,
    enums: &EnumTables<'_>,
) -> std::result::Result<Condition, String> {
    let signal = entry.signal.as_str();
    if signal.trim().is_empty() {
        return Err("condition with empty signal".to_string());
    }
    let test = match (&entry.eq, &entry.ne, &entry.one_of, &entry.not_in) {
        (Some(v), None, None, None) => ConditionTest::Eq(enums.resolve(signal, v)?),
        (None, Some(v), None, None) => ConditionTest::Ne(enums.resolve(signal, v)?),
        (None, None, Some(vs), None) => ConditionTest::In(enums.resolve_all(signal, vs)?),
        (None, None, None, Some(vs)) => ConditionTest::NotIn(enums.resolve_all(signal, vs)?),
        _ => {
            return Err(format!(
                "condition on '{signal}' needs exactly one of eq, ne, in, not_in"
            ));
        }
    };
    let default = match &entry.default {
        Some(d) => enums.resolve(signal, d)?,
        None => UNSET_DEFAULT,
    };
    Ok(Condition {
        signal: signal.to_string(),
        test,
        default,
    })
}

// ──────────────────── auditing ────────────────────

/// What kind of disagreement was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DivergenceKind {
    /// Same-named override forces different constants.
    OverrideConstant { profile: String },
    /// Same status mirrors different requests or defaults.
    Mirror,
}

/// One rule set's position in a divergence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DivergenceVariant {
    pub rule_set: String,
    pub value: String,
}

/// A status signal on which rule sets disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Divergence {
    #[serde(flatten)]
    pub kind: DivergenceKind,
    pub signal: String,
    pub variants: Vec<DivergenceVariant>,
}

/// Collection of rule sets compared against each other.
#[derive(Debug, Default)]
pub struct RuleLibrary {
    sets: Vec<RuleSet>,
}

impl RuleLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, set: RuleSet) {
        self.sets.push(set);
    }

    #[must_use]
    pub fn sets(&self) -> &[RuleSet] {
        &self.sets
    }

    /// Every status whose forced constant or mirror source differs between
    /// rule sets. Output is sorted by kind, then signal.
    #[must_use]
    pub fn divergences(&self) -> Vec<Divergence> {
        // (profile, status) -> [(set, value)]
        let mut forced: BTreeMap<(String, String), Vec<(String, SignalValue)>> = BTreeMap::new();
        let mut mirrors: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();

        for set in &self.sets {
            for profile in &set.profiles {
                for (status, value) in &profile.forces {
                    forced
                        .entry((profile.name.clone(), status.clone()))
                        .or_default()
                        .push((set.name.clone(), value.clone()));
                }
            }
            for rule in set.rules.iter().filter(|r| r.origin == RuleOrigin::Mirror) {
                mirrors
                    .entry(rule.signal.clone())
                    .or_default()
                    .push((set.name.clone(), rule.compute.to_string()));
            }
        }

        let mut out = Vec::new();
        for ((profile, signal), entries) in forced {
            let first = &entries[0].1;
            if entries.iter().any(|(_, v)| !v.exact_eq(first)) {
                out.push(Divergence {
                    kind: DivergenceKind::OverrideConstant { profile },
                    signal,
                    variants: entries
                        .into_iter()
                        .map(|(rule_set, v)| DivergenceVariant {
                            rule_set,
                            value: v.to_string(),
                        })
                        .collect(),
                });
            }
        }
        for (signal, entries) in mirrors {
            let first = &entries[0].1;
            if entries.iter().any(|(_, v)| v != first) {
                out.push(Divergence {
                    kind: DivergenceKind::Mirror,
                    signal,
                    variants: entries
                        .into_iter()
                        .map(|(rule_set, value)| DivergenceVariant { rule_set, value })
                        .collect(),
                });
            }
        }
        out
    }
}
