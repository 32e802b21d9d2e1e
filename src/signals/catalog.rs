//! Signal catalog: typed name → channel-path lookup built from the HIL
//! project configuration.
//!
//! The project JSON nests channel paths as `variables.<BUS>.<IN|OUT>.<name>`
//! with inconsistent key casing across projects. Everything is validated once
//! here so that per-call resolution is a plain map lookup returning
//! `Result<_, SignalNotFound>`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::errors::{HarnessError, Result};
use crate::core::paths::resolve_project_relative;

/// Which way a signal flows relative to the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Written by the test (`OUT` in the project file).
    Command,
    /// Reported by the controller (`IN` in the project file).
    Status,
}

impl Direction {
    fn parse_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_uppercase().as_str() {
            "OUT" => Some(Self::Command),
            "IN" => Some(Self::Status),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command => f.write_str("command"),
            Self::Status => f.write_str("status"),
        }
    }
}

/// Vehicle bus carrying the signal. Declaration order is resolution priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Bus {
    /// Controller Area Network.
    #[serde(rename = "CAN")]
    Can,
    /// Local Interconnect Network.
    #[serde(rename = "LIN")]
    Lin,
}

impl Bus {
    fn parse_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_uppercase().as_str() {
            "CAN" => Some(Self::Can),
            "LIN" => Some(Self::Lin),
            _ => None,
        }
    }
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Can => f.write_str("CAN"),
            Self::Lin => f.write_str("LIN"),
        }
    }
}

/// Opaque handle to a physical channel on the HIL rig.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelPath(String);

impl ChannelPath {
    /// Wrap a raw channel path.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw path string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalDescriptor {
    /// Signal name as used by scenarios.
    pub name: String,
    /// Command or status.
    pub direction: Direction,
    /// Bus the channel lives on.
    pub bus: Bus,
    /// Physical channel handle.
    pub path: ChannelPath,
}

/// A signal name that is absent from the catalog for the requested direction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("signal '{name}' not found in {direction} catalog")]
pub struct SignalNotFound {
    /// Requested name.
    pub name: String,
    /// Requested direction.
    pub direction: Direction,
}

/// Lookup capability consumed by the signal accessor.
pub trait SignalCatalog: Send {
    /// Resolve a signal name for one direction.
    fn resolve(
        &self,
        name: &str,
        direction: Direction,
    ) -> std::result::Result<&SignalDescriptor, SignalNotFound>;
}

/// Catalog validated from the project configuration's `variables` table.
#[derive(Debug, Clone, Default)]
pub struct ProjectCatalog {
    entries: HashMap<(Direction, String), Vec<SignalDescriptor>>,
}

impl ProjectCatalog {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one descriptor. Entries for the same name and direction are kept
    /// in bus priority order.
    pub fn insert(&mut self, descriptor: SignalDescriptor) {
        let slot = self
            .entries
            .entry((descriptor.direction, descriptor.name.clone()))
            .or_default();
        slot.retain(|d| d.bus != descriptor.bus);
        slot.push(descriptor);
        slot.sort_by_key(|d| d.bus);
    }

    /// Builder-style shorthand for tests and programmatic catalogs.
    #[must_use]
    pub fn with(mut self, bus: Bus, direction: Direction, name: &str, path: &str) -> Self {
        self.insert(SignalDescriptor {
            name: name.to_string(),
            direction,
            bus,
            path: ChannelPath::new(path),
        });
        self
    }

    /// Validate and build from the raw `variables` table.
    pub fn from_variables(variables: &RawVariables) -> Result<Self> {
        let mut catalog = Self::new();
        for (bus_key, directions) in variables {
            let bus = Bus::parse_key(bus_key).ok_or_else(|| HarnessError::InvalidCatalog {
                details: format!("unknown bus key '{bus_key}' (expected CAN or LIN)"),
            })?;
            for (dir_key, signals) in directions {
                let direction =
                    Direction::parse_key(dir_key).ok_or_else(|| HarnessError::InvalidCatalog {
                        details: format!(
                            "unknown direction key '{dir_key}' under {bus} (expected IN or OUT)"
                        ),
                    })?;
                for (name, path) in signals {
                    if name.trim().is_empty() {
                        return Err(HarnessError::InvalidCatalog {
                            details: format!("empty signal name under {bus}.{dir_key}"),
                        });
                    }
                    if path.trim().is_empty() {
                        return Err(HarnessError::InvalidCatalog {
                            details: format!("signal '{name}' under {bus}.{dir_key} has an empty path"),
                        });
                    }
                    catalog.insert(SignalDescriptor {
                        name: name.clone(),
                        direction,
                        bus,
                        path: ChannelPath::new(path.clone()),
                    });
                }
            }
        }
        Ok(catalog)
    }

    /// Names present on more than one bus for the same direction.
    /// Resolution picks the CAN entry for these.
    #[must_use]
    pub fn ambiguous_names(&self) -> Vec<String> {
        let names: BTreeSet<String> = self
            .entries
            .iter()
            .filter(|(_, v)| v.len() > 1)
            .map(|((_, name), _)| name.clone())
            .collect();
        names.into_iter().collect()
    }

    /// Total number of `(direction, name)` entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no signal is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SignalCatalog for ProjectCatalog {
    fn resolve(
        &self,
        name: &str,
        direction: Direction,
    ) -> std::result::Result<&SignalDescriptor, SignalNotFound> {
        self.entries
            .get(&(direction, name.to_string()))
            .and_then(|v| v.first())
            .ok_or_else(|| SignalNotFound {
                name: name.to_string(),
                direction,
            })
    }
}

/// `variables` as it appears in the project file: bus → direction → name → path.
pub type RawVariables = BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>;

/// HIL project configuration (`projectConfig.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// VeriStand project path, relative to the project root.
    #[serde(rename = "projectpath", default)]
    pub project_path: String,
    /// Calibration file, relative to the project root.
    #[serde(rename = "calibrationfile", default)]
    pub calibration_file: String,
    /// Address of the HIL target system.
    #[serde(rename = "Systemadress", default)]
    pub system_address: String,
    /// Raw channel table.
    #[serde(default)]
    pub variables: RawVariables,
}

impl ProjectConfig {
    /// Parse and validate a project file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| HarnessError::io(path, source))?;
        Self::parse(&raw)
    }

    /// Parse and validate project JSON text.
    pub fn parse(raw: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(raw).map_err(|e| HarnessError::InvalidCatalog {
            details: format!("project configuration is not valid JSON: {e}"),
        })?;
        if cfg.project_path.trim().is_empty() {
            return Err(HarnessError::InvalidCatalog {
                details: "projectpath is not specified".to_string(),
            });
        }
        if cfg.system_address.trim().is_empty() {
            return Err(HarnessError::InvalidCatalog {
                details: "Systemadress is not specified".to_string(),
            });
        }
        Ok(cfg)
    }

    /// Project path resolved against `CI_PROJECT_DIR` or the working directory.
    #[must_use]
    pub fn resolved_project_path(&self) -> PathBuf {
        resolve_project_relative(Path::new(&self.project_path))
    }

    /// Calibration file resolved like the project path.
    #[must_use]
    pub fn resolved_calibration_file(&self) -> PathBuf {
        resolve_project_relative(Path::new(&self.calibration_file))
    }

    /// Build the validated signal catalog.
    pub fn catalog(&self) -> Result<ProjectCatalog> {
        ProjectCatalog::from_variables(&self.variables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = r#"{
        "projectpath": "hil/Project.nivsproj",
        "calibrationfile": "hil/cal.json",
        "Systemadress": "192.168.0.10",
        "variables": {
            "CAN": {
                "IN": { "MaxDefrostStatus": "Targets/CAN/IN/MaxDefrostStatus" },
                "OUT": { "MaxDefrostRequest": "Targets/CAN/OUT/MaxDefrostRequest" }
            },
            "lin": {
                "in": {
                    "LIN_HVACAct1Stat_CurrentPos": "LIN.LIN29_CCM.Act1_in",
                    "MaxDefrostStatus": "LIN.LIN29_CCM.MaxDefrostStatus_in"
                }
            }
        }
    }"#;

    #[test]
    fn resolves_by_direction() {
        let catalog = ProjectConfig::parse(PROJECT).unwrap().catalog().unwrap();
        let d = catalog
            .resolve("MaxDefrostRequest", Direction::Command)
            .unwrap();
        assert_eq!(d.bus, Bus::Can);
        assert_eq!(d.path.as_str(), "Targets/CAN/OUT/MaxDefrostRequest");
        let miss = catalog
            .resolve("MaxDefrostRequest", Direction::Status)
            .unwrap_err();
        assert_eq!(miss.direction, Direction::Status);
    }

    #[test]
    fn key_casing_is_normalized() {
        let catalog = ProjectConfig::parse(PROJECT).unwrap().catalog().unwrap();
        let d = catalog
            .resolve("LIN_HVACAct1Stat_CurrentPos", Direction::Status)
            .unwrap();
        assert_eq!(d.bus, Bus::Lin);
    }

    #[test]
    fn ambiguous_names_prefer_can() {
        let catalog = ProjectConfig::parse(PROJECT).unwrap().catalog().unwrap();
        assert_eq!(catalog.ambiguous_names(), vec!["MaxDefrostStatus".to_string()]);
        let d = catalog
            .resolve("MaxDefrostStatus", Direction::Status)
            .unwrap();
        assert_eq!(d.bus, Bus::Can);
    }

    #[test]
    fn unknown_bus_rejected_at_load() {
        let raw = r#"{"projectpath":"p","Systemadress":"a","variables":{"FlexRay":{"IN":{}}}}"#;
        let err = ProjectConfig::parse(raw).unwrap().catalog().unwrap_err();
        assert_eq!(err.code(), "CCMH-1101");
        assert!(err.to_string().contains("FlexRay"));
    }

    #[test]
    fn empty_path_rejected_at_load() {
        let raw = r#"{"projectpath":"p","Systemadress":"a","variables":{"CAN":{"IN":{"X":" "}}}}"#;
        let err = ProjectConfig::parse(raw).unwrap().catalog().unwrap_err();
        assert!(err.to_string().contains("empty path"));
    }

    #[test]
    fn missing_system_address_rejected() {
        let raw = r#"{"projectpath":"p","variables":{}}"#;
        let err = ProjectConfig::parse(raw).unwrap_err();
        assert!(err.to_string().contains("Systemadress"));
    }

    #[test]
    fn builder_replaces_same_bus_entry() {
        let catalog = ProjectCatalog::new()
            .with(Bus::Can, Direction::Status, "A", "old")
            .with(Bus::Can, Direction::Status, "A", "new");
        assert_eq!(
            catalog.resolve("A", Direction::Status).unwrap().path.as_str(),
            "new"
        );
        assert_eq!(catalog.len(), 1);
    }
}
