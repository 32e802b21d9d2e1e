//! CCMH-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::signals::catalog::SignalNotFound;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Top-level error type for the climate-control test harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("[CCMH-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[CCMH-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[CCMH-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[CCMH-1101] invalid signal catalog: {details}")]
    InvalidCatalog { details: String },

    #[error("[CCMH-1102] invalid rule set {source_name}: {details}")]
    InvalidRules {
        source_name: String,
        details: String,
    },

    #[error("[CCMH-1103] invalid scenario {source_name}: {details}")]
    InvalidScenario {
        source_name: String,
        details: String,
    },

    #[error("[CCMH-2001] {0}")]
    SignalNotFound(#[from] SignalNotFound),

    #[error("[CCMH-2002] check mismatch in {scenario}: {failed_checks} failing check(s), first: {first}")]
    CheckMismatch {
        scenario: String,
        failed_checks: usize,
        first: String,
    },

    #[error("[CCMH-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[CCMH-3001] HIL connection failure: {details}")]
    Connection { details: String },

    #[error("[CCMH-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[CCMH-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl HarnessError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "CCMH-1001",
            Self::MissingConfig { .. } => "CCMH-1002",
            Self::ConfigParse { .. } => "CCMH-1003",
            Self::InvalidCatalog { .. } => "CCMH-1101",
            Self::InvalidRules { .. } => "CCMH-1102",
            Self::InvalidScenario { .. } => "CCMH-1103",
            Self::SignalNotFound(_) => "CCMH-2001",
            Self::CheckMismatch { .. } => "CCMH-2002",
            Self::Serialization { .. } => "CCMH-2101",
            Self::Connection { .. } => "CCMH-3001",
            Self::Io { .. } => "CCMH-3002",
            Self::Runtime { .. } => "CCMH-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// A lost HIL connection is a precondition failure for the whole
    /// scenario, so it is not retryable at this level.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Runtime { .. })
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for bus-level failures.
    #[must_use]
    pub fn connection(details: impl Into<String>) -> Self {
        Self::Connection {
            details: details.into(),
        }
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for HarnessError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::catalog::Direction;

    fn all_variants() -> Vec<HarnessError> {
        vec![
            HarnessError::InvalidConfig {
                details: String::new(),
            },
            HarnessError::MissingConfig {
                path: PathBuf::new(),
            },
            HarnessError::ConfigParse {
                context: "",
                details: String::new(),
            },
            HarnessError::InvalidCatalog {
                details: String::new(),
            },
            HarnessError::InvalidRules {
                source_name: String::new(),
                details: String::new(),
            },
            HarnessError::InvalidScenario {
                source_name: String::new(),
                details: String::new(),
            },
            HarnessError::SignalNotFound(SignalNotFound {
                name: "X".to_string(),
                direction: Direction::Status,
            }),
            HarnessError::CheckMismatch {
                scenario: String::new(),
                failed_checks: 1,
                first: String::new(),
            },
            HarnessError::Serialization {
                context: "",
                details: String::new(),
            },
            HarnessError::Connection {
                details: String::new(),
            },
            HarnessError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            HarnessError::Runtime {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let errors = all_variants();
        let codes: Vec<&str> = errors.iter().map(HarnessError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn display_includes_code() {
        for err in all_variants() {
            let msg = err.to_string();
            assert!(
                msg.contains(err.code()),
                "display should contain code {}: {msg}",
                err.code()
            );
        }
    }

    #[test]
    fn connection_failures_are_not_retryable() {
        assert!(!HarnessError::connection("bus down").is_retryable());
        assert!(
            HarnessError::io("/tmp/x", std::io::Error::other("test")).is_retryable()
        );
        assert!(
            !HarnessError::CheckMismatch {
                scenario: String::new(),
                failed_checks: 1,
                first: String::new(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn signal_not_found_converts() {
        let err: HarnessError = SignalNotFound {
            name: "MaxDefrostStatus".to_string(),
            direction: Direction::Status,
        }
        .into();
        assert_eq!(err.code(), "CCMH-2001");
        assert!(err.to_string().contains("MaxDefrostStatus"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: HarnessError = json_err.into();
        assert_eq!(err.code(), "CCMH-2101");
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: HarnessError = toml_err.into();
        assert_eq!(err.code(), "CCMH-1003");
    }
}
