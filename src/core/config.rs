//! Configuration system: TOML file + `CCMH_*` env overrides + defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{HarnessError, Result};
use crate::logger::JsonlConfig;

/// Full harness configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub execution: ExecutionConfig,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
}

/// How scenarios execute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Mode toggle. Read once when a scenario context is built.
    pub dry_run: bool,
    /// Tolerance used by checks that do not pass one.
    pub default_tolerance: f64,
    /// Poll period of `wait_for` in live mode and its simulated step in dry-run.
    pub poll_interval_ms: u64,
    /// Emit "DRY RUN: ..." notes on dry-run sets and checks.
    pub annotate_dry_run: bool,
}

/// File locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    /// Where `run` writes JSON reports when no explicit path is given.
    pub report_dir: PathBuf,
    /// Activity log (JSONL).
    pub event_log: PathBuf,
}

/// Activity log behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub jsonl_enabled: bool,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
    pub fsync_interval_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            default_tolerance: 0.1,
            poll_interval_ms: 100,
            annotate_dry_run: true,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!("[CCMH-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        Self {
            config_file: home_dir.join(".config").join("ccmh").join("config.toml"),
            report_dir: PathBuf::from("reports"),
            event_log: home_dir
                .join(".local")
                .join("share")
                .join("ccmh")
                .join("activity.jsonl"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            jsonl_enabled: true,
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 5,
            fsync_interval_secs: 10,
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// A missing file at the default path yields defaults; a missing explicit
    /// path is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|e| HarnessError::io(&path_buf, e))?;
            Self::parse(&raw)?
        } else if path.is_some() {
            return Err(HarnessError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse TOML text without env overrides or validation.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Deterministic FNV-1a hash of the effective config, logged with
    /// `config_loaded`.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Writer settings for the activity log, or `None` when disabled.
    #[must_use]
    pub fn jsonl_config(&self) -> Option<JsonlConfig> {
        self.logging.jsonl_enabled.then(|| JsonlConfig {
            path: self.paths.event_log.clone(),
            fallback_path: Some(env::temp_dir().join("ccmh-activity.jsonl")),
            max_size_bytes: self.logging.max_size_bytes,
            max_rotated_files: self.logging.max_rotated_files,
            fsync_interval_secs: self.logging.fsync_interval_secs,
        })
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("CCMH_DRY_RUN") {
            self.execution.dry_run = parse_env("CCMH_DRY_RUN", &raw)?;
        }
        if let Some(raw) = lookup("CCMH_DEFAULT_TOLERANCE") {
            self.execution.default_tolerance = parse_env("CCMH_DEFAULT_TOLERANCE", &raw)?;
        }
        if let Some(raw) = lookup("CCMH_POLL_INTERVAL_MS") {
            self.execution.poll_interval_ms = parse_env("CCMH_POLL_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = lookup("CCMH_REPORT_DIR") {
            self.paths.report_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("CCMH_EVENT_LOG") {
            self.paths.event_log = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("CCMH_JSONL_ENABLED") {
            self.logging.jsonl_enabled = parse_env("CCMH_JSONL_ENABLED", &raw)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let tol = self.execution.default_tolerance;
        if !tol.is_finite() || tol < 0.0 {
            return Err(HarnessError::InvalidConfig {
                details: format!("execution.default_tolerance must be finite and >= 0, got {tol}"),
            });
        }
        if self.execution.poll_interval_ms == 0 {
            return Err(HarnessError::InvalidConfig {
                details: "execution.poll_interval_ms must be > 0".to_string(),
            });
        }
        if self.logging.max_rotated_files == 0 {
            return Err(HarnessError::InvalidConfig {
                details: "logging.max_rotated_files must be >= 1".to_string(),
            });
        }
        if self.logging.max_size_bytes == 0 {
            return Err(HarnessError::InvalidConfig {
                details: "logging.max_size_bytes must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| HarnessError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
