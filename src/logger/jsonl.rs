//! Scenario activity log as line-delimited JSON.
//!
//! Every harness action becomes one self-contained JSON object on its own
//! line, written with a single `write_all` so a tailing CI job never sees a
//! half line. When the log file cannot be written the writer steps down:
//! 1. configured path
//! 2. fallback path
//! 3. stderr, prefixed `[CCMH-JSONL]`
//! 4. discard
//!
//! A logging problem never fails a scenario.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::core::errors::{HarnessError, Result};
use crate::signals::value::SignalValue;

const STDERR_PREFIX: &str = "[CCMH-JSONL]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Activity event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ScenarioStart,
    ScenarioFinish,
    StepStart,
    SignalSet,
    SignalCheck,
    SignalNotFound,
    Note,
    Wait,
    ConfigLoaded,
    Error,
}

/// One log line. Only `ts`, `event` and `severity` are always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC, millisecond precision.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<SignalValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<SignalValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<SignalValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Entry stamped with the current UTC time.
    #[must_use]
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            scenario: None,
            step: None,
            signal: None,
            value: None,
            expected: None,
            actual: None,
            passed: None,
            tolerance: None,
            dry_run: None,
            duration_ms: None,
            error_code: None,
            error_message: None,
            retryable: None,
            details: None,
        }
    }

    /// `error` entry carrying the harness error code and message.
    #[must_use]
    pub fn from_error(err: &HarnessError) -> Self {
        let mut entry = Self::new(EventType::Error, Severity::Error);
        entry.error_code = Some(err.code().to_string());
        entry.error_message = Some(err.to_string());
        entry.retryable = Some(err.is_retryable());
        entry
    }

    #[must_use]
    pub fn scenario(mut self, name: &str) -> Self {
        self.scenario = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn step(mut self, name: Option<&str>) -> Self {
        self.step = name.map(str::to_string);
        self
    }

    #[must_use]
    pub fn signal(mut self, name: &str) -> Self {
        self.signal = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn details(mut self, text: impl Into<String>) -> Self {
        self.details = Some(text.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sink {
    Primary,
    Fallback,
    Stderr,
    Discard,
}

/// Writer settings.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    /// Rotate once the current file would exceed this size.
    pub max_size_bytes: u64,
    /// Rotated generations kept as `<path>.1` .. `<path>.N`.
    pub max_rotated_files: u32,
    pub fsync_interval_secs: u64,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("ccmh-activity.jsonl"),
            fallback_path: Some(std::env::temp_dir().join("ccmh-activity.jsonl")),
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 5,
            fsync_interval_secs: 10,
        }
    }
}

/// Append-only JSONL writer with size rotation and a degradation chain.
pub struct JsonlWriter {
    config: JsonlConfig,
    file: Option<BufWriter<File>>,
    sink: Sink,
    bytes_written: u64,
    last_sync: Instant,
}

impl JsonlWriter {
    /// Open the configured path, stepping down the chain on failure.
    #[must_use]
    pub fn open(config: JsonlConfig) -> Self {
        let mut writer = Self {
            config,
            file: None,
            sink: Sink::Discard,
            bytes_written: 0,
            last_sync: Instant::now(),
        };
        writer.open_primary();
        writer
    }

    /// Serialize and append one entry.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(mut line) => {
                line.push('\n');
                self.append(&line);
            }
            Err(e) => {
                let _ = writeln!(io::stderr(), "{STDERR_PREFIX} cannot encode entry: {e}");
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
    }

    /// Flush and `sync_data` the current file.
    pub fn sync(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
            let _ = file.get_ref().sync_data();
        }
        self.last_sync = Instant::now();
    }

    /// Where lines currently go: `primary`, `fallback`, `stderr` or `discard`.
    #[must_use]
    pub const fn state(&self) -> &'static str {
        match self.sink {
            Sink::Primary => "primary",
            Sink::Fallback => "fallback",
            Sink::Stderr => "stderr",
            Sink::Discard => "discard",
        }
    }

    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn append(&mut self, line: &str) {
        let len = line.len() as u64;
        if matches!(self.sink, Sink::Primary | Sink::Fallback)
            && self.bytes_written + len > self.config.max_size_bytes
        {
            self.rotate();
        }

        loop {
            match self.sink {
                Sink::Primary | Sink::Fallback => {
                    let ok = self
                        .file
                        .as_mut()
                        .is_some_and(|f| f.write_all(line.as_bytes()).is_ok());
                    if ok {
                        self.bytes_written += len;
                        if self.last_sync.elapsed()
                            >= Duration::from_secs(self.config.fsync_interval_secs)
                        {
                            self.sync();
                        }
                        return;
                    }
                    self.step_down();
                }
                Sink::Stderr => {
                    if write!(io::stderr(), "{STDERR_PREFIX} {line}").is_err() {
                        self.sink = Sink::Discard;
                    }
                    return;
                }
                Sink::Discard => return,
            }
        }
    }

    fn open_primary(&mut self) {
        match open_append(&self.config.path) {
            Ok((file, size)) => self.attach(file, size, Sink::Primary),
            Err(_) => self.open_fallback(),
        }
    }

    fn open_fallback(&mut self) {
        let Some(path) = self.config.fallback_path.clone() else {
            announce("log path unusable and no fallback configured; writing to stderr");
            self.sink = Sink::Stderr;
            return;
        };
        match open_append(&path) {
            Ok((file, size)) => {
                announce(&format!("log path unusable; using {}", path.display()));
                self.attach(file, size, Sink::Fallback);
            }
            Err(_) => {
                announce("log and fallback paths unusable; writing to stderr");
                self.sink = Sink::Stderr;
            }
        }
    }

    fn attach(&mut self, file: File, size: u64, sink: Sink) {
        self.file = Some(BufWriter::new(file));
        self.bytes_written = size;
        self.sink = sink;
    }

    fn step_down(&mut self) {
        self.file = None;
        match self.sink {
            Sink::Primary => self.open_fallback(),
            Sink::Fallback => {
                announce("fallback log write failed; writing to stderr");
                self.sink = Sink::Stderr;
            }
            Sink::Stderr | Sink::Discard => self.sink = Sink::Discard,
        }
    }

    fn rotate(&mut self) {
        self.flush();
        self.file = None;
        let base = match self.sink {
            Sink::Primary => self.config.path.clone(),
            Sink::Fallback => match &self.config.fallback_path {
                Some(p) => p.clone(),
                None => return,
            },
            Sink::Stderr | Sink::Discard => return,
        };

        let keep = self.config.max_rotated_files.max(1);
        let _ = fs::remove_file(rotated_name(&base, keep));
        for i in (1..keep).rev() {
            let _ = fs::rename(rotated_name(&base, i), rotated_name(&base, i + 1));
        }
        let _ = fs::rename(&base, rotated_name(&base, 1));

        match open_append(&base) {
            Ok((file, _)) => {
                let sink = self.sink;
                self.attach(file, 0, sink);
            }
            Err(_) => self.step_down(),
        }
    }
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        self.flush();
    }
}

fn announce(message: &str) {
    let _ = writeln!(io::stderr(), "{STDERR_PREFIX} {message}");
}

fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| HarnessError::io(parent, e))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| HarnessError::io(path, e))?;
    let size = file.metadata().map_or(0, |m| m.len());
    Ok((file, size))
}

/// `run.jsonl` -> `run.jsonl.2`
fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
