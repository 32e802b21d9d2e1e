//! Structured activity logging for scenario runs.

pub mod jsonl;

use std::sync::Arc;

use parking_lot::Mutex;

pub use jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

/// Shared handle to one activity log.
///
/// Clones write to the same file, so several scenario contexts can log to a
/// single run log.
#[derive(Clone)]
pub struct EventLog {
    writer: Arc<Mutex<JsonlWriter>>,
}

impl EventLog {
    /// Open the log described by `config`.
    #[must_use]
    pub fn open(config: JsonlConfig) -> Self {
        Self {
            writer: Arc::new(Mutex::new(JsonlWriter::open(config))),
        }
    }

    pub fn log(&self, entry: &LogEntry) {
        self.writer.lock().write_entry(entry);
    }

    pub fn flush(&self) {
        self.writer.lock().flush();
    }

    /// Degradation state of the underlying writer.
    #[must_use]
    pub fn state(&self) -> &'static str {
        self.writer.lock().state()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.jsonl");
        let log = EventLog::open(JsonlConfig {
            path: path.clone(),
            fallback_path: None,
            ..JsonlConfig::default()
        });
        let other = log.clone();
        log.log(&LogEntry::new(EventType::ScenarioStart, Severity::Info).scenario("a"));
        other.log(&LogEntry::new(EventType::ScenarioStart, Severity::Info).scenario("b"));
        log.flush();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
