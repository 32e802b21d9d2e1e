//! Report sinks: JSON files and a plain-text console summary.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::errors::{HarnessError, Result};
use crate::recorder::{ExecutionReport, NoteLevel};

/// `<dir>/<test_name>_<YYYYmmdd-HHMMSS>.json`, using the report's start time.
#[must_use]
pub fn default_report_path(dir: &Path, report: &ExecutionReport) -> PathBuf {
    let stem: String = report
        .test_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    dir.join(format!(
        "{stem}_{}.json",
        report.start_time.format("%Y%m%d-%H%M%S")
    ))
}

/// Write a report as pretty JSON, creating parent directories.
pub fn write_json(report: &ExecutionReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| HarnessError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json).map_err(|e| HarnessError::io(path, e))
}

/// Read a report written by [`write_json`].
pub fn read_json(path: &Path) -> Result<ExecutionReport> {
    let raw = fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
    Ok(serde_json::from_str(&raw)?)
}

/// Multi-line console summary: verdict, counts, then failures and warnings.
#[must_use]
pub fn render_summary(report: &ExecutionReport) -> String {
    let mut out = String::new();
    let mode = if report.dry_run { "dry-run" } else { "live" };
    let _ = writeln!(
        out,
        "{} [{mode}] {}",
        report.test_name,
        if report.failed { "FAILED" } else { "PASSED" }
    );
    if !report.description.is_empty() {
        let _ = writeln!(out, "  {}", report.description);
    }
    let _ = writeln!(
        out,
        "  steps: {}  checks: {} passed / {} failed / {} total  duration: {:.2}s",
        report.steps.len(),
        report.passed_checks,
        report.failed_checks,
        report.total_checks,
        report.duration_secs
    );

    for step in &report.steps {
        for check in step.checks.iter().filter(|c| !c.passed) {
            let _ = writeln!(
                out,
                "  FAIL [{}] {}: expected {}, got {}{}",
                step.name,
                check.signal,
                check.expected,
                check.actual,
                check
                    .tolerance
                    .map(|t| format!(" (tolerance {t})"))
                    .unwrap_or_default()
            );
        }
        for note in step.notes.iter().filter(|n| n.level == NoteLevel::Warning) {
            let _ = writeln!(out, "  WARN [{}] {}", step.name, note.text);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::{Clock, ExecutionRecorder};
    use crate::signals::value::SignalValue;

    fn sample() -> ExecutionReport {
        let mut r = ExecutionRecorder::new("max defrost/override", "demo", Clock::simulated(), true);
        r.start_step("activate", "");
        r.record_check("MaxDefrostStatus", &SignalValue::Int(1), &SignalValue::Int(1), true, Some(0.1));
        r.record_check(
            "HVACBlowerLevelStat_BlowerLevel",
            &SignalValue::Int(31),
            &SignalValue::Int(10),
            false,
            Some(0.1),
        );
        r.record_note("WARNING: Signal 'Foo' not found", NoteLevel::Warning);
        r.finalize()
    }

    #[test]
    fn json_written_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample();
        let path = default_report_path(&dir.path().join("reports"), &report);
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("max_defrost_override_")
        );
        write_json(&report, &path).unwrap();
        let back = read_json(&path).unwrap();
        assert_eq!(back.failed_checks, 1);
        assert_eq!(back.steps[0].checks.len(), 2);
    }

    #[test]
    fn summary_lists_failures_and_warnings() {
        let text = render_summary(&sample());
        assert!(text.starts_with("max defrost/override [dry-run] FAILED"));
        assert!(text.contains("1 passed / 1 failed / 2 total"));
        assert!(text.contains("FAIL [activate] HVACBlowerLevelStat_BlowerLevel: expected 31, got 10"));
        assert!(text.contains("WARN [activate] WARNING: Signal 'Foo' not found"));
    }

    #[test]
    fn reading_garbage_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(read_json(&path).unwrap_err().code(), "CCMH-2101");
    }
}
