//! Persisted run artifacts: raw transcript, result summary, golden record.

use crate::error::{RunnerError, RunnerResult};
use crate::model::{GoldenRecord, RunResult, Summary};
use serde::Serialize;
use std::fs;
use std::path::Path;

fn ensure_parent(path: &Path) -> RunnerResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|err| RunnerError::io("failed to create artifact dir", err))?;
    }
    Ok(())
}

fn write_json_pretty<T: Serialize>(path: &Path, value: &T, what: &str) -> RunnerResult<()> {
    ensure_parent(path)?;
    let mut data = serde_json::to_vec_pretty(value)
        .map_err(|err| RunnerError::io(format!("failed to serialize {what}"), err))?;
    data.push(b'\n');
    fs::write(path, data).map_err(|err| RunnerError::io(format!("failed to write {what}"), err))
}

/// Raw output bytes, exactly as received.
pub fn write_transcript(path: &Path, output: &[u8]) -> RunnerResult<()> {
    ensure_parent(path)?;
    fs::write(path, output).map_err(|err| RunnerError::io("failed to write transcript", err))
}

pub fn write_summary(path: &Path, result: &RunResult) -> RunnerResult<()> {
    write_json_pretty(path, result, "summary")
}

/// Capture a finished run as the reference for later comparisons.
pub fn write_golden_record(path: &Path, summary: &Summary) -> RunnerResult<()> {
    write_json_pretty(path, &GoldenRecord::from(summary), "golden record")
}
