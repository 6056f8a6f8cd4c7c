//! Golden record comparison.
//!
//! A golden record is a previously captured `{checksum_chain, frames}` pair.
//! The comparison is exact string equality on the full checksum chain. Frame
//! counts are reported for diagnosis but never decide the verdict on their
//! own: identical chunk contents split at different points already produce a
//! different chain.

use crate::error::{ErrorCode, RunnerError, RunnerResult};
use crate::model::{EventPayload, GoldenRecord, Summary};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

fn load_json_file<T: DeserializeOwned>(path: &Path, file_type: &str) -> RunnerResult<T> {
    let data = fs::read_to_string(path)
        .map_err(|err| RunnerError::io(format!("failed to read {file_type}"), err))?;
    serde_json::from_str(&data)
        .map_err(|err| RunnerError::io(format!("failed to parse {file_type}"), err))
}

pub fn load_golden_record(path: &Path) -> RunnerResult<GoldenRecord> {
    load_json_file(path, "golden record")
}

/// `Ok(None)` when no file exists at `path`; absence skips the comparison.
pub fn load_golden_record_optional(path: &Path) -> RunnerResult<Option<GoldenRecord>> {
    if !path.exists() {
        return Ok(None);
    }
    load_golden_record(path).map(Some)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GoldenComparison {
    pub matched: bool,
    pub expected: String,
    pub actual: String,
    pub frames_expected: Option<u64>,
    pub frames_actual: u64,
}

impl GoldenComparison {
    /// Frame counts disagree (informational only).
    pub fn frames_differ(&self) -> bool {
        self.frames_expected
            .is_some_and(|expected| expected != self.frames_actual)
    }

    pub fn to_event(&self) -> EventPayload {
        if self.matched {
            EventPayload::GoldenMatch {
                checksum: self.actual.clone(),
                frames: self.frames_actual,
            }
        } else {
            EventPayload::GoldenMismatch {
                expected: self.expected.clone(),
                actual: self.actual.clone(),
                frames_expected: self.frames_expected,
                frames_actual: self.frames_actual,
            }
        }
    }

    pub fn to_error(&self) -> Option<RunnerError> {
        if self.matched {
            return None;
        }
        Some(
            RunnerError::new(
                ErrorCode::GoldenMismatch,
                format!(
                    "Golden checksum mismatch: expected {}, got {}",
                    self.expected, self.actual
                ),
            )
            .with_context(serde_json::json!({
                "frames_expected": self.frames_expected,
                "frames_actual": self.frames_actual,
            })),
        )
    }
}

pub fn compare(summary: &Summary, golden: &GoldenRecord) -> GoldenComparison {
    GoldenComparison {
        matched: golden.checksum_chain == summary.checksum_chain,
        expected: golden.checksum_chain.clone(),
        actual: summary.checksum_chain.clone(),
        frames_expected: golden.frames,
        frames_actual: summary.frames,
    }
}
