use crate::model::RunId;
use crate::model::Outcome;
use serde::{Deserialize, Serialize};

/// Version tag written into every event line.
pub const EVENT_SCHEMA_VERSION: &str = "e2e-jsonl-v1";

/// One line of the append-only event log.
///
/// Ordering in the log is emission order. `timestamp`, `run_id` and `seed`
/// are injected by the recorder; callers only supply the payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub schema_version: String,
    pub timestamp: String,
    pub run_id: RunId,
    pub seed: u64,
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Type-specific event fields, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Env {
        git_commit: String,
        git_dirty: bool,
        scenario: String,
        initial_cols: u16,
        initial_rows: u16,
    },
    RunStart {
        scenario: String,
        step_count: usize,
        timeout_s: f64,
    },
    Input {
        step: usize,
        bytes: usize,
        input_hash: String,
    },
    Resize {
        step: usize,
        cols: u16,
        rows: u16,
    },
    Frame {
        frame_idx: u64,
        chunk_bytes: usize,
        chunk_hash: String,
        checksum_chain: String,
    },
    Error {
        code: String,
        message: String,
    },
    GoldenMatch {
        checksum: String,
        frames: u64,
    },
    GoldenMismatch {
        expected: String,
        actual: String,
        frames_expected: Option<u64>,
        frames_actual: u64,
    },
    RunEnd {
        outcome: Outcome,
        ws_in_bytes: u64,
        ws_out_bytes: u64,
        frames: u64,
        output_sha256: String,
        checksum_chain: String,
    },
}

impl EventPayload {
    /// Value of the `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Env { .. } => "env",
            Self::RunStart { .. } => "run_start",
            Self::Input { .. } => "input",
            Self::Resize { .. } => "resize",
            Self::Frame { .. } => "frame",
            Self::Error { .. } => "error",
            Self::GoldenMatch { .. } => "golden_match",
            Self::GoldenMismatch { .. } => "golden_mismatch",
            Self::RunEnd { .. } => "run_end",
        }
    }
}
