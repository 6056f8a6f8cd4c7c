use crate::model::RunId;
use serde::{Deserialize, Serialize};

/// Final verdict of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail,
}

/// Read-only view over recorder state.
///
/// `output_sha256` and `checksum_chain` carry a `sha256:` prefix and the full
/// 64-character digest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub scenario: String,
    pub ws_in_bytes: u64,
    pub ws_out_bytes: u64,
    pub frames: u64,
    pub output_sha256: String,
    pub checksum_chain: String,
}

/// Result of [`crate::driver::run_session`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub outcome: Outcome,
    pub errors: Vec<String>,
    pub run_id: RunId,
    #[serde(flatten)]
    pub summary: Summary,
}

impl RunResult {
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Pass
    }
}

/// Externally persisted reference fingerprint. Never mutated by a run.
///
/// Unknown fields are ignored on read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldenRecord {
    pub checksum_chain: String,
    #[serde(default)]
    pub frames: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_sha256: Option<String>,
}

impl From<&Summary> for GoldenRecord {
    fn from(summary: &Summary) -> Self {
        Self {
            checksum_chain: summary.checksum_chain.clone(),
            frames: Some(summary.frames),
            scenario: Some(summary.scenario.clone()),
            output_sha256: Some(summary.output_sha256.clone()),
        }
    }
}
