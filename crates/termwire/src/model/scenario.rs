use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_COLS: u16 = 120;
pub const DEFAULT_ROWS: u16 = 40;
pub const DEFAULT_TIMEOUT_S: f64 = 30.0;
/// Upper bound on `timeout_s` (one day).
pub const MAX_TIMEOUT_S: f64 = 86_400.0;
pub const DEFAULT_WAIT_MS: u64 = 100;

/// Terminal dimensions in columns and rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    /// Number of columns (width).
    pub cols: u16,
    /// Number of rows (height).
    pub rows: u16,
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self {
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
        }
    }
}

/// Validated scenario. Immutable for the duration of a run.
///
/// Build one with [`crate::scenario::parse_scenario_str`] or
/// [`crate::scenario::load_scenario_file`]; both enforce positive geometry, a
/// recognised type on every step, and a decodable payload on send steps.
#[derive(Clone, Debug, PartialEq)]
pub struct Scenario {
    /// Scenario name, recorded in every lifecycle event.
    pub name: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Geometry announced in the `env` event.
    pub initial_size: TerminalSize,
    /// Steps executed strictly in order. May be empty.
    pub steps: Vec<Step>,
    /// Hard wall-clock bound for connect + steps + final settle.
    pub timeout_s: f64,
    /// Lint findings collected while parsing.
    pub warnings: Vec<ScenarioWarning>,
}

impl Scenario {
    /// `timeout_s` as a duration. Out-of-range values saturate instead of panicking.
    pub fn timeout(&self) -> Duration {
        if self.timeout_s.is_nan() || self.timeout_s <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.timeout_s).unwrap_or(Duration::MAX)
    }

    /// Non-fatal findings, such as send steps carrying several payload encodings.
    pub fn lint(&self) -> &[ScenarioWarning] {
        &self.warnings
    }
}

/// One scripted action plus the pause applied before it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    /// Pre-execution pause in milliseconds (zero is a no-op).
    pub delay_ms: u64,
    pub action: StepAction,
}

impl Step {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepAction {
    /// Transmit `payload` as one binary message.
    Send { payload: Vec<u8> },
    /// Transmit a resize control message.
    Resize { cols: u16, rows: u16 },
    /// Pure delay.
    Wait { duration_ms: u64 },
    /// Fixed settle pause so in-flight output can arrive.
    Drain,
}

impl StepAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Send { .. } => "send",
            Self::Resize { .. } => "resize",
            Self::Wait { .. } => "wait",
            Self::Drain => "drain",
        }
    }
}

/// Lint finding attached to a single step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScenarioWarning {
    /// Zero-based step index.
    pub step: usize,
    pub message: String,
}
