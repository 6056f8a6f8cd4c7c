//! Scenario loading and validation.
//!
//! Scenario documents are JSON (or YAML for `.yaml`/`.yml` files):
//!
//! ```json
//! {
//!   "name": "resize_storm",
//!   "initial_cols": 120,
//!   "initial_rows": 40,
//!   "steps": [
//!     {"type": "send", "data_hex": "6c730a", "delay_ms": 100},
//!     {"type": "resize", "cols": 80, "rows": 24, "delay_ms": 50},
//!     {"type": "send", "data_b64": "bHMgLWxhCg=="},
//!     {"type": "wait", "ms": 500},
//!     {"type": "drain"}
//!   ],
//!   "timeout_s": 30
//! }
//! ```
//!
//! Documents are first deserialized into a permissive raw shape and then
//! validated field by field, so a [`RunnerError`] with
//! [`ErrorCode::MalformedScenario`](crate::error::ErrorCode::MalformedScenario)
//! names the offending field (`name`, `initial_cols`, `steps[3].type`, ...).

use crate::error::{RunnerError, RunnerResult};
use crate::model::{
    Scenario, ScenarioWarning, Step, StepAction, TerminalSize, DEFAULT_COLS, DEFAULT_ROWS,
    DEFAULT_TIMEOUT_S, DEFAULT_WAIT_MS, MAX_TIMEOUT_S,
};
use base64::Engine as _;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawScenario {
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    initial_cols: Option<i64>,
    #[serde(default)]
    initial_rows: Option<i64>,
    steps: Option<Vec<RawStep>>,
    #[serde(default)]
    timeout_s: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStep {
    #[serde(rename = "type", default)]
    step_type: Option<String>,
    #[serde(default)]
    delay_ms: Option<i64>,
    #[serde(default)]
    data_hex: Option<String>,
    #[serde(default)]
    data_b64: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    cols: Option<i64>,
    #[serde(default)]
    rows: Option<i64>,
    #[serde(default, alias = "duration_ms")]
    ms: Option<i64>,
}

/// Load and validate a scenario file.
pub fn load_scenario_file(path: &Path) -> RunnerResult<Scenario> {
    let data = fs::read_to_string(path)
        .map_err(|err| RunnerError::io("failed to read scenario file", err))?;
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == "yaml" || ext == "yml");
    if is_yaml {
        parse_scenario_yaml(&data)
    } else {
        parse_scenario_str(&data)
    }
}

/// Parse and validate a JSON scenario document.
pub fn parse_scenario_str(data: &str) -> RunnerResult<Scenario> {
    let raw: RawScenario = serde_json::from_str(data).map_err(|err| {
        RunnerError::malformed("<document>", format!("invalid scenario json: {err}"))
    })?;
    validate(raw)
}

/// Parse and validate a YAML scenario document.
pub fn parse_scenario_yaml(data: &str) -> RunnerResult<Scenario> {
    let raw: RawScenario = serde_yml::from_str(data).map_err(|err| {
        RunnerError::malformed("<document>", format!("invalid scenario yaml: {err}"))
    })?;
    validate(raw)
}

/// Validate an already-decoded JSON value.
pub fn parse_scenario_value(value: serde_json::Value) -> RunnerResult<Scenario> {
    let raw: RawScenario = serde_json::from_value(value).map_err(|err| {
        RunnerError::malformed("<document>", format!("invalid scenario: {err}"))
    })?;
    validate(raw)
}

fn validate(raw: RawScenario) -> RunnerResult<Scenario> {
    let name = match raw.name {
        Some(name) if !name.trim().is_empty() => name,
        Some(_) => return Err(RunnerError::malformed("name", "must not be empty")),
        None => return Err(RunnerError::malformed("name", "missing required field")),
    };
    let raw_steps = raw
        .steps
        .ok_or_else(|| RunnerError::malformed("steps", "missing required field"))?;

    let initial_size = TerminalSize {
        cols: dimension("initial_cols", raw.initial_cols, DEFAULT_COLS)?,
        rows: dimension("initial_rows", raw.initial_rows, DEFAULT_ROWS)?,
    };

    let timeout_s = raw.timeout_s.unwrap_or(DEFAULT_TIMEOUT_S);
    if !timeout_s.is_finite() || timeout_s <= 0.0 {
        return Err(RunnerError::malformed(
            "timeout_s",
            format!("must be a positive number, got {timeout_s}"),
        ));
    }
    if timeout_s > MAX_TIMEOUT_S {
        return Err(RunnerError::malformed(
            "timeout_s",
            format!("must be at most {MAX_TIMEOUT_S} seconds, got {timeout_s}"),
        ));
    }

    let mut steps = Vec::with_capacity(raw_steps.len());
    let mut warnings = Vec::new();
    for (index, raw_step) in raw_steps.into_iter().enumerate() {
        steps.push(validate_step(index, raw_step, &mut warnings)?);
    }

    Ok(Scenario {
        name,
        description: raw.description,
        initial_size,
        steps,
        timeout_s,
        warnings,
    })
}

fn dimension(field: &str, value: Option<i64>, default: u16) -> RunnerResult<u16> {
    let Some(value) = value else {
        return Ok(default);
    };
    match u16::try_from(value) {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(RunnerError::malformed(
            field,
            format!("must be between 1 and {}, got {value}", u16::MAX),
        )),
    }
}

fn non_negative_ms(field: &str, value: Option<i64>, default: u64) -> RunnerResult<u64> {
    let Some(value) = value else {
        return Ok(default);
    };
    u64::try_from(value)
        .map_err(|_| RunnerError::malformed(field, format!("must be >= 0, got {value}")))
}

fn validate_step(
    index: usize,
    raw: RawStep,
    warnings: &mut Vec<ScenarioWarning>,
) -> RunnerResult<Step> {
    let field = |name: &str| format!("steps[{index}].{name}");
    let delay_ms = non_negative_ms(&field("delay_ms"), raw.delay_ms, 0)?;
    let Some(step_type) = raw.step_type.as_deref() else {
        return Err(RunnerError::malformed(field("type"), "missing step type"));
    };

    let action = match step_type {
        "send" => {
            let payload = decode_payload(index, &raw, warnings)?;
            StepAction::Send { payload }
        }
        "resize" => {
            let cols = raw
                .cols
                .ok_or_else(|| RunnerError::malformed(field("cols"), "missing required field"))?;
            let rows = raw
                .rows
                .ok_or_else(|| RunnerError::malformed(field("rows"), "missing required field"))?;
            StepAction::Resize {
                cols: dimension(&field("cols"), Some(cols), DEFAULT_COLS)?,
                rows: dimension(&field("rows"), Some(rows), DEFAULT_ROWS)?,
            }
        }
        "wait" => StepAction::Wait {
            duration_ms: non_negative_ms(&field("ms"), raw.ms, DEFAULT_WAIT_MS)?,
        },
        "drain" => StepAction::Drain,
        other => {
            return Err(RunnerError::malformed(
                field("type"),
                format!("unrecognized step type '{other}' (expected send, resize, wait, drain)"),
            ))
        }
    };

    Ok(Step { delay_ms, action })
}

/// Decode a send payload. Precedence is hex, then base64, then UTF-8 text;
/// with none present the payload is empty.
fn decode_payload(
    index: usize,
    raw: &RawStep,
    warnings: &mut Vec<ScenarioWarning>,
) -> RunnerResult<Vec<u8>> {
    let present: Vec<&str> = [
        ("data_hex", raw.data_hex.is_some()),
        ("data_b64", raw.data_b64.is_some()),
        ("data", raw.data.is_some()),
    ]
    .into_iter()
    .filter_map(|(name, set)| set.then_some(name))
    .collect();

    match present.as_slice() {
        [] => warnings.push(ScenarioWarning {
            step: index,
            message: "send step has no payload field; sending an empty payload".to_string(),
        }),
        [_] => {}
        [winner, ignored @ ..] => warnings.push(ScenarioWarning {
            step: index,
            message: format!(
                "send step has multiple payload encodings; using {winner}, ignoring {}",
                ignored.join(", ")
            ),
        }),
    }

    if let Some(hex_text) = raw.data_hex.as_deref() {
        return hex::decode(strip_whitespace(hex_text)).map_err(|err| {
            RunnerError::malformed(format!("steps[{index}].data_hex"), format!("invalid hex: {err}"))
        });
    }
    if let Some(b64_text) = raw.data_b64.as_deref() {
        return base64::engine::general_purpose::STANDARD
            .decode(strip_whitespace(b64_text))
            .map_err(|err| {
                RunnerError::malformed(
                    format!("steps[{index}].data_b64"),
                    format!("invalid base64: {err}"),
                )
            });
    }
    Ok(raw
        .data
        .as_deref()
        .map(|text| text.as_bytes().to_vec())
        .unwrap_or_default())
}

/// Payloads may be spaced (`"1b 5b 41"`) or line-wrapped; whitespace is not data.
fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_ascii_whitespace()).collect()
}
