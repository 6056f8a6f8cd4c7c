//! Harness and transport configuration.
//!
//! Configuration is an explicit value threaded into the clock, recorder, and
//! driver. [`HarnessConfig::from_env`] is the only place the process
//! environment is consulted.

use crate::error::{RunnerError, RunnerResult};
use crate::model::RunId;
use std::time::Duration;

/// Selects deterministic vs wall-clock mode (`1` = deterministic).
pub const ENV_DETERMINISTIC: &str = "E2E_DETERMINISTIC";
/// Per-frame time step in milliseconds, deterministic mode only.
pub const ENV_TIME_STEP_MS: &str = "E2E_TIME_STEP_MS";
/// Numeric seed for run-id derivation and event correlation.
pub const ENV_SEED: &str = "E2E_SEED";

pub const DEFAULT_TIME_STEP_MS: u64 = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Synthetic timestamps and seed-derived run IDs when true.
    pub deterministic: bool,
    /// Milliseconds per frame index in deterministic timestamps.
    pub time_step_ms: u64,
    /// Recorded into every event.
    pub seed: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            deterministic: true,
            time_step_ms: DEFAULT_TIME_STEP_MS,
            seed: 0,
        }
    }
}

impl HarnessConfig {
    pub fn from_env() -> RunnerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Missing keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> RunnerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let deterministic = lookup(ENV_DETERMINISTIC).map_or(defaults.deterministic, |value| {
            value.trim() == "1"
        });
        let time_step_ms = parse_u64(ENV_TIME_STEP_MS, lookup(ENV_TIME_STEP_MS))?
            .unwrap_or(defaults.time_step_ms);
        let seed = parse_u64(ENV_SEED, lookup(ENV_SEED))?.unwrap_or(defaults.seed);
        Ok(Self {
            deterministic,
            time_step_ms,
            seed,
        })
    }

    /// Run ID for a new run under this configuration.
    pub fn run_id(&self) -> RunId {
        if self.deterministic {
            RunId::deterministic(self.seed)
        } else {
            RunId::from_wall_clock()
        }
    }
}

fn parse_u64(key: &str, value: Option<String>) -> RunnerResult<Option<u64>> {
    let Some(value) = value else {
        return Ok(None);
    };
    value.trim().parse::<u64>().map(Some).map_err(|err| {
        RunnerError::config(format!("{key} must be a non-negative integer: {err}"))
            .with_context(serde_json::json!({ "key": key, "value": value }))
    })
}

/// Connection limits for the endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    /// Bound on TCP connect + WebSocket handshake.
    pub open_timeout: Duration,
    /// Bound on the closing handshake.
    pub close_timeout: Duration,
    /// Bound on a single outgoing message. The recorder stays locked while a
    /// send is pending, so a peer that stops reading also stalls the reader.
    pub send_timeout: Duration,
    /// Maximum accepted frame (and message) size in bytes.
    pub max_frame_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            open_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(5),
            max_frame_bytes: 256 * 1024,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_deterministic() {
        let config = HarnessConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.run_id().as_str(), "remote-00000000");
    }

    #[test]
    fn reads_all_keys() {
        let config = HarnessConfig::from_lookup(lookup(&[
            (ENV_DETERMINISTIC, "0"),
            (ENV_TIME_STEP_MS, "250"),
            (ENV_SEED, "48879"),
        ]))
        .unwrap();
        assert!(!config.deterministic);
        assert_eq!(config.time_step_ms, 250);
        assert_eq!(config.seed, 48879);
    }

    #[test]
    fn seed_drives_run_id() {
        let config = HarnessConfig {
            seed: 0xbeef,
            ..HarnessConfig::default()
        };
        assert_eq!(config.run_id().as_str(), "remote-0000beef");
    }

    #[test]
    fn wall_clock_run_id_has_prefix() {
        let config = HarnessConfig {
            deterministic: false,
            ..HarnessConfig::default()
        };
        assert!(config.run_id().as_str().starts_with("remote-"));
    }

    #[test]
    fn rejects_non_numeric_seed() {
        let err = HarnessConfig::from_lookup(lookup(&[(ENV_SEED, "abc")])).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidConfig);
    }
}
