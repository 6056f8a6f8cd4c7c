//! termwire: scripted, reproducible sessions against remote terminal-streaming
//! endpoints.
//!
//! A [`Scenario`] of timed steps (send bytes, resize, wait, drain) is executed
//! over one WebSocket connection while every received output chunk is folded
//! into a rolling SHA-256 checksum chain. Each run produces an append-only
//! NDJSON event log with deterministic timestamps, a summary, and optionally a
//! comparison against a previously captured golden record.

#![forbid(unsafe_code)]
// Public API types have docs; internal helpers are documented where useful.
#![allow(missing_docs)]

pub mod artifacts;
pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod golden;
pub mod model;
pub mod progress;
pub mod recorder;
pub mod scenario;

pub use crate::config::{HarnessConfig, TransportConfig};
pub use crate::driver::{run_session, DriverOptions};
pub use crate::error::{ErrorCode, RunnerError, RunnerResult};
pub use crate::model::*;
pub use crate::recorder::{RecorderHandle, SessionRecorder};
pub use crate::scenario::load_scenario_file;
