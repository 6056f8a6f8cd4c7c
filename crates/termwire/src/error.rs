//! Error codes and the crate-wide error type.

use miette::Diagnostic;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub type RunnerResult<T> = Result<T, RunnerError>;

/// Stable, machine-readable error classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Scenario document failed validation. Fatal before any connection.
    MalformedScenario,
    /// The endpoint could not be reached or the handshake failed.
    ConnectFailure,
    /// Send or receive failed after the connection was established.
    TransportFailure,
    /// Final checksum chain disagrees with the golden record.
    GoldenMismatch,
    /// A bounded operation or the whole run exceeded its time budget.
    Timeout,
    /// The run was interrupted from outside (e.g. Ctrl-C).
    Canceled,
    /// Local file I/O or (de)serialization failure.
    Io,
    /// Invalid harness configuration (environment or flags).
    InvalidConfig,
    /// Invalid command-line arguments.
    CliInvalidArg,
}

impl ErrorCode {
    pub const ALL: [Self; 9] = [
        Self::MalformedScenario,
        Self::ConnectFailure,
        Self::TransportFailure,
        Self::GoldenMismatch,
        Self::Timeout,
        Self::Canceled,
        Self::Io,
        Self::InvalidConfig,
        Self::CliInvalidArg,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MalformedScenario => "E_MALFORMED_SCENARIO",
            Self::ConnectFailure => "E_CONNECT",
            Self::TransportFailure => "E_TRANSPORT",
            Self::GoldenMismatch => "E_GOLDEN_MISMATCH",
            Self::Timeout => "E_TIMEOUT",
            Self::Canceled => "E_CANCELED",
            Self::Io => "E_IO",
            Self::InvalidConfig => "E_CONFIG",
            Self::CliInvalidArg => "E_CLI_INVALID_ARG",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by scenario loading, recording, and the session driver.
#[derive(Debug, Error, Diagnostic)]
#[error("{code}: {message}")]
pub struct RunnerError {
    pub code: ErrorCode,
    pub message: String,
    pub context: Option<Value>,
}

impl RunnerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Scenario validation failure naming the offending field.
    pub fn malformed(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        let message = message.into();
        Self::new(ErrorCode::MalformedScenario, format!("{field}: {message}"))
            .with_context(serde_json::json!({ "field": field }))
    }

    pub fn connect(message: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::ConnectFailure, message)
            .with_context(serde_json::json!({ "source": err.to_string() }))
    }

    pub fn transport(message: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::TransportFailure, message)
            .with_context(serde_json::json!({ "source": err.to_string() }))
    }

    pub fn timeout(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self {
            code: ErrorCode::Timeout,
            message: message.into(),
            context: context.into(),
        }
    }

    pub fn io(message: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::Io, message)
            .with_context(serde_json::json!({ "source": err.to_string() }))
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfig, message)
    }

    pub fn cli_invalid_arg(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CliInvalidArg, message)
    }

    /// Human-readable single line including the underlying cause, if any.
    pub fn describe(&self) -> String {
        match self
            .context
            .as_ref()
            .and_then(|ctx| ctx.get("source"))
            .and_then(Value::as_str)
        {
            Some(source) => format!("{}: {} ({source})", self.code, self.message),
            None => self.to_string(),
        }
    }
}
