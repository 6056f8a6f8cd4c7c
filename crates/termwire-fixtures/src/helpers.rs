//! Common test helper functions.
//!
//! These utilities reduce boilerplate in integration tests: scratch
//! directories, scenario documents, and addresses nobody listens on.

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Create a unique temporary directory for a test.
///
/// The directory name includes the process ID and a timestamp to avoid
/// collisions between parallel test runs. The directory is created
/// immediately.
///
/// # Panics
///
/// Panics if the directory cannot be created.
#[must_use]
pub fn temp_dir(prefix: &str) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "termwire-{prefix}-{}-{stamp}",
        std::process::id()
    ));

    #[allow(clippy::expect_used)]
    fs::create_dir_all(&dir).expect("failed to create temp directory");

    dir
}

/// Write a scenario document to a JSON file.
///
/// # Panics
///
/// Panics if serialization or file writing fails.
pub fn write_scenario(path: &Path, scenario: &Value) {
    #[allow(clippy::expect_used)]
    let data = serde_json::to_vec_pretty(scenario).expect("failed to serialize scenario");

    #[allow(clippy::expect_used)]
    fs::write(path, data).expect("failed to write scenario file");
}

/// The canonical echo scenario: send `ls\n` once.
#[must_use]
pub fn echo_scenario() -> Value {
    json!({
        "name": "echo",
        "initial_cols": 80,
        "initial_rows": 24,
        "steps": [
            {"type": "send", "data_hex": "6c730a", "delay_ms": 0}
        ],
        "timeout_s": 5
    })
}

/// A scenario that only waits, for endpoints that push output unprompted.
#[must_use]
pub fn listen_scenario(name: &str, wait_ms: u64, timeout_s: f64) -> Value {
    json!({
        "name": name,
        "steps": [
            {"type": "wait", "ms": wait_ms}
        ],
        "timeout_s": timeout_s
    })
}

/// A `ws://` URL on a local port with no listener.
///
/// # Panics
///
/// Panics if no ephemeral port can be bound.
#[must_use]
pub fn unused_local_url() -> String {
    #[allow(clippy::expect_used)]
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("failed to bind");
    #[allow(clippy::expect_used)]
    let addr = listener.local_addr().expect("failed to read local addr");
    drop(listener);
    format!("ws://{addr}")
}
