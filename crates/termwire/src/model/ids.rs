use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier correlating every event of one run.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Run ID derived from the seed alone (`remote-{seed:08x}`).
    #[must_use]
    pub fn deterministic(seed: u64) -> Self {
        Self(format!("remote-{seed:08x}"))
    }

    /// Run ID derived from the current wall-clock time in milliseconds.
    #[must_use]
    pub fn from_wall_clock() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(format!("remote-{millis:x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
