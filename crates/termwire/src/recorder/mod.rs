//! Session recorder: the evidence ledger of a run.
//!
//! The recorder owns all mutable run state: the event list, the optional
//! persistent event log, the raw output buffer, byte counters, the frame
//! index, and the rolling checksum chain. It is never recomputed from
//! scratch; every chunk passed to [`SessionRecorder::record_output`] advances
//! the chain exactly once, in call order:
//!
//! ```text
//! chain_0     = "000...0"                      (64 hex zeros)
//! chain_{n+1} = sha256_hex(chain_n ++ sha256_hex(chunk_{n+1}))
//! ```
//!
//! Concurrent producers (the stepper and the reader task) share one recorder
//! through [`RecorderHandle`], which serializes every mutation.

use crate::clock::Clock;
use crate::config::HarnessConfig;
use crate::error::{RunnerError, RunnerResult};
use crate::model::{Event, EventPayload, RunId, Summary, EVENT_SCHEMA_VERSION};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Initial value of the checksum chain.
pub const ZERO_CHAIN: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Hex digits of a digest surfaced in per-event fields.
pub const SHORT_DIGEST_LEN: usize = 16;

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// `sha256:` + the first [`SHORT_DIGEST_LEN`] hex digits.
pub fn short_digest(hex_digest: &str) -> String {
    let prefix = hex_digest.get(..SHORT_DIGEST_LEN).unwrap_or(hex_digest);
    format!("sha256:{prefix}")
}

/// Advance a checksum chain by one chunk.
pub fn chain_next(chain: &str, chunk: &[u8]) -> String {
    advance_chain(chain, &sha256_hex(chunk))
}

fn advance_chain(chain: &str, chunk_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chain.as_bytes());
    hasher.update(chunk_hash.as_bytes());
    hex::encode(hasher.finalize())
}

/// Fold a whole chunk sequence into its final chain value.
pub fn chain_of<'a, I>(chunks: I) -> String
where
    I: IntoIterator<Item = &'a [u8]>,
{
    chunks
        .into_iter()
        .fold(ZERO_CHAIN.to_string(), |chain, chunk| chain_next(&chain, chunk))
}

/// Append-only NDJSON event log, flushed after every line.
pub struct EventSink {
    path: PathBuf,
    file: File,
}

impl EventSink {
    pub fn open(path: &Path) -> RunnerResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|err| RunnerError::io("failed to create event log dir", err))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| RunnerError::io("failed to open event log", err))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    fn write_event(&mut self, event: &Event) -> RunnerResult<()> {
        let line = serde_json::to_string(event)
            .map_err(|err| RunnerError::io("failed to serialize event", err))?;
        writeln!(self.file, "{line}")
            .map_err(|err| RunnerError::io("failed to write event log", err))?;
        self.file
            .flush()
            .map_err(|err| RunnerError::io("failed to flush event log", err))
    }
}

pub struct SessionRecorder {
    run_id: RunId,
    seed: u64,
    scenario: String,
    clock: Clock,
    events: Vec<Event>,
    sink: Option<EventSink>,
    sink_error: Option<RunnerError>,
    output: Vec<u8>,
    ws_in_bytes: u64,
    ws_out_bytes: u64,
    frame_idx: u64,
    checksum_chain: String,
}

impl SessionRecorder {
    /// In-memory recorder; the run ID comes from `config`.
    pub fn new(scenario: impl Into<String>, config: &HarnessConfig) -> Self {
        Self {
            run_id: config.run_id(),
            seed: config.seed,
            scenario: scenario.into(),
            clock: Clock::from_config(config),
            events: Vec::new(),
            sink: None,
            sink_error: None,
            output: Vec::new(),
            ws_in_bytes: 0,
            ws_out_bytes: 0,
            frame_idx: 0,
            checksum_chain: ZERO_CHAIN.to_string(),
        }
    }

    /// Also append every event to the NDJSON file at `path`.
    pub fn with_event_log(mut self, path: &Path) -> RunnerResult<Self> {
        self.sink = Some(EventSink::open(path)?);
        Ok(self)
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_idx
    }

    /// Full, untruncated chain (no `sha256:` prefix).
    pub fn final_checksum(&self) -> &str {
        &self.checksum_chain
    }

    /// Concatenation of every recorded output chunk, in arrival order.
    pub fn full_output(&self) -> &[u8] {
        &self.output
    }

    /// First event-log write failure, if any. The log is detached after it.
    pub fn sink_error(&self) -> Option<&RunnerError> {
        self.sink_error.as_ref()
    }

    pub fn take_sink_error(&mut self) -> Option<RunnerError> {
        self.sink_error.take()
    }

    /// Append one event. The event is always kept in memory; a failed log
    /// write detaches the sink and is kept for [`Self::take_sink_error`].
    pub fn emit(&mut self, payload: EventPayload) {
        let event = Event {
            schema_version: EVENT_SCHEMA_VERSION.to_string(),
            timestamp: self.clock.timestamp(self.frame_idx),
            run_id: self.run_id.clone(),
            seed: self.seed,
            payload,
        };
        if let Some(sink) = self.sink.as_mut() {
            if let Err(err) = sink.write_event(&event) {
                tracing::warn!(error = %err, "event log write failed; continuing in memory");
                self.sink = None;
                self.sink_error.get_or_insert(err);
            }
        }
        self.events.push(event);
    }

    /// Record one received output chunk and emit its `frame` event.
    pub fn record_output(&mut self, chunk: &[u8]) {
        self.output.extend_from_slice(chunk);
        self.ws_out_bytes = self.ws_out_bytes.saturating_add(chunk.len() as u64);
        let chunk_hash = sha256_hex(chunk);
        self.checksum_chain = advance_chain(&self.checksum_chain, &chunk_hash);
        self.frame_idx += 1;
        tracing::trace!(frame = self.frame_idx, bytes = chunk.len(), "frame recorded");
        self.emit(EventPayload::Frame {
            frame_idx: self.frame_idx,
            chunk_bytes: chunk.len(),
            chunk_hash: short_digest(&chunk_hash),
            checksum_chain: short_digest(&self.checksum_chain),
        });
    }

    /// Count sent bytes. Input never feeds the checksum chain.
    pub fn record_send(&mut self, chunk: &[u8]) {
        self.ws_in_bytes = self.ws_in_bytes.saturating_add(chunk.len() as u64);
    }

    pub fn summary(&self) -> Summary {
        Summary {
            scenario: self.scenario.clone(),
            ws_in_bytes: self.ws_in_bytes,
            ws_out_bytes: self.ws_out_bytes,
            frames: self.frame_idx,
            output_sha256: format!("sha256:{}", sha256_hex(&self.output)),
            checksum_chain: format!("sha256:{}", self.checksum_chain),
        }
    }

    /// Release the event log. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if let Err(err) = sink.file.flush() {
                tracing::warn!(path = %sink.path.display(), error = %err, "event log flush failed");
            }
        }
    }
}

/// Shared, serialized access to a [`SessionRecorder`].
///
/// Cloning the handle shares the same recorder.
#[derive(Clone)]
pub struct RecorderHandle {
    inner: Arc<Mutex<SessionRecorder>>,
}

impl RecorderHandle {
    pub fn new(recorder: SessionRecorder) -> Self {
        Self {
            inner: Arc::new(Mutex::new(recorder)),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, SessionRecorder> {
        self.inner.lock().await
    }

    /// Recover the recorder once every other clone has been dropped.
    pub fn into_inner(self) -> Result<SessionRecorder, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}
