//! Session driver: executes a scenario against a live endpoint.
//!
//! One WebSocket connection carries two concurrent activities:
//!
//! - the **stepper** (this task) applies each step's pre-delay and effect in
//!   scenario order and owns the sending half of the socket;
//! - the **reader** (a spawned task) owns the receiving half and feeds every
//!   binary frame to the recorder.
//!
//! Both mutate the recorder only through [`RecorderHandle`]. After the last
//! step and a final settle pause the reader is aborted and joined before the
//! summary is taken, so no frame can land after the summary.
//!
//! Failures after the recorder exists never escape [`run_session`]: they end
//! up in [`RunResult::errors`] and as `error` events, and whatever was
//! captured up to that point is still summarized.

use crate::config::TransportConfig;
use crate::error::{ErrorCode, RunnerError, RunnerResult};
use crate::golden::{compare, load_golden_record_optional};
use crate::model::{EventPayload, Outcome, RunResult, Scenario, StepAction, Summary};
use crate::progress::{ProgressCallback, ProgressEvent};
use crate::recorder::{sha256_hex, short_digest, RecorderHandle, SessionRecorder};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Pause applied by a `drain` step.
pub const DEFAULT_DRAIN_SETTLE: Duration = Duration::from_millis(500);
/// Pause after the last step before the reader is stopped.
pub const DEFAULT_FINAL_SETTLE: Duration = Duration::from_millis(300);

const GIT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Stand-in deadline when `now + timeout` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Driver runtime configuration.
#[derive(Clone)]
pub struct DriverOptions {
    /// Connection limits.
    pub transport: TransportConfig,
    /// Pause applied by each `drain` step.
    pub drain_settle: Duration,
    /// Pause after the last step.
    pub final_settle: Duration,
    /// Golden record to compare against; a missing file skips comparison.
    pub golden: Option<PathBuf>,
    /// Optional progress reporting.
    pub progress: Option<Arc<dyn ProgressCallback>>,
    /// Notified to stop the run early (e.g. from a Ctrl-C handler).
    pub cancel: Option<Arc<Notify>>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            drain_settle: DEFAULT_DRAIN_SETTLE,
            final_settle: DEFAULT_FINAL_SETTLE,
            golden: None,
            progress: None,
            cancel: None,
        }
    }
}

impl DriverOptions {
    fn report(&self, event: ProgressEvent) {
        if let Some(progress) = self.progress.as_ref() {
            progress.on_progress(&event);
        }
    }
}

/// Execute `scenario` against `endpoint` and return the verdict.
///
/// Emits `env` and `run_start`, runs the session, records any failure as an
/// `error` event, optionally compares against the golden record, and finally
/// emits `run_end`.
pub async fn run_session(
    endpoint: &str,
    scenario: &Scenario,
    recorder: &RecorderHandle,
    options: &DriverOptions,
) -> RunResult {
    let started = std::time::Instant::now();
    let revision = probe_git_revision().await;

    let run_id = {
        let mut rec = recorder.lock().await;
        rec.emit(EventPayload::Env {
            git_commit: revision.commit,
            git_dirty: revision.dirty,
            scenario: scenario.name.clone(),
            initial_cols: scenario.initial_size.cols,
            initial_rows: scenario.initial_size.rows,
        });
        rec.emit(EventPayload::RunStart {
            scenario: scenario.name.clone(),
            step_count: scenario.steps.len(),
            timeout_s: scenario.timeout_s,
        });
        rec.run_id().clone()
    };
    options.report(ProgressEvent::RunStarted {
        run_id: run_id.clone(),
        total_steps: scenario.steps.len(),
    });
    tracing::info!(%run_id, endpoint, scenario = %scenario.name, "session starting");

    let mut failures = drive(endpoint, scenario, recorder, options).await;

    let mut rec = recorder.lock().await;
    if let Some(err) = rec.take_sink_error() {
        failures.push(err);
    }
    for err in &failures {
        tracing::warn!(code = %err.code, error = %err.describe(), "run error");
        rec.emit(EventPayload::Error {
            code: err.code.as_str().to_string(),
            message: err.describe(),
        });
    }

    let summary = rec.summary();
    let mut errors: Vec<String> = failures.iter().map(RunnerError::describe).collect();

    if let Some(path) = options.golden.as_ref() {
        check_golden(&mut rec, path, &summary, &mut errors);
    }

    let outcome = if errors.is_empty() {
        Outcome::Pass
    } else {
        Outcome::Fail
    };
    rec.emit(run_end_event(outcome, &summary));
    // A sink failure on run_end itself only shows up in the returned result.
    let outcome = match rec.take_sink_error() {
        Some(err) => {
            errors.push(err.describe());
            Outcome::Fail
        }
        None => outcome,
    };
    drop(rec);

    options.report(ProgressEvent::RunCompleted {
        run_id: run_id.clone(),
        outcome,
        frames: summary.frames,
        duration_ms: elapsed_ms(started),
    });
    tracing::info!(%run_id, ?outcome, frames = summary.frames, "session finished");

    RunResult {
        outcome,
        errors,
        run_id,
        summary,
    }
}

/// Compare against the golden record at `path`, emitting the verdict event.
fn check_golden(
    rec: &mut SessionRecorder,
    path: &Path,
    summary: &Summary,
    errors: &mut Vec<String>,
) {
    match load_golden_record_optional(path) {
        Ok(Some(golden)) => {
            let comparison = compare(summary, &golden);
            if comparison.frames_differ() {
                tracing::info!(
                    expected = ?comparison.frames_expected,
                    actual = comparison.frames_actual,
                    "golden frame count differs"
                );
            }
            rec.emit(comparison.to_event());
            if let Some(err) = comparison.to_error() {
                tracing::warn!(error = %err, "golden mismatch");
                rec.emit(EventPayload::Error {
                    code: err.code.as_str().to_string(),
                    message: err.message.clone(),
                });
                errors.push(err.message);
            } else {
                tracing::info!(checksum = %comparison.actual, "golden match");
            }
        }
        Ok(None) => {
            tracing::info!(path = %path.display(), "no golden record; comparison skipped");
        }
        Err(err) => {
            rec.emit(EventPayload::Error {
                code: err.code.as_str().to_string(),
                message: err.describe(),
            });
            errors.push(err.describe());
        }
    }
}

fn run_end_event(outcome: Outcome, summary: &Summary) -> EventPayload {
    EventPayload::RunEnd {
        outcome,
        ws_in_bytes: summary.ws_in_bytes,
        ws_out_bytes: summary.ws_out_bytes,
        frames: summary.frames,
        output_sha256: summary.output_sha256.clone(),
        checksum_chain: summary.checksum_chain.clone(),
    }
}

/// Connect, run the steps alongside the reader, then stop the reader.
/// Returns every failure in the order it was observed.
async fn drive(
    endpoint: &str,
    scenario: &Scenario,
    recorder: &RecorderHandle,
    options: &DriverOptions,
) -> Vec<RunnerError> {
    let mut failures = Vec::new();
    let deadline = deadline_after(scenario.timeout());
    let cancel = options.cancel.as_deref();

    let connect_deadline = deadline.min(deadline_after(options.transport.open_timeout));
    let connection = match bounded(
        connect(endpoint, &options.transport),
        connect_deadline,
        cancel,
    )
    .await
    {
        Ok(Ok(connection)) => connection,
        Ok(Err(err)) => {
            failures.push(err);
            return failures;
        }
        Err(interrupt) => {
            let err = if interrupt == Interrupt::Deadline && connect_deadline < deadline {
                RunnerError::timeout(
                    format!(
                        "connect timed out after {} ms",
                        options.transport.open_timeout.as_millis()
                    ),
                    serde_json::json!({ "endpoint": endpoint }),
                )
            } else {
                interrupt.into_error(scenario)
            };
            failures.push(err);
            return failures;
        }
    };
    tracing::info!(endpoint, "connected");

    let (mut sink, stream) = connection.split();
    let reader = tokio::spawn(read_loop(stream, recorder.clone()));

    let stepping = execute_steps(&mut sink, scenario, recorder, options);
    match bounded(stepping, deadline, cancel).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => failures.push(err),
        Err(interrupt) => failures.push(interrupt.into_error(scenario)),
    }

    reader.abort();
    match reader.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => failures.push(err),
        Err(join_err) if join_err.is_cancelled() => {}
        Err(join_err) => failures.push(RunnerError::transport("reader task failed", join_err)),
    }

    match tokio::time::timeout(options.transport.close_timeout, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::debug!(error = %err, "close handshake failed"),
        Err(_) => tracing::debug!("close handshake timed out"),
    }

    failures
}

type Connection =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(endpoint: &str, transport: &TransportConfig) -> RunnerResult<Connection> {
    let config = WebSocketConfig::default()
        .max_message_size(Some(transport.max_frame_bytes))
        .max_frame_size(Some(transport.max_frame_bytes));
    let (connection, _response) =
        tokio_tungstenite::connect_async_with_config(endpoint, Some(config), false)
            .await
            .map_err(|err| RunnerError::connect(format!("failed to connect to {endpoint}"), err))?;
    Ok(connection)
}

/// Apply every step in order, then the final settle pause.
async fn execute_steps<S>(
    sink: &mut S,
    scenario: &Scenario,
    recorder: &RecorderHandle,
    options: &DriverOptions,
) -> RunnerResult<()>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    for (index, step) in scenario.steps.iter().enumerate() {
        let step_started = std::time::Instant::now();
        let kind = step.action.kind();
        options.report(ProgressEvent::StepStarted {
            step_index: index + 1,
            kind,
        });

        tokio::time::sleep(step.delay()).await;

        match &step.action {
            StepAction::Send { payload } => {
                // Held across the send so the input event precedes any frame
                // the endpoint produces in response.
                let mut rec = recorder.lock().await;
                send_bounded(sink, Message::binary(payload.clone()), &options.transport, || {
                    format!("send failed at step {index}")
                })
                .await?;
                rec.record_send(payload);
                rec.emit(EventPayload::Input {
                    step: index,
                    bytes: payload.len(),
                    input_hash: short_digest(&sha256_hex(payload)),
                });
            }
            StepAction::Resize { cols, rows } => {
                let mut rec = recorder.lock().await;
                send_bounded(
                    sink,
                    Message::text(resize_control(*cols, *rows)),
                    &options.transport,
                    || format!("resize failed at step {index}"),
                )
                .await?;
                rec.emit(EventPayload::Resize {
                    step: index,
                    cols: *cols,
                    rows: *rows,
                });
            }
            StepAction::Wait { duration_ms } => {
                tokio::time::sleep(Duration::from_millis(*duration_ms)).await;
            }
            StepAction::Drain => {
                tokio::time::sleep(options.drain_settle).await;
            }
        }
        tracing::debug!(step = index, kind, "step dispatched");

        options.report(ProgressEvent::StepCompleted {
            step_index: index + 1,
            kind,
            duration_ms: elapsed_ms(step_started),
        });
    }

    tokio::time::sleep(options.final_settle).await;
    Ok(())
}

/// Send one message within `send_timeout`.
///
/// Callers hold the recorder lock across this call so an `input` event always
/// precedes the echo it provokes; the bound keeps a peer that stopped reading
/// from stalling the reader until the run deadline.
async fn send_bounded<S>(
    sink: &mut S,
    message: Message,
    transport: &TransportConfig,
    what: impl FnOnce() -> String,
) -> RunnerResult<()>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    match tokio::time::timeout(transport.send_timeout, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(RunnerError::transport(what(), err)),
        Err(_) => Err(RunnerError::transport(
            what(),
            format!(
                "peer did not accept data within {} ms",
                transport.send_timeout.as_millis()
            ),
        )),
    }
}

/// `now + timeout`, saturating to a far-future instant on overflow.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Control message announcing a geometry change. Key order is fixed.
fn resize_control(cols: u16, rows: u16) -> String {
    format!(r#"{{"type":"resize","cols":{cols},"rows":{rows}}}"#)
}

/// Forward binary frames to the recorder until the stream ends.
///
/// Text and control frames are ignored. A closed connection is a clean end;
/// any other receive error is a transport failure.
async fn read_loop<S>(mut stream: S, recorder: RecorderHandle) -> RunnerResult<()>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Binary(bytes)) => recorder.lock().await.record_output(&bytes),
            Ok(Message::Close(_)) => break,
            Ok(Message::Text(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => break,
            Err(err) => return Err(RunnerError::transport("receive failed", err)),
        }
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Interrupt {
    Deadline,
    Canceled,
}

impl Interrupt {
    fn into_error(self, scenario: &Scenario) -> RunnerError {
        match self {
            Self::Deadline => RunnerError::timeout(
                format!("run exceeded timeout of {}s", scenario.timeout_s),
                serde_json::json!({ "timeout_s": scenario.timeout_s }),
            ),
            Self::Canceled => RunnerError::new(ErrorCode::Canceled, "run canceled"),
        }
    }
}

/// Race `fut` against `deadline` and the optional cancel signal.
async fn bounded<F: Future>(
    fut: F,
    deadline: Instant,
    cancel: Option<&Notify>,
) -> Result<F::Output, Interrupt> {
    let canceled = async {
        match cancel {
            Some(notify) => notify.notified().await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        output = fut => Ok(output),
        () = tokio::time::sleep_until(deadline) => Err(Interrupt::Deadline),
        () = canceled => Err(Interrupt::Canceled),
    }
}

struct Revision {
    commit: String,
    dirty: bool,
}

/// Best-effort source revision for the `env` event. Never fails.
async fn probe_git_revision() -> Revision {
    let Some(commit) = git_output(&["rev-parse", "--short", "HEAD"])
        .await
        .filter(|sha| !sha.is_empty())
    else {
        return Revision {
            commit: "unknown".to_string(),
            dirty: false,
        };
    };
    let dirty = git_output(&["status", "--porcelain", "--untracked-files=no"])
        .await
        .is_some_and(|status| !status.is_empty());
    Revision { commit, dirty }
}

async fn git_output(args: &[&str]) -> Option<String> {
    let output = tokio::process::Command::new("git")
        .args(args)
        .stdin(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .output();
    match tokio::time::timeout(GIT_PROBE_TIMEOUT, output).await {
        Ok(Ok(out)) if out.status.success() => {
            Some(String::from_utf8_lossy(&out.stdout).trim().to_string())
        }
        Ok(Ok(_)) => None,
        Ok(Err(err)) => {
            tracing::debug!(error = %err, "git unavailable");
            None
        }
        Err(_) => {
            tracing::debug!("git probe timed out");
            None
        }
    }
}

fn elapsed_ms(started: std::time::Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
