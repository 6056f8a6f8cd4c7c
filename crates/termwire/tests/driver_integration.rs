// Test module - relaxed lint rules
#![allow(clippy::indexing_slicing)]
#![allow(clippy::panic)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use termwire::artifacts::write_golden_record;
use termwire::config::{HarnessConfig, TransportConfig};
use termwire::driver::{run_session, DriverOptions};
use termwire::model::{Event, EventPayload, Outcome, RunResult};
use termwire::progress::{CollectingProgress, ProgressEvent};
use termwire::recorder::{sha256_hex, RecorderHandle, SessionRecorder, ZERO_CHAIN};
use termwire::scenario::parse_scenario_value;
use termwire_fixtures::helpers::{echo_scenario, listen_scenario, temp_dir, unused_local_url};
use termwire_fixtures::{AfterScript, EchoEndpoint, ScriptedEndpoint, StalledEndpoint};
use tokio::sync::Notify;

fn quick_options() -> DriverOptions {
    DriverOptions {
        drain_settle: Duration::from_millis(100),
        final_settle: Duration::from_millis(200),
        ..DriverOptions::default()
    }
}

async fn run_with(
    url: &str,
    scenario: Value,
    options: &DriverOptions,
    event_log: Option<&Path>,
) -> (RunResult, Vec<Event>) {
    let scenario = parse_scenario_value(scenario).unwrap();
    let mut recorder = SessionRecorder::new(scenario.name.clone(), &HarnessConfig::default());
    if let Some(path) = event_log {
        recorder = recorder.with_event_log(path).unwrap();
    }
    let handle = RecorderHandle::new(recorder);
    let result = run_session(url, &scenario, &handle, options).await;
    let mut recorder = handle.into_inner().ok().expect("recorder still shared");
    recorder.close();
    (result, recorder.events().to_vec())
}

fn types(events: &[Event]) -> Vec<&'static str> {
    events.iter().map(|e| e.payload.event_type()).collect()
}

fn error_codes(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::Error { code, .. } => Some(code.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn echo_scenario_end_to_end() {
    let endpoint = EchoEndpoint::spawn().await.unwrap();
    let (result, events) = run_with(&endpoint.url(), echo_scenario(), &quick_options(), None).await;

    assert_eq!(result.outcome, Outcome::Pass, "errors: {:?}", result.errors);
    assert!(result.errors.is_empty());
    assert_eq!(result.summary.frames, 1);
    assert_eq!(result.summary.ws_in_bytes, 3);
    assert_eq!(result.summary.ws_out_bytes, 3);
    assert_eq!(
        result.summary.output_sha256,
        format!("sha256:{}", sha256_hex(b"ls\n"))
    );
    assert_eq!(result.run_id.as_str(), "remote-00000000");
    assert_eq!(endpoint.received_binary(), vec![b"ls\n".to_vec()]);

    assert_eq!(types(&events), ["env", "run_start", "input", "frame", "run_end"]);
    let EventPayload::Env {
        initial_cols,
        initial_rows,
        scenario,
        ..
    } = &events[0].payload
    else {
        panic!("expected env event");
    };
    assert_eq!((*initial_cols, *initial_rows), (80, 24));
    assert_eq!(scenario, "echo");

    let EventPayload::RunEnd {
        outcome,
        frames,
        checksum_chain,
        ..
    } = &events[4].payload
    else {
        panic!("expected run_end event");
    };
    assert_eq!(*outcome, Outcome::Pass);
    assert_eq!(*frames, 1);
    assert_eq!(checksum_chain, &result.summary.checksum_chain);
}

#[tokio::test(flavor = "multi_thread")]
async fn identical_runs_produce_identical_logs() {
    let endpoint = EchoEndpoint::spawn().await.unwrap();
    let dir = temp_dir("determinism");
    let scenario = json!({
        "name": "twice",
        "steps": [
            {"type": "send", "data": "echo one\n"},
            {"type": "send", "data": "echo two\n", "delay_ms": 150},
            {"type": "resize", "cols": 100, "rows": 30, "delay_ms": 50},
            {"type": "drain"}
        ],
        "timeout_s": 10
    });

    let first = dir.join("first.jsonl");
    let second = dir.join("second.jsonl");
    let (a, _) = run_with(&endpoint.url(), scenario.clone(), &quick_options(), Some(&first)).await;
    let (b, _) = run_with(&endpoint.url(), scenario, &quick_options(), Some(&second)).await;

    assert!(a.passed(), "errors: {:?}", a.errors);
    assert_eq!(a, b);
    let first_bytes = std::fs::read(&first).unwrap();
    let second_bytes = std::fs::read(&second).unwrap();
    assert!(!first_bytes.is_empty());
    assert_eq!(first_bytes, second_bytes);
}

#[tokio::test(flavor = "multi_thread")]
async fn input_precedes_its_echo_and_resize_uses_control_message() {
    let endpoint = EchoEndpoint::spawn().await.unwrap();
    let scenario = json!({
        "name": "resize",
        "steps": [
            {"type": "resize", "cols": 100, "rows": 30},
            {"type": "send", "data_hex": "6869"},
            {"type": "wait", "ms": 50}
        ]
    });
    let (result, events) = run_with(&endpoint.url(), scenario, &quick_options(), None).await;

    assert!(result.passed(), "errors: {:?}", result.errors);
    assert_eq!(
        types(&events),
        ["env", "run_start", "resize", "input", "frame", "run_end"]
    );
    assert_eq!(
        endpoint.received_text(),
        vec![r#"{"type":"resize","cols":100,"rows":30}"#.to_string()]
    );
    // The resize_ack text reply is not output.
    assert_eq!(result.summary.frames, 1);
    assert_eq!(result.summary.ws_in_bytes, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_scenario_passes_with_zero_chain() {
    let endpoint = EchoEndpoint::spawn().await.unwrap();
    let (result, events) = run_with(
        &endpoint.url(),
        json!({"name": "empty", "steps": []}),
        &quick_options(),
        None,
    )
    .await;

    assert!(result.passed());
    assert_eq!(result.summary.frames, 0);
    assert_eq!(result.summary.ws_in_bytes, 0);
    assert_eq!(result.summary.checksum_chain, format!("sha256:{ZERO_CHAIN}"));
    assert_eq!(types(&events), ["env", "run_start", "run_end"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn unprompted_output_is_recorded_and_noise_ignored() {
    let endpoint = ScriptedEndpoint::new([b"banner\r\n".to_vec(), b"$ ".to_vec()])
        .with_noise()
        .after(AfterScript::Close)
        .spawn()
        .await
        .unwrap();
    let (result, events) = run_with(
        &endpoint.url(),
        listen_scenario("listen", 300, 5.0),
        &quick_options(),
        None,
    )
    .await;

    assert!(result.passed(), "errors: {:?}", result.errors);
    assert_eq!(result.summary.frames, 2);
    assert_eq!(result.summary.ws_out_bytes, 10);
    assert_eq!(
        result.summary.checksum_chain,
        format!(
            "sha256:{}",
            termwire::recorder::chain_of([b"banner\r\n".as_slice(), b"$ ".as_slice()])
        )
    );
    assert!(error_codes(&events).is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn dropped_connection_keeps_captured_frames() {
    let endpoint = ScriptedEndpoint::new([b"one".to_vec(), b"two".to_vec()])
        .after(AfterScript::Drop)
        .spawn()
        .await
        .unwrap();
    let (result, events) = run_with(
        &endpoint.url(),
        listen_scenario("partial", 300, 5.0),
        &quick_options(),
        None,
    )
    .await;

    assert_eq!(result.outcome, Outcome::Fail);
    assert_eq!(result.summary.frames, 2);
    assert_eq!(result.summary.ws_out_bytes, 6);
    assert!(result.errors.iter().any(|e| e.starts_with("E_TRANSPORT")));
    assert_eq!(error_codes(&events), ["E_TRANSPORT"]);
    assert_eq!(events.last().unwrap().payload.event_type(), "run_end");
}

#[tokio::test(flavor = "multi_thread")]
async fn connect_failure_still_produces_summary_and_log() {
    let dir = temp_dir("connect-failure");
    let log = dir.join("events.jsonl");
    let (result, events) =
        run_with(&unused_local_url(), echo_scenario(), &quick_options(), Some(&log)).await;

    assert_eq!(result.outcome, Outcome::Fail);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("E_CONNECT"), "{:?}", result.errors);
    assert_eq!(result.summary.frames, 0);
    assert_eq!(result.summary.checksum_chain, format!("sha256:{ZERO_CHAIN}"));
    assert_eq!(types(&events), ["env", "run_start", "error", "run_end"]);

    let text = std::fs::read_to_string(&log).unwrap();
    assert_eq!(text.lines().count(), 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn stalled_handshake_hits_open_timeout() {
    let endpoint = StalledEndpoint::spawn().await.unwrap();
    let options = DriverOptions {
        transport: TransportConfig {
            open_timeout: Duration::from_millis(200),
            ..TransportConfig::default()
        },
        ..quick_options()
    };
    let started = Instant::now();
    let (result, events) = run_with(&endpoint.url(), echo_scenario(), &options, None).await;

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(result.outcome, Outcome::Fail);
    assert!(result.errors[0].contains("connect timed out"));
    assert_eq!(error_codes(&events), ["E_TIMEOUT"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn overall_timeout_aborts_a_stuck_run() {
    let endpoint = EchoEndpoint::spawn().await.unwrap();
    let scenario = json!({
        "name": "stuck",
        "steps": [
            {"type": "send", "data": "x"},
            {"type": "wait", "ms": 10_000}
        ],
        "timeout_s": 0.5
    });
    let started = Instant::now();
    let (result, events) = run_with(&endpoint.url(), scenario, &quick_options(), None).await;

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(result.outcome, Outcome::Fail);
    assert_eq!(error_codes(&events), ["E_TIMEOUT"]);
    assert_eq!(result.summary.ws_in_bytes, 1);
    assert_eq!(events.last().unwrap().payload.event_type(), "run_end");
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_stops_stepping_and_records_error() {
    let endpoint = EchoEndpoint::spawn().await.unwrap();
    let cancel = Arc::new(Notify::new());
    let options = DriverOptions {
        cancel: Some(Arc::clone(&cancel)),
        ..quick_options()
    };
    let trigger = Arc::clone(&cancel);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.notify_one();
    });

    let started = Instant::now();
    let (result, events) = run_with(
        &endpoint.url(),
        listen_scenario("cancel", 10_000, 30.0),
        &options,
        None,
    )
    .await;

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(result.outcome, Outcome::Fail);
    assert_eq!(error_codes(&events), ["E_CANCELED"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn golden_round_trip_then_mismatch() {
    let endpoint = EchoEndpoint::spawn().await.unwrap();
    let dir = temp_dir("golden-run");
    let golden = dir.join("echo.golden.json");

    let (first, _) = run_with(&endpoint.url(), echo_scenario(), &quick_options(), None).await;
    assert!(first.passed());
    write_golden_record(&golden, &first.summary).unwrap();

    let options = DriverOptions {
        golden: Some(golden.clone()),
        ..quick_options()
    };
    let (second, events) = run_with(&endpoint.url(), echo_scenario(), &options, None).await;
    assert!(second.passed(), "errors: {:?}", second.errors);
    assert!(types(&events).contains(&"golden_match"));

    let other = json!({
        "name": "echo",
        "steps": [{"type": "send", "data": "pwd\n"}]
    });
    let (third, events) = run_with(&endpoint.url(), other, &options, None).await;
    assert_eq!(third.outcome, Outcome::Fail);
    assert_eq!(third.errors.len(), 1);
    assert!(third.errors[0].starts_with("Golden checksum mismatch: expected "));
    assert_eq!(error_codes(&events), ["E_GOLDEN_MISMATCH"]);

    let mismatch = events
        .iter()
        .find_map(|e| match &e.payload {
            EventPayload::GoldenMismatch {
                expected, actual, ..
            } => Some((expected.clone(), actual.clone())),
            _ => None,
        })
        .unwrap();
    assert_eq!(mismatch.0, first.summary.checksum_chain);
    assert_eq!(mismatch.1, third.summary.checksum_chain);
    let EventPayload::RunEnd { outcome, .. } = &events.last().unwrap().payload else {
        panic!("expected run_end last");
    };
    assert_eq!(*outcome, Outcome::Fail);
}

#[tokio::test(flavor = "multi_thread")]
async fn absent_golden_file_skips_comparison() {
    let endpoint = EchoEndpoint::spawn().await.unwrap();
    let dir = temp_dir("golden-absent");
    let options = DriverOptions {
        golden: Some(dir.join("does-not-exist.json")),
        ..quick_options()
    };
    let (result, events) = run_with(&endpoint.url(), echo_scenario(), &options, None).await;

    assert!(result.passed());
    let kinds = types(&events);
    assert!(!kinds.contains(&"golden_match"));
    assert!(!kinds.contains(&"golden_mismatch"));
}

#[tokio::test(flavor = "multi_thread")]
async fn progress_reports_every_step() {
    let endpoint = EchoEndpoint::spawn().await.unwrap();
    let progress = Arc::new(CollectingProgress::new());
    let options = DriverOptions {
        progress: Some(progress.clone()),
        ..quick_options()
    };
    let scenario = json!({
        "name": "progress",
        "steps": [
            {"type": "send", "data": "a"},
            {"type": "wait", "ms": 10}
        ]
    });
    let (result, _) = run_with(&endpoint.url(), scenario, &options, None).await;
    assert!(result.passed());

    let seen = progress.events();
    assert!(matches!(
        seen.first(),
        Some(ProgressEvent::RunStarted { total_steps: 2, .. })
    ));
    let completed: Vec<(usize, &str)> = seen
        .iter()
        .filter_map(|event| match event {
            ProgressEvent::StepCompleted {
                step_index, kind, ..
            } => Some((*step_index, *kind)),
            _ => None,
        })
        .collect();
    assert_eq!(completed, [(1, "send"), (2, "wait")]);
    assert!(matches!(
        seen.last(),
        Some(ProgressEvent::RunCompleted {
            outcome: Outcome::Pass,
            frames: 1,
            ..
        })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn unrepresentable_timeout_still_completes() {
    let endpoint = EchoEndpoint::spawn().await.unwrap();
    let mut scenario = parse_scenario_value(echo_scenario()).unwrap();
    scenario.timeout_s = 1e20;
    let handle = RecorderHandle::new(SessionRecorder::new(
        scenario.name.clone(),
        &HarnessConfig::default(),
    ));

    let result = run_session(&endpoint.url(), &scenario, &handle, &quick_options()).await;

    assert!(result.passed(), "{:?}", result.errors);
    let recorder = handle.into_inner().ok().expect("recorder still shared");
    assert_eq!(
        types(recorder.events()),
        ["env", "run_start", "input", "frame", "run_end"]
    );
}

#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread")]
async fn event_log_write_failure_fails_run_but_keeps_events() {
    let endpoint = EchoEndpoint::spawn().await.unwrap();
    let (result, events) = run_with(
        &endpoint.url(),
        echo_scenario(),
        &quick_options(),
        Some(Path::new("/dev/full")),
    )
    .await;

    assert_eq!(result.outcome, Outcome::Fail);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("E_IO"), "{:?}", result.errors);
    assert_eq!(result.summary.frames, 1);
    assert_eq!(
        types(&events),
        ["env", "run_start", "input", "frame", "error", "run_end"]
    );
    assert_eq!(error_codes(&events), ["E_IO"]);
}
