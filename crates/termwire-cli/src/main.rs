//! termwire CLI: scripted, reproducible remote terminal sessions.
//!
//! Runs a scenario against a terminal-streaming WebSocket endpoint, writes the
//! NDJSON event log and artifacts, and exits 0 only when the run passed.

// CLI-specific lint allowances (CLI binary, not library)
#![allow(missing_docs)]
#![allow(clippy::print_stdout)] // CLI must print to stdout
#![allow(clippy::print_stderr)] // CLI must print to stderr
#![allow(clippy::exit)] // CLI uses exit codes

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use miette::{miette, IntoDiagnostic, Result};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use termwire::artifacts::{write_golden_record, write_summary, write_transcript};
use termwire::config::HarnessConfig;
use termwire::driver::{run_session, DriverOptions};
use termwire::error::RunnerError;
use termwire::model::{Outcome, RunResult};
use termwire::progress::ProgressCallback;
use termwire::recorder::{RecorderHandle, SessionRecorder};
use termwire::scenario::load_scenario_file;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

mod progress;

const DEFAULT_URL: &str = "ws://127.0.0.1:9231";

/// Color output mode
#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum ColorMode {
    /// Auto-detect based on terminal and `NO_COLOR` env
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

#[derive(Debug, Parser)]
#[command(
    name = "termwire",
    version,
    about = "Scripted, reproducible remote terminal sessions"
)]
struct Cli {
    /// Control color output
    #[arg(long, value_enum, default_value = "auto", global = true)]
    color: ColorMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Execute a scenario against a live endpoint
    Run(RunArgs),
    /// Check a scenario file without connecting
    Validate {
        #[arg(long, help = "Scenario file (JSON, or YAML by extension)")]
        scenario: PathBuf,
        #[arg(long, help = "Output as JSON (default: human-readable)")]
        json: bool,
    },
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        #[arg(value_enum, help = "Shell to generate completions for")]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, default_value = DEFAULT_URL, help = "Endpoint URL (ws:// or wss://)")]
    url: String,
    #[arg(long, help = "Scenario file (JSON, or YAML by extension)")]
    scenario: PathBuf,
    #[arg(long, help = "Golden record to compare against (skipped if absent)")]
    golden: Option<PathBuf>,
    #[arg(long, help = "Append events to this NDJSON file")]
    jsonl: Option<PathBuf>,
    #[arg(long, help = "Save the raw output transcript")]
    transcript: Option<PathBuf>,
    #[arg(long, help = "Print the summary JSON to stdout")]
    summary: bool,
    #[arg(long, help = "Write a golden record from a passing run")]
    write_golden: Option<PathBuf>,
    #[arg(long, help = "Write the summary JSON to this file")]
    summary_file: Option<PathBuf>,
    #[arg(long, help = "Seed for run-id derivation (overrides E2E_SEED)")]
    seed: Option<u64>,
    #[arg(long, help = "Milliseconds per frame in timestamps (overrides E2E_TIME_STEP_MS)")]
    time_step_ms: Option<u64>,
    #[arg(long, help = "Use wall-clock timestamps (overrides E2E_DETERMINISTIC)")]
    wall_clock: bool,
    #[arg(long, short = 'v', help = "Show step-by-step progress to stderr")]
    verbose: bool,
}

/// Configure color output based on CLI flag and environment.
/// Returns whether color is enabled.
fn configure_colors(mode: ColorMode) -> bool {
    let use_color = match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => {
            if std::env::var("NO_COLOR").is_ok() {
                false
            } else {
                // Diagnostics and logs go to stderr
                supports_color::on(supports_color::Stream::Stderr).is_some()
            }
        }
    };

    miette::set_hook(Box::new(move |_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .color(use_color)
                .unicode(use_color)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set

    use_color
}

/// Logs go to stderr: `warn` by default, `info` with `-v`, `RUST_LOG` wins.
fn init_tracing(verbose: bool, ansi: bool) {
    let fallback = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(ansi)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let use_color = configure_colors(cli.color);
    let verbose = matches!(&cli.command, Commands::Run(args) if args.verbose);
    init_tracing(verbose, use_color);
    match cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Validate { scenario, json } => cmd_validate(scenario, json),
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

// =============================================================================
// Command Handlers
// =============================================================================

/// Handle the run command.
fn cmd_run(args: RunArgs) -> Result<()> {
    validate_url(&args.url)?;
    let harness = harness_config(&args)?;
    let scenario = load_scenario_file(&args.scenario)?;
    for warning in scenario.lint() {
        tracing::warn!(step = warning.step, "{}", warning.message);
    }

    let mut recorder = SessionRecorder::new(scenario.name.clone(), &harness);
    if let Some(path) = args.jsonl.as_deref() {
        recorder = recorder.with_event_log(path)?;
    }
    let handle = RecorderHandle::new(recorder);

    let cancel = Arc::new(Notify::new());
    install_interrupt_handler(&cancel);
    let progress: Option<Arc<dyn ProgressCallback>> = if args.verbose {
        Some(Arc::new(progress::VerboseProgress::new()))
    } else {
        None
    };
    let options = DriverOptions {
        golden: args.golden.clone(),
        progress,
        cancel: Some(cancel),
        ..DriverOptions::default()
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;
    let mut result = runtime.block_on(run_session(&args.url, &scenario, &handle, &options));
    drop(runtime);

    let mut recorder = handle
        .into_inner()
        .map_err(|_| miette!("session recorder is still in use after the run"))?;
    recorder.close();
    persist_artifacts(&args, &recorder, &mut result);

    if args.summary || args.jsonl.is_none() {
        let payload = serde_json::to_string_pretty(&result).into_diagnostic()?;
        println!("{payload}");
    }
    if !result.passed() {
        std::process::exit(1);
    }
    Ok(())
}

/// Write the requested artifacts. Failures fail the run but never abort it.
fn persist_artifacts(args: &RunArgs, recorder: &SessionRecorder, result: &mut RunResult) {
    let mut failures: Vec<RunnerError> = Vec::new();
    if let Some(path) = args.transcript.as_deref() {
        if let Err(err) = write_transcript(path, recorder.full_output()) {
            failures.push(err);
        }
    }
    if let Some(path) = args.write_golden.as_deref() {
        if result.passed() {
            match write_golden_record(path, &result.summary) {
                Ok(()) => tracing::info!(path = %path.display(), "golden record written"),
                Err(err) => failures.push(err),
            }
        } else {
            tracing::warn!(path = %path.display(), "run failed; golden record not written");
        }
    }
    for err in failures {
        tracing::error!(error = %err.describe(), "artifact write failed");
        result.errors.push(err.describe());
        result.outcome = Outcome::Fail;
    }
    if let Some(path) = args.summary_file.as_deref() {
        if let Err(err) = write_summary(path, result) {
            tracing::error!(error = %err.describe(), "summary write failed");
            result.errors.push(err.describe());
            result.outcome = Outcome::Fail;
        }
    }
}

/// Handle the validate command.
fn cmd_validate(path: PathBuf, json: bool) -> Result<()> {
    let scenario = match load_scenario_file(&path) {
        Ok(scenario) => scenario,
        Err(err) if json => {
            let payload = serde_json::json!({
                "valid": false,
                "code": err.code.as_str(),
                "message": err.message,
                "context": err.context,
            });
            println!("{payload}");
            std::process::exit(1);
        }
        Err(err) => return Err(err.into()),
    };

    if json {
        let payload = serde_json::json!({
            "valid": true,
            "name": scenario.name,
            "steps": scenario.steps.len(),
            "timeout_s": scenario.timeout_s,
            "warnings": scenario.lint(),
        });
        println!("{payload}");
    } else {
        println!(
            "{}: valid ({} steps, timeout {}s)",
            scenario.name,
            scenario.steps.len(),
            scenario.timeout_s
        );
        for warning in scenario.lint() {
            println!("  warning: step {}: {}", warning.step, warning.message);
        }
    }
    Ok(())
}

/// Handle the completions command.
#[allow(clippy::unnecessary_wraps)] // Consistent with other command handlers
fn cmd_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}

fn validate_url(url: &str) -> Result<(), RunnerError> {
    if url.starts_with("ws://") || url.starts_with("wss://") {
        Ok(())
    } else {
        Err(RunnerError::cli_invalid_arg(format!(
            "--url must start with ws:// or wss://, got '{url}'"
        )))
    }
}

/// Environment first, then explicit flags.
fn harness_config(args: &RunArgs) -> Result<HarnessConfig, RunnerError> {
    let mut config = HarnessConfig::from_env()?;
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(step) = args.time_step_ms {
        config.time_step_ms = step;
    }
    if args.wall_clock {
        config.deterministic = false;
    }
    Ok(config)
}

fn install_interrupt_handler(cancel: &Arc<Notify>) {
    let cancel = Arc::clone(cancel);
    if let Err(err) = ctrlc::set_handler(move || cancel.notify_one()) {
        tracing::warn!(error = %err, "could not install Ctrl-C handler");
    }
}
