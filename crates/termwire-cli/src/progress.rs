//! Verbose progress output using indicatif.

use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::sync::Mutex;
use termwire::model::Outcome;
use termwire::progress::{ProgressCallback, ProgressEvent};

/// Progress callback that outputs step-by-step progress to stderr.
pub struct VerboseProgress {
    spinner: Mutex<Option<ProgressBar>>,
    total_steps: Mutex<usize>,
}

impl VerboseProgress {
    /// Create a new verbose progress callback.
    pub fn new() -> Self {
        Self {
            spinner: Mutex::new(None),
            total_steps: Mutex::new(0),
        }
    }

    fn clear_spinner(&self) {
        if let Ok(mut spinner) = self.spinner.lock() {
            if let Some(pb) = spinner.take() {
                pb.finish_and_clear();
            }
        }
    }
}

impl ProgressCallback for VerboseProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::RunStarted {
                run_id,
                total_steps,
            } => {
                if let Ok(mut ts) = self.total_steps.lock() {
                    *ts = *total_steps;
                }
                // stderr only; stdout carries the summary JSON
                let _ = writeln!(
                    std::io::stderr(),
                    "run started: {run_id} ({total_steps} steps)"
                );
            }
            ProgressEvent::StepStarted { step_index, kind } => {
                let total = self.total_steps.lock().map(|g| *g).unwrap_or(0);
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.cyan} [{elapsed_precise}] {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                pb.set_message(format!("[{step_index}/{total}] {kind}"));
                pb.enable_steady_tick(std::time::Duration::from_millis(100));

                if let Ok(mut spinner) = self.spinner.lock() {
                    *spinner = Some(pb);
                }
            }
            ProgressEvent::StepCompleted {
                step_index,
                kind,
                duration_ms,
            } => {
                self.clear_spinner();
                let _ = writeln!(
                    std::io::stderr(),
                    "  \x1b[32m✓\x1b[0m {step_index}: {kind} ({duration_ms}ms)"
                );
            }
            ProgressEvent::RunCompleted {
                run_id: _,
                outcome,
                frames,
                duration_ms,
            } => {
                self.clear_spinner();
                let status_msg = match outcome {
                    Outcome::Pass => "\x1b[32mpassed\x1b[0m",
                    Outcome::Fail => "\x1b[31mfailed\x1b[0m",
                };
                let _ = writeln!(
                    std::io::stderr(),
                    "run {status_msg}: {frames} frames, {duration_ms}ms total"
                );
            }
        }
    }
}
