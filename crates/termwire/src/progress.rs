//! Progress callback for reporting run progress.
//!
//! This module provides a trait for receiving progress events while a session
//! executes. Events are advisory; they never enter the event log.

use crate::model::{Outcome, RunId};

/// Event emitted during a session for progress tracking.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Run has started.
    RunStarted {
        /// Run identifier.
        run_id: RunId,
        /// Total number of steps.
        total_steps: usize,
    },
    /// A step is about to apply its pre-delay.
    StepStarted {
        /// Current step index (1-based).
        step_index: usize,
        /// Step type (`send`, `resize`, `wait`, `drain`).
        kind: &'static str,
    },
    /// A step's effect has been dispatched.
    StepCompleted {
        /// Step index (1-based).
        step_index: usize,
        /// Step type.
        kind: &'static str,
        /// Duration including the pre-delay, in milliseconds.
        duration_ms: u64,
    },
    /// Run has completed.
    RunCompleted {
        /// Run identifier.
        run_id: RunId,
        /// Final verdict.
        outcome: Outcome,
        /// Frames received.
        frames: u64,
        /// Total duration in milliseconds.
        duration_ms: u64,
    },
}

/// Trait for receiving progress events during execution.
pub trait ProgressCallback: Send + Sync {
    /// Called for each progress event.
    fn on_progress(&self, event: &ProgressEvent);
}

/// A progress callback that collects events, for tests.
#[derive(Default)]
pub struct CollectingProgress {
    events: std::sync::Mutex<Vec<ProgressEvent>>,
}

impl CollectingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collected events so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl ProgressCallback for CollectingProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
