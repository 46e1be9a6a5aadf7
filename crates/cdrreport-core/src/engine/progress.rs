//! Progress and ETA reporting while the engine iterates over groups

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fraction complete and projected time remaining
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEstimate {
    /// `completed / total`, in `[0, 1]`
    pub fraction: f64,
    /// Projected remaining time, `None` before the first group completes
    pub eta: Option<Duration>,
}

impl ProgressEstimate {
    /// Linear extrapolation from the running average time per group.
    pub fn report(completed: usize, total: usize, elapsed: Duration) -> Self {
        if total == 0 {
            return Self {
                fraction: 1.0,
                eta: Some(Duration::ZERO),
            };
        }

        let completed = completed.min(total);
        let fraction = completed as f64 / total as f64;

        if completed == 0 {
            return Self {
                fraction,
                eta: None,
            };
        }

        let per_group = elapsed.as_secs_f64() / completed as f64;
        let remaining = (total - completed) as f64;

        Self {
            fraction,
            eta: Some(Duration::from_secs_f64(per_group * remaining)),
        }
    }
}

/// Render an ETA in whole seconds, e.g. `1m 5s` or `42s`
pub fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(eta) => humantime::format_duration(Duration::from_secs(eta.as_secs())).to_string(),
        None => "unknown".to_string(),
    }
}

/// Emitted after each group is evaluated
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Groups completed so far
    pub completed: usize,
    /// Total groups in this run
    pub total: usize,
    /// Fraction and ETA
    pub estimate: ProgressEstimate,
    /// Label of the group just completed
    pub group: String,
}

impl ProgressEvent {
    /// Status line for display
    pub fn message(&self) -> String {
        format!(
            "Processing group {} of {}... (ETA: {})",
            self.completed,
            self.total,
            format_eta(self.estimate.eta)
        )
    }
}

/// Receives progress events. Returning `ControlFlow::Break` cancels the run.
pub trait ProgressSink: Send {
    /// Handle one event
    fn on_progress(&mut self, event: &ProgressEvent) -> ControlFlow<()>;
}

impl<F> ProgressSink for F
where
    F: FnMut(&ProgressEvent) -> ControlFlow<()> + Send,
{
    fn on_progress(&mut self, event: &ProgressEvent) -> ControlFlow<()> {
        self(event)
    }
}

/// Sink that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&mut self, _event: &ProgressEvent) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// Per-invocation progress state
#[derive(Debug)]
pub struct ProgressTracker {
    total: usize,
    completed: usize,
    started: Instant,
}

impl ProgressTracker {
    /// Start tracking `total` groups now
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            started: Instant::now(),
        }
    }

    /// Mark one group complete, measuring elapsed time from the start
    pub fn advance(&mut self, group: impl Into<String>) -> ProgressEvent {
        let elapsed = self.started.elapsed();
        self.record(group, elapsed)
    }

    /// Mark one group complete with an explicit elapsed time
    pub fn record(&mut self, group: impl Into<String>, elapsed: Duration) -> ProgressEvent {
        self.completed = (self.completed + 1).min(self.total);
        ProgressEvent {
            completed: self.completed,
            total: self.total,
            estimate: ProgressEstimate::report(self.completed, self.total, elapsed),
            group: group.into(),
        }
    }

    /// Groups completed so far
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Total groups
    pub fn total(&self) -> usize {
        self.total
    }
}

/// Cancellation flag shared between a running report and its caller
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unraised flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
