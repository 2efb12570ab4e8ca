//! Callback support for training runs.
//!
//! Callbacks are the observability sink of the training loop. They are
//! invoked only at error checks, never per SGD step, so the core loop has
//! no dependency on any output stream.

use crate::{error::Result, model::TrainingResult, types::Scalar};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

/// Information passed to callbacks at every error check.
#[derive(Clone, Debug)]
pub struct CheckpointInfo<T: Scalar> {
    /// Zero-based index of the SGD step that triggered the check
    pub iteration: usize,

    /// Error after the step
    pub error: T,

    /// Error at the previous check (or the initial error)
    pub previous_error: T,

    /// Absolute change between the two
    pub change: T,

    /// Elapsed time since training started
    pub elapsed: Duration,

    /// Whether the change is below the tolerance
    pub converged: bool,
}

/// Trait for training callbacks.
///
/// Callbacks can be used for logging, recording the error curve or
/// early stopping.
pub trait TrainingCallback<T: Scalar>: Send {
    /// Called once the parameters are initialized, with the initial error.
    fn on_training_start(&mut self, initial_error: T) -> Result<()> {
        let _ = initial_error;
        Ok(())
    }

    /// Called at every error check.
    ///
    /// Returns `true` to continue training, `false` to stop early.
    fn on_check(&mut self, info: &CheckpointInfo<T>) -> Result<bool> {
        let _ = info;
        Ok(true)
    }

    /// Called when training stops, whatever the reason.
    fn on_training_end(&mut self, result: &TrainingResult<T>) -> Result<()> {
        let _ = result;
        Ok(())
    }
}

/// A no-op callback that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpCallback;

impl<T: Scalar> TrainingCallback<T> for NoOpCallback {}

/// A callback that reports progress through the `log` facade.
#[derive(Debug, Clone)]
pub struct LoggingCallback {
    log_every: usize,
    checks: usize,
}

impl LoggingCallback {
    /// Create a callback logging one check out of `log_every`.
    pub fn new(log_every: usize) -> Self {
        Self {
            log_every: log_every.max(1),
            checks: 0,
        }
    }
}

impl<T: Scalar> TrainingCallback<T> for LoggingCallback {
    fn on_training_start(&mut self, initial_error: T) -> Result<()> {
        self.checks = 0;
        log::info!("training started, initial error {initial_error}");
        Ok(())
    }

    fn on_check(&mut self, info: &CheckpointInfo<T>) -> Result<bool> {
        if self.checks % self.log_every == 0 {
            log::info!(
                "iteration {}: error = {}, change = {}",
                info.iteration,
                info.error,
                info.change
            );
        }
        self.checks += 1;
        Ok(true)
    }

    fn on_training_end(&mut self, result: &TrainingResult<T>) -> Result<()> {
        log::info!(
            "training finished after {} iterations ({:?}), error {}",
            result.iterations,
            result.termination_reason,
            result.final_error
        );
        Ok(())
    }
}

/// A callback recording `(iteration, error)` at every check.
///
/// The initial error is recorded at iteration 0.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback<T: Scalar> {
    history: Vec<(usize, T)>,
}

impl<T: Scalar> HistoryCallback<T> {
    /// Create an empty history.
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
        }
    }

    /// Recorded `(iteration, error)` pairs in check order.
    pub fn history(&self) -> &[(usize, T)] {
        &self.history
    }

    /// Recorded errors in check order.
    pub fn errors(&self) -> Vec<T> {
        self.history.iter().map(|&(_, error)| error).collect()
    }
}

impl<T: Scalar> TrainingCallback<T> for HistoryCallback<T> {
    fn on_training_start(&mut self, initial_error: T) -> Result<()> {
        self.history.clear();
        self.history.push((0, initial_error));
        Ok(())
    }

    fn on_check(&mut self, info: &CheckpointInfo<T>) -> Result<bool> {
        self.history.push((info.iteration, info.error));
        Ok(true)
    }
}

/// Shared flag used to cancel a training run from another thread.
///
/// Training polls the token between SGD steps and stops with
/// [`TerminationReason::UserTerminated`](crate::model::TerminationReason)
/// once it is set. The model stays queryable.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Clear a previous cancellation request.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Relaxed);
    }
}
