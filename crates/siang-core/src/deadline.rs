//! Deadline-bounded execution of blocking operations.

use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};

/// Outcome of one deadline-bounded invocation.
#[derive(Debug)]
pub enum InvocationOutcome<T> {
    /// The operation finished within the deadline.
    Completed(T),
    /// The operation finished within the deadline but returned an error.
    Failed(Error),
    /// The deadline elapsed first. The worker keeps running on the
    /// blocking pool; its eventual result is discarded.
    TimedOut,
}

impl<T> InvocationOutcome<T> {
    pub fn timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

/// Runs a blocking operation with a hard wall-clock cutoff for the caller.
///
/// The deadline is authoritative for the caller and advisory for the
/// worker: a blocking native call cannot be preempted, so on timeout the
/// worker thread is abandoned rather than killed. This bounds the caller's
/// wait, not the worker's lifetime (the leaked worker is bounded by process
/// lifetime). After a timeout the resource the worker was using must be
/// treated as suspect; see [`crate::ModelLease::force_evict`].
pub struct DeadlineRunner;

impl DeadlineRunner {
    pub async fn run<T, F>(deadline: Duration, op: F) -> InvocationOutcome<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let handle = tokio::task::spawn_blocking(op);

        match tokio::time::timeout(deadline, handle).await {
            Ok(Ok(Ok(value))) => InvocationOutcome::Completed(value),
            Ok(Ok(Err(err))) => InvocationOutcome::Failed(err),
            Ok(Err(join_err)) => InvocationOutcome::Failed(Error::InferenceError(format!(
                "Worker task failed: {}",
                join_err
            ))),
            Err(_) => {
                warn!("Blocking operation missed {:?} deadline, abandoning worker", deadline);
                InvocationOutcome::TimedOut
            }
        }
    }
}
