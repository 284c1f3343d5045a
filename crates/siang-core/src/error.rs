//! Error types for the scoring core.

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by scoring strategies and the model lease.
///
/// None of these reach the external caller of [`crate::ScoringService::score`]:
/// every variant is recovered by the pipeline, which falls through to the
/// next strategy instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Resident memory is at or above the configured threshold. The load
    /// was refused without being attempted.
    #[error("Memory pressure: {0}")]
    MemoryPressure(String),

    /// Constructing the acoustic model failed; the lease stays unloaded.
    #[error("Model load failed: {0}")]
    LoadFailed(String),

    /// The local inference worker missed its deadline and was abandoned.
    /// The model is force-evicted before this is returned.
    #[error("Inference timed out after {0:?}")]
    InferenceTimeout(Duration),

    /// Transient inference failure. The model stays loaded.
    #[error("Inference error: {0}")]
    InferenceError(String),

    /// The remote scoring backend failed, answered malformed data, or did
    /// not answer within its deadline.
    #[error("Remote scoring unavailable: {0}")]
    RemoteUnavailable(String),

    /// Reading process memory failed. Treated as "no pressure" by callers.
    #[error("Memory probe failed: {0}")]
    ProbeFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
