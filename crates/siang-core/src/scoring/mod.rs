//! Tiered pronunciation scoring.
//!
//! A score request runs through an ordered chain of strategies — remote
//! assessment, local acoustic model, synthetic estimate — and the first
//! success wins. The terminal synthetic strategy cannot fail, so the chain
//! always produces a [`ScoreResult`].

mod local;
mod pipeline;
mod remote;
mod synthetic;

pub use local::LocalModelStrategy;
pub use pipeline::ScoringPipeline;
pub use remote::{AzureSpeechScorer, RemoteScorer, RemoteStrategy};
pub use synthetic::SyntheticStrategy;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Which strategy produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Remote,
    LocalModel,
    Synthetic,
}

impl fmt::Display for ScoreSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScoreSource::Remote => "remote",
            ScoreSource::LocalModel => "local_model",
            ScoreSource::Synthetic => "synthetic",
        };
        f.write_str(name)
    }
}

/// One pronunciation-scoring request.
#[derive(Debug, Clone)]
pub struct ScoreRequest {
    /// Unique request ID
    pub id: String,

    /// The user's recording
    pub audio_path: PathBuf,

    /// Reference recording for local acoustic comparison
    pub reference_audio_path: Option<PathBuf>,

    /// Reference text for remote assessment
    pub reference_text: String,

    /// BCP-47 language tag; empty means "use the backend default"
    pub language: String,

    /// Per-request override of the remote deadline
    pub remote_deadline_override: Option<Duration>,
}

impl ScoreRequest {
    pub fn new(audio_path: impl Into<PathBuf>, reference_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            audio_path: audio_path.into(),
            reference_audio_path: None,
            reference_text: reference_text.into(),
            language: String::new(),
            remote_deadline_override: None,
        }
    }

    pub fn with_reference_audio(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference_audio_path = Some(path.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_remote_deadline(mut self, deadline: Duration) -> Self {
        self.remote_deadline_override = Some(deadline);
        self
    }
}

/// The score surfaced to the caller. Always present: when every real
/// strategy fails the value is a synthetic estimate, flagged by `source`.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreResult {
    pub request_id: String,

    /// Canonical 0-100 scale
    pub value: f32,

    pub source: ScoreSource,

    pub elapsed_ms: f64,
}

impl ScoreResult {
    /// Whether the value is a fallback estimate rather than a measurement.
    pub fn is_synthetic(&self) -> bool {
        self.source == ScoreSource::Synthetic
    }
}

/// A single scoring strategy in the fallback chain.
///
/// Implementations map their native range onto the canonical 0-100 scale
/// before returning. An error means "try the next strategy"; it never
/// reaches the external caller.
#[async_trait]
pub trait ScoreStrategy: Send + Sync {
    fn source(&self) -> ScoreSource;

    async fn score(&self, request: &ScoreRequest) -> Result<f32>;
}

pub(crate) fn clamp_score(value: f32) -> f32 {
    value.clamp(0.0, 100.0)
}
