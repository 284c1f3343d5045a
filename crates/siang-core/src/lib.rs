//! Siang Core - bounded-resource pronunciation scoring
//!
//! This crate scores a user's recording against a reference through an
//! ordered chain of backends while keeping the expensive local model on a
//! short leash:
//!
//! - [`ModelLease`] owns the single model instance and evicts it by usage
//!   count, idle time, or process memory pressure.
//! - [`DeadlineRunner`] bounds every blocking inference call with a hard
//!   wall-clock deadline; a late worker is abandoned, never trusted again.
//! - [`ScoringPipeline`] degrades remote -> local -> synthetic, so a caller
//!   always receives a well-formed score in bounded time.
//! - A background reaper sweeps the lease on a fixed period, independent
//!   of request traffic.
//!
//! # Example
//!
//! ```ignore
//! use siang_core::{ProcessMemoryProbe, ScoreRequest, ScoringConfig, ScoringService};
//!
//! let service = ScoringService::new(
//!     ScoringConfig::default(),
//!     my_model_loader,
//!     std::sync::Arc::new(ProcessMemoryProbe::new()),
//!     Some(my_remote_scorer),
//! );
//! service.start();
//!
//! let request = ScoreRequest::new("user.wav", "sawatdee")
//!     .with_reference_audio("reference.wav");
//! let result = service.score(&request).await;
//! println!("{:.1}/100 via {}", result.value, result.source);
//!
//! service.shutdown().await;
//! ```

pub mod config;
pub mod deadline;
pub mod error;
pub mod lease;
pub mod memory;
pub mod scoring;
pub mod service;

mod reaper;

pub use config::{RemoteConfig, ScoringConfig};
pub use deadline::{DeadlineRunner, InvocationOutcome};
pub use error::{Error, Result};
pub use lease::{AcousticModel, EvictionPolicy, LeaseStatus, ModelLease, ModelLoader};
pub use memory::{MemoryProbe, ProcessMemoryProbe};
pub use scoring::{
    AzureSpeechScorer, LocalModelStrategy, RemoteScorer, RemoteStrategy, ScoreRequest,
    ScoreResult, ScoreSource, ScoreStrategy, ScoringPipeline, SyntheticStrategy,
};
pub use service::ScoringService;
