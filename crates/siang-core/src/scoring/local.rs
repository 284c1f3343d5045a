//! Local acoustic-model strategy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{clamp_score, ScoreRequest, ScoreSource, ScoreStrategy};
use crate::deadline::{DeadlineRunner, InvocationOutcome};
use crate::error::{Error, Result};
use crate::lease::ModelLease;

/// Compares the recording against reference audio with the leased model,
/// deadline-bounded.
pub struct LocalModelStrategy {
    lease: Arc<ModelLease>,
    deadline: Duration,
}

impl LocalModelStrategy {
    pub fn new(lease: Arc<ModelLease>, deadline: Duration) -> Self {
        Self { lease, deadline }
    }
}

#[async_trait]
impl ScoreStrategy for LocalModelStrategy {
    fn source(&self) -> ScoreSource {
        ScoreSource::LocalModel
    }

    async fn score(&self, request: &ScoreRequest) -> Result<f32> {
        let reference = request.reference_audio_path.clone().ok_or_else(|| {
            Error::InvalidInput("No reference audio for local comparison".to_string())
        })?;

        // Apply the eviction policy at use time, so a worn-out model is
        // replaced before this request rather than after.
        self.lease.maybe_evict().await;

        let model = self.lease.acquire().await?;
        let audio = request.audio_path.clone();

        let outcome =
            DeadlineRunner::run(self.deadline, move || model.similarity(&audio, &reference)).await;

        match outcome {
            InvocationOutcome::Completed(ratio) => {
                self.lease.record_use().await;
                let score = clamp_score(ratio.clamp(0.0, 1.0) * 100.0);
                debug!("Local similarity {:.3} -> score {:.1}", ratio, score);
                Ok(score)
            }
            InvocationOutcome::TimedOut => {
                // The abandoned worker may still be holding the model.
                // Never hand that instance out again.
                self.lease.force_evict().await;
                Err(Error::InferenceTimeout(self.deadline))
            }
            InvocationOutcome::Failed(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::lease::{AcousticModel, EvictionPolicy, ModelLoader};
    use crate::memory::MemoryProbe;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedModel {
        ratio: f32,
        delay: Duration,
        fail: bool,
    }

    impl AcousticModel for ScriptedModel {
        fn similarity(&self, _audio: &Path, _reference: &Path) -> Result<f32> {
            if self.delay > Duration::ZERO {
                std::thread::sleep(self.delay);
            }
            if self.fail {
                return Err(Error::InferenceError("corrupt audio".to_string()));
            }
            Ok(self.ratio)
        }
    }

    struct ScriptedLoader {
        loads: AtomicUsize,
        ratio: f32,
        delay: Duration,
        fail_inference: bool,
    }

    impl ScriptedLoader {
        fn returning(ratio: f32) -> Self {
            Self {
                loads: AtomicUsize::new(0),
                ratio,
                delay: Duration::ZERO,
                fail_inference: false,
            }
        }

        fn blocking_for(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::returning(0.5)
            }
        }

        fn failing_inference() -> Self {
            Self {
                fail_inference: true,
                ..Self::returning(0.5)
            }
        }

        fn count(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    impl ModelLoader for ScriptedLoader {
        fn load(&self) -> Result<Box<dyn AcousticModel>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedModel {
                ratio: self.ratio,
                delay: self.delay,
                fail: self.fail_inference,
            }))
        }
    }

    struct QuietProbe;

    impl MemoryProbe for QuietProbe {
        fn resident_bytes(&self) -> Result<u64> {
            Ok(0)
        }
    }

    fn lease_with(loader: Arc<ScriptedLoader>) -> Arc<ModelLease> {
        let policy = EvictionPolicy {
            max_usage_count: 3,
            max_idle: Duration::from_secs(300),
            memory_threshold_bytes: 350 * 1024 * 1024,
        };
        Arc::new(ModelLease::new(policy, loader, Arc::new(QuietProbe)))
    }

    fn request() -> ScoreRequest {
        ScoreRequest::new("/tmp/user.wav", "sawatdee").with_reference_audio("/tmp/ref.wav")
    }

    #[tokio::test]
    async fn test_success_normalizes_and_records_use() {
        let loader = Arc::new(ScriptedLoader::returning(0.73));
        let lease = lease_with(loader.clone());
        let strategy = LocalModelStrategy::new(lease.clone(), Duration::from_secs(1));

        let score = strategy.score(&request()).await.unwrap();

        assert!((score - 73.0).abs() < 0.01);
        assert_eq!(lease.status().await.usage_count, 1);
    }

    #[tokio::test]
    async fn test_ratio_is_clamped_before_scaling() {
        let loader = Arc::new(ScriptedLoader::returning(1.4));
        let lease = lease_with(loader);
        let strategy = LocalModelStrategy::new(lease, Duration::from_secs(1));

        let score = strategy.score(&request()).await.unwrap();
        assert_eq!(score, 100.0);
    }

    #[tokio::test]
    async fn test_timeout_forces_fresh_load() {
        let loader = Arc::new(ScriptedLoader::blocking_for(Duration::from_millis(300)));
        let lease = lease_with(loader.clone());
        let strategy = LocalModelStrategy::new(lease.clone(), Duration::from_millis(50));

        let err = strategy.score(&request()).await.unwrap_err();

        assert!(matches!(err, Error::InferenceTimeout(_)));
        assert!(!lease.status().await.loaded);

        // The next acquisition must load a fresh instance.
        lease.acquire().await.unwrap();
        assert_eq!(loader.count(), 2);
    }

    #[tokio::test]
    async fn test_inference_error_keeps_model_loaded() {
        let loader = Arc::new(ScriptedLoader::failing_inference());
        let lease = lease_with(loader.clone());
        let strategy = LocalModelStrategy::new(lease.clone(), Duration::from_secs(1));

        let err = strategy.score(&request()).await.unwrap_err();

        assert!(matches!(err, Error::InferenceError(_)));
        let status = lease.status().await;
        assert!(status.loaded);
        // Failed inference must not count as a use.
        assert_eq!(status.usage_count, 0);
        assert_eq!(loader.count(), 1);
    }

    #[tokio::test]
    async fn test_missing_reference_fails_without_loading() {
        let loader = Arc::new(ScriptedLoader::returning(0.5));
        let lease = lease_with(loader.clone());
        let strategy = LocalModelStrategy::new(lease, Duration::from_secs(1));

        let bare = ScoreRequest::new("/tmp/user.wav", "sawatdee");
        let err = strategy.score(&bare).await.unwrap_err();

        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(loader.count(), 0);
    }
}
