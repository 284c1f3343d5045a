//! Scoring service facade.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use tracing::info;

use crate::config::ScoringConfig;
use crate::lease::{EvictionPolicy, LeaseStatus, ModelLease, ModelLoader};
use crate::memory::MemoryProbe;
use crate::reaper::Reaper;
use crate::scoring::{
    LocalModelStrategy, RemoteScorer, RemoteStrategy, ScoreRequest, ScoreResult, ScoreStrategy,
    ScoringPipeline, SyntheticStrategy,
};

/// Owns the scoring pipeline, the model lease, and the background reaper.
///
/// Explicit lifecycle: construct with injected collaborators, [`start`]
/// once, [`score`] from any number of tasks, [`shutdown`] at process exit.
/// No global state.
///
/// [`start`]: Self::start
/// [`score`]: Self::score
/// [`shutdown`]: Self::shutdown
pub struct ScoringService {
    config: ScoringConfig,
    lease: Arc<ModelLease>,
    pipeline: ScoringPipeline,
    reaper: StdMutex<Option<Reaper>>,
}

impl ScoringService {
    /// Create the service. Passing `None` for `remote` disables the remote
    /// strategy; the chain is then local -> synthetic.
    pub fn new(
        config: ScoringConfig,
        loader: Arc<dyn ModelLoader>,
        probe: Arc<dyn MemoryProbe>,
        remote: Option<Arc<dyn RemoteScorer>>,
    ) -> Self {
        let lease = Arc::new(ModelLease::new(
            EvictionPolicy::from(&config),
            loader,
            probe,
        ));

        let mut strategies: Vec<Arc<dyn ScoreStrategy>> = Vec::new();
        if let Some(remote) = remote {
            strategies.push(Arc::new(RemoteStrategy::new(
                remote,
                config.remote_deadline(),
            )));
        }
        strategies.push(Arc::new(LocalModelStrategy::new(
            lease.clone(),
            config.local_deadline(),
        )));

        let synthetic = SyntheticStrategy::new(config.synthetic_min, config.synthetic_max);
        let pipeline = ScoringPipeline::new(strategies, synthetic);

        Self {
            config,
            lease,
            pipeline,
            reaper: StdMutex::new(None),
        }
    }

    /// Start the background reaper. Idempotent.
    pub fn start(&self) {
        let mut guard = self.reaper.lock().expect("reaper slot poisoned");
        if guard.is_none() {
            info!(
                "Starting eviction reaper (period {:?})",
                self.config.reaper_interval()
            );
            *guard = Some(Reaper::spawn(
                self.lease.clone(),
                self.config.reaper_interval(),
            ));
        }
    }

    /// Score a recording. Never fails: the worst case is a synthetic
    /// estimate, flagged by [`ScoreResult::source`]. Total latency is
    /// bounded by the per-strategy deadlines.
    pub async fn score(&self, request: &ScoreRequest) -> ScoreResult {
        self.pipeline.score(request).await
    }

    /// Snapshot of the lease for status reporting.
    pub async fn status(&self) -> LeaseStatus {
        self.lease.status().await
    }

    /// Stop the reaper and unload the model. Idempotent.
    pub async fn shutdown(&self) {
        let reaper = self.reaper.lock().expect("reaper slot poisoned").take();
        if let Some(reaper) = reaper {
            reaper.shutdown().await;
        }
        self.lease.force_evict().await;
        info!("Scoring service shut down");
    }

    /// The lease, for callers that drive eviction explicitly.
    pub fn lease(&self) -> &Arc<ModelLease> {
        &self.lease
    }
}
