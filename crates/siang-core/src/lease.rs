//! Lifecycle management for the expensive acoustic model.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ScoringConfig;
use crate::error::{Error, Result};
use crate::memory::MemoryProbe;

/// Blocking similarity scorer backed by a loaded model.
///
/// `similarity` may take seconds and cannot be cancelled once started, so
/// callers run it through [`crate::DeadlineRunner`].
pub trait AcousticModel: Send + Sync {
    /// Acoustic similarity between two audio files, as a ratio in [0, 1].
    fn similarity(&self, audio: &Path, reference: &Path) -> Result<f32>;
}

/// Constructs the acoustic model. Blocking and expensive.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Box<dyn AcousticModel>>;
}

/// Eviction thresholds for the cached model. Immutable after construction.
#[derive(Debug, Clone, Copy)]
pub struct EvictionPolicy {
    pub max_usage_count: u32,
    pub max_idle: Duration,
    pub memory_threshold_bytes: u64,
}

impl From<&ScoringConfig> for EvictionPolicy {
    fn from(config: &ScoringConfig) -> Self {
        Self {
            max_usage_count: config.max_usage_count,
            max_idle: config.max_idle(),
            memory_threshold_bytes: config.memory_threshold_bytes(),
        }
    }
}

/// Snapshot of the lease for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct LeaseStatus {
    pub loaded: bool,
    pub usage_count: u32,
    pub max_usage_count: u32,
    pub idle_secs: u64,
    pub resident_mb: Option<u64>,
    pub loads: u64,
}

struct LeaseState {
    model: Option<Arc<dyn AcousticModel>>,
    usage_count: u32,
    last_used: Instant,
}

/// Owns the single expensive model instance.
///
/// At most one model is loaded at any time, and every public method holds
/// the same mutex for its full duration, so all state transitions are
/// totally ordered. The model cannot be used concurrently, so a single
/// coarse lock is the whole policy.
///
/// Handles returned by [`acquire`](Self::acquire) are request-scoped.
/// An abandoned inference worker may keep its clone of the `Arc` alive past
/// eviction; the memory is reclaimed as soon as that last clone drops, and
/// the lease itself never hands the evicted instance out again.
pub struct ModelLease {
    policy: EvictionPolicy,
    loader: Arc<dyn ModelLoader>,
    probe: Arc<dyn MemoryProbe>,
    state: Mutex<LeaseState>,
    loads: AtomicU64,
}

impl ModelLease {
    pub fn new(
        policy: EvictionPolicy,
        loader: Arc<dyn ModelLoader>,
        probe: Arc<dyn MemoryProbe>,
    ) -> Self {
        Self {
            policy,
            loader,
            probe,
            state: Mutex::new(LeaseState {
                model: None,
                usage_count: 0,
                last_used: Instant::now(),
            }),
            loads: AtomicU64::new(0),
        }
    }

    /// Return the cached model, loading it first if necessary.
    ///
    /// The lock is held across the whole path, including the load, so
    /// concurrent cold-start callers serialize on one load and then share
    /// the cached handle. Under memory pressure the load is refused before
    /// the loader is ever invoked.
    pub async fn acquire(&self) -> Result<Arc<dyn AcousticModel>> {
        let mut state = self.state.lock().await;

        if let Some(model) = state.model.as_ref() {
            return Ok(model.clone());
        }

        if let Some(resident) = self.resident_bytes() {
            if resident >= self.policy.memory_threshold_bytes {
                return Err(Error::MemoryPressure(format!(
                    "{} MB resident, threshold {} MB",
                    resident / (1024 * 1024),
                    self.policy.memory_threshold_bytes / (1024 * 1024),
                )));
            }
        }

        info!("Loading acoustic model");
        let loader = self.loader.clone();
        let model = match tokio::task::spawn_blocking(move || loader.load()).await {
            Ok(Ok(model)) => model,
            Ok(Err(err)) => {
                warn!("Acoustic model load failed: {}", err);
                return Err(match err {
                    Error::LoadFailed(_) => err,
                    other => Error::LoadFailed(other.to_string()),
                });
            }
            Err(join_err) => {
                return Err(Error::LoadFailed(format!("Load task failed: {}", join_err)))
            }
        };

        let model: Arc<dyn AcousticModel> = Arc::from(model);
        state.model = Some(model.clone());
        state.usage_count = 0;
        state.last_used = Instant::now();
        let loads = self.loads.fetch_add(1, Ordering::Relaxed) + 1;
        info!("Acoustic model loaded (load #{})", loads);

        Ok(model)
    }

    /// Record one successful inference. Called exactly once per success,
    /// never on failure or timeout.
    pub async fn record_use(&self) {
        let mut state = self.state.lock().await;
        state.usage_count += 1;
        state.last_used = Instant::now();
        debug!(
            "Model use {} of {}",
            state.usage_count, self.policy.max_usage_count
        );
    }

    /// Unload the model if any eviction condition holds. Returns whether
    /// an eviction happened. No-op when nothing is loaded.
    pub async fn maybe_evict(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.model.is_none() {
            return false;
        }

        let reason = if state.usage_count >= self.policy.max_usage_count {
            Some("usage limit reached")
        } else if state.last_used.elapsed() > self.policy.max_idle {
            Some("idle timeout")
        } else if self
            .resident_bytes()
            .is_some_and(|bytes| bytes >= self.policy.memory_threshold_bytes)
        {
            Some("memory pressure")
        } else {
            None
        };

        match reason {
            Some(reason) => {
                info!("Evicting acoustic model: {}", reason);
                Self::unload(&mut state);
                true
            }
            None => false,
        }
    }

    /// Unconditional unload. Used after a timeout or worker crash so a
    /// possibly-corrupted model is never handed out again.
    pub async fn force_evict(&self) {
        let mut state = self.state.lock().await;
        if state.model.is_some() {
            info!("Force-evicting acoustic model");
            Self::unload(&mut state);
        }
    }

    /// Snapshot of the lease for status reporting.
    pub async fn status(&self) -> LeaseStatus {
        let state = self.state.lock().await;
        LeaseStatus {
            loaded: state.model.is_some(),
            usage_count: state.usage_count,
            max_usage_count: self.policy.max_usage_count,
            idle_secs: state.last_used.elapsed().as_secs(),
            resident_mb: self.resident_bytes().map(|b| b / (1024 * 1024)),
            loads: self.loads.load(Ordering::Relaxed),
        }
    }

    /// Number of successful loads since construction.
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    fn unload(state: &mut LeaseState) {
        // Dropping the owning Arc releases the model immediately unless an
        // abandoned worker still holds a clone; then it is freed when that
        // worker finishes.
        state.model = None;
        state.usage_count = 0;
    }

    fn resident_bytes(&self) -> Option<u64> {
        match self.probe.resident_bytes() {
            Ok(bytes) => {
                debug!("Resident memory: {} MB", bytes / (1024 * 1024));
                Some(bytes)
            }
            Err(err) => {
                warn!("Memory probe failed, assuming no pressure: {}", err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct StubModel {
        ratio: f32,
    }

    impl AcousticModel for StubModel {
        fn similarity(&self, _audio: &Path, _reference: &Path) -> Result<f32> {
            Ok(self.ratio)
        }
    }

    struct CountingLoader {
        loads: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingLoader {
        fn new() -> Self {
            Self {
                loads: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail: false,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new()
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }

        fn count(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    impl ModelLoader for CountingLoader {
        fn load(&self) -> Result<Box<dyn AcousticModel>> {
            if self.delay > Duration::ZERO {
                std::thread::sleep(self.delay);
            }
            if self.fail {
                return Err(Error::LoadFailed("stub refuses to load".to_string()));
            }
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StubModel { ratio: 0.8 }))
        }
    }

    struct StubProbe {
        bytes: AtomicU64,
    }

    impl StubProbe {
        fn reporting(bytes: u64) -> Self {
            Self {
                bytes: AtomicU64::new(bytes),
            }
        }
    }

    impl MemoryProbe for StubProbe {
        fn resident_bytes(&self) -> Result<u64> {
            Ok(self.bytes.load(Ordering::SeqCst))
        }
    }

    fn policy() -> EvictionPolicy {
        EvictionPolicy {
            max_usage_count: 3,
            max_idle: Duration::from_secs(300),
            memory_threshold_bytes: 350 * 1024 * 1024,
        }
    }

    fn low_probe() -> Arc<StubProbe> {
        Arc::new(StubProbe::reporting(100 * 1024 * 1024))
    }

    #[tokio::test]
    async fn test_acquire_caches_handle() {
        let loader = Arc::new(CountingLoader::new());
        let lease = ModelLease::new(policy(), loader.clone(), low_probe());

        let first = lease.acquire().await.unwrap();
        let second = lease.acquire().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cold_start_loads_once() {
        let loader = Arc::new(CountingLoader::slow(Duration::from_millis(50)));
        let lease = Arc::new(ModelLease::new(policy(), loader.clone(), low_probe()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let lease = lease.clone();
                tokio::spawn(async move { lease.acquire().await })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        assert_eq!(loader.count(), 1);
    }

    #[tokio::test]
    async fn test_memory_pressure_refuses_load() {
        let loader = Arc::new(CountingLoader::new());
        let probe = Arc::new(StubProbe::reporting(400 * 1024 * 1024));
        let lease = ModelLease::new(policy(), loader.clone(), probe);

        let err = lease.acquire().await.err().unwrap();
        assert!(matches!(err, Error::MemoryPressure(_)));
        // The loader must not even be invoked.
        assert_eq!(loader.count(), 0);
    }

    #[tokio::test]
    async fn test_usage_eviction_and_reload() {
        let loader = Arc::new(CountingLoader::new());
        let lease = ModelLease::new(policy(), loader.clone(), low_probe());

        lease.acquire().await.unwrap();
        for _ in 0..3 {
            lease.record_use().await;
        }

        assert!(lease.maybe_evict().await);
        assert!(!lease.status().await.loaded);

        lease.acquire().await.unwrap();
        assert_eq!(loader.count(), 2);
    }

    #[tokio::test]
    async fn test_idle_eviction_ignores_usage_count() {
        let mut policy = policy();
        policy.max_idle = Duration::from_millis(30);
        let loader = Arc::new(CountingLoader::new());
        let lease = ModelLease::new(policy, loader.clone(), low_probe());

        lease.acquire().await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(lease.maybe_evict().await);
        assert!(!lease.status().await.loaded);
    }

    #[tokio::test]
    async fn test_maybe_evict_keeps_fresh_model() {
        let loader = Arc::new(CountingLoader::new());
        let lease = ModelLease::new(policy(), loader.clone(), low_probe());

        lease.acquire().await.unwrap();
        lease.record_use().await;

        assert!(!lease.maybe_evict().await);
        lease.acquire().await.unwrap();
        assert_eq!(loader.count(), 1);
    }

    #[tokio::test]
    async fn test_maybe_evict_under_memory_pressure() {
        let loader = Arc::new(CountingLoader::new());
        let probe = Arc::new(StubProbe::reporting(100 * 1024 * 1024));
        let lease = ModelLease::new(policy(), loader.clone(), probe.clone());

        lease.acquire().await.unwrap();
        probe.bytes.store(400 * 1024 * 1024, Ordering::SeqCst);

        assert!(lease.maybe_evict().await);
    }

    #[tokio::test]
    async fn test_force_evict_is_idempotent() {
        let loader = Arc::new(CountingLoader::new());
        let lease = ModelLease::new(policy(), loader.clone(), low_probe());

        // Evicting an unloaded lease is a no-op.
        lease.force_evict().await;

        lease.acquire().await.unwrap();
        lease.force_evict().await;
        lease.force_evict().await;
        assert!(!lease.status().await.loaded);

        lease.acquire().await.unwrap();
        assert_eq!(loader.count(), 2);
    }

    #[tokio::test]
    async fn test_load_failure_leaves_state_unloaded() {
        let loader = Arc::new(CountingLoader::failing());
        let lease = ModelLease::new(policy(), loader.clone(), low_probe());

        let err = lease.acquire().await.err().unwrap();
        assert!(matches!(err, Error::LoadFailed(_)));
        assert!(!lease.status().await.loaded);
        assert_eq!(lease.loads(), 0);
    }
}
