//! Periodic eviction sweeps.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::lease::ModelLease;

/// Background task that applies the eviction policy on a fixed period,
/// independent of request traffic. Holds no lock between ticks; a tick
/// can log but never ends the loop.
pub(crate) struct Reaper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Reaper {
    pub(crate) fn spawn(lease: Arc<ModelLease>, period: Duration) -> Self {
        let (shutdown, mut rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of an interval fires immediately; swallow it
            // so a fresh service does not sweep before any traffic.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if lease.maybe_evict().await {
                            debug!("Reaper evicted the model");
                        }
                    }
                    _ = rx.changed() => {
                        info!("Reaper stopping");
                        break;
                    }
                }
            }
        });

        Self { shutdown, handle }
    }

    pub(crate) async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::lease::{AcousticModel, EvictionPolicy, ModelLoader};
    use crate::memory::MemoryProbe;
    use std::path::Path;

    struct StubModel;

    impl AcousticModel for StubModel {
        fn similarity(&self, _audio: &Path, _reference: &Path) -> Result<f32> {
            Ok(0.5)
        }
    }

    struct StubLoader;

    impl ModelLoader for StubLoader {
        fn load(&self) -> Result<Box<dyn AcousticModel>> {
            Ok(Box::new(StubModel))
        }
    }

    struct QuietProbe;

    impl MemoryProbe for QuietProbe {
        fn resident_bytes(&self) -> Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_reaper_evicts_idle_model_without_traffic() {
        let policy = EvictionPolicy {
            max_usage_count: 100,
            max_idle: Duration::from_millis(20),
            memory_threshold_bytes: u64::MAX,
        };
        let lease = Arc::new(ModelLease::new(
            policy,
            Arc::new(StubLoader),
            Arc::new(QuietProbe),
        ));

        lease.acquire().await.unwrap();
        assert!(lease.status().await.loaded);

        let reaper = Reaper::spawn(lease.clone(), Duration::from_millis(25));
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(!lease.status().await.loaded);
        reaper.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_loop() {
        let policy = EvictionPolicy {
            max_usage_count: 100,
            max_idle: Duration::from_secs(300),
            memory_threshold_bytes: u64::MAX,
        };
        let lease = Arc::new(ModelLease::new(
            policy,
            Arc::new(StubLoader),
            Arc::new(QuietProbe),
        ));

        let reaper = Reaper::spawn(lease, Duration::from_millis(10));
        // Must return instead of hanging on the loop.
        reaper.shutdown().await;
    }
}
