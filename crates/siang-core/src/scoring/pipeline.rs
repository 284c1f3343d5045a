//! Ordered fallback over scoring strategies.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::{ScoreRequest, ScoreResult, ScoreSource, ScoreStrategy, SyntheticStrategy};

/// Tries each strategy in order and returns the first success.
///
/// The synthetic terminal strategy is held separately from the ordered
/// list, so the chain is total by construction: `score` cannot fail, and
/// callers that care whether the value is real inspect
/// [`ScoreResult::source`].
pub struct ScoringPipeline {
    strategies: Vec<Arc<dyn ScoreStrategy>>,
    synthetic: SyntheticStrategy,
}

impl ScoringPipeline {
    pub fn new(strategies: Vec<Arc<dyn ScoreStrategy>>, synthetic: SyntheticStrategy) -> Self {
        Self {
            strategies,
            synthetic,
        }
    }

    pub async fn score(&self, request: &ScoreRequest) -> ScoreResult {
        let started = Instant::now();

        for strategy in &self.strategies {
            let source = strategy.source();
            match strategy.score(request).await {
                Ok(value) => {
                    debug!("Request {} scored {:.1} via {}", request.id, value, source);
                    return Self::result(request, value, source, started);
                }
                Err(err) => {
                    warn!(
                        "Strategy {} failed for request {}: {}",
                        source, request.id, err
                    );
                }
            }
        }

        let value = self.synthetic.draw();
        debug!(
            "Request {} fell through to synthetic score {:.1}",
            request.id, value
        );
        Self::result(request, value, ScoreSource::Synthetic, started)
    }

    fn result(
        request: &ScoreRequest,
        value: f32,
        source: ScoreSource,
        started: Instant,
    ) -> ScoreResult {
        ScoreResult {
            request_id: request.id.clone(),
            value,
            source,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        }
    }
}
