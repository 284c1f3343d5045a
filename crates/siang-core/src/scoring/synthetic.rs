//! Synthetic fallback scores.

use async_trait::async_trait;
use rand::Rng;

use super::{ScoreRequest, ScoreSource, ScoreStrategy};
use crate::error::Result;

/// Terminal strategy: a plausible mid-band estimate that never fails.
///
/// The band stays clear of 0 and 100; a fallback value must not signal
/// certainty.
pub struct SyntheticStrategy {
    min: f32,
    max: f32,
}

impl SyntheticStrategy {
    pub fn new(min: f32, max: f32) -> Self {
        // A reversed band is treated as its ordered form rather than
        // panicking inside the sampler.
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self { min, max }
    }

    pub(crate) fn draw(&self) -> f32 {
        if (self.max - self.min) < f32::EPSILON {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }
}

#[async_trait]
impl ScoreStrategy for SyntheticStrategy {
    fn source(&self) -> ScoreSource {
        ScoreSource::Synthetic
    }

    async fn score(&self, _request: &ScoreRequest) -> Result<f32> {
        Ok(self.draw())
    }
}
