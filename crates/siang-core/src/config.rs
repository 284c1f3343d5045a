//! Configuration types for the scoring service.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main scoring configuration.
///
/// All durations are whole seconds on the wire; accessor methods convert to
/// [`Duration`] for internal use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Uses of the local model before it is recycled
    #[serde(default = "default_max_usage_count")]
    pub max_usage_count: u32,

    /// Idle seconds before the local model is unloaded
    #[serde(default = "default_max_idle_secs")]
    pub max_idle_secs: u64,

    /// Resident-memory ceiling (MB) above which loads are refused
    #[serde(default = "default_memory_threshold_mb")]
    pub memory_threshold_mb: u64,

    /// Deadline for one local inference call (seconds)
    #[serde(default = "default_local_deadline_secs")]
    pub local_deadline_secs: u64,

    /// Deadline for the remote scoring call (seconds); callers may override
    /// per request
    #[serde(default = "default_remote_deadline_secs")]
    pub remote_deadline_secs: u64,

    /// Lower bound of the synthetic fallback band (canonical 0-100 scale)
    #[serde(default = "default_synthetic_min")]
    pub synthetic_min: f32,

    /// Upper bound of the synthetic fallback band
    #[serde(default = "default_synthetic_max")]
    pub synthetic_max: f32,

    /// Period of the background eviction sweep (seconds)
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_usage_count: default_max_usage_count(),
            max_idle_secs: default_max_idle_secs(),
            memory_threshold_mb: default_memory_threshold_mb(),
            local_deadline_secs: default_local_deadline_secs(),
            remote_deadline_secs: default_remote_deadline_secs(),
            synthetic_min: default_synthetic_min(),
            synthetic_max: default_synthetic_max(),
            reaper_interval_secs: default_reaper_interval_secs(),
        }
    }
}

impl ScoringConfig {
    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }

    pub fn memory_threshold_bytes(&self) -> u64 {
        self.memory_threshold_mb * 1024 * 1024
    }

    pub fn local_deadline(&self) -> Duration {
        Duration::from_secs(self.local_deadline_secs)
    }

    pub fn remote_deadline(&self) -> Duration {
        Duration::from_secs(self.remote_deadline_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }
}

fn default_max_usage_count() -> u32 {
    3
}

fn default_max_idle_secs() -> u64 {
    300
}

fn default_memory_threshold_mb() -> u64 {
    350
}

fn default_local_deadline_secs() -> u64 {
    8
}

fn default_remote_deadline_secs() -> u64 {
    5
}

fn default_synthetic_min() -> f32 {
    55.0
}

fn default_synthetic_max() -> f32 {
    80.0
}

fn default_reaper_interval_secs() -> u64 {
    300
}

/// Remote pronunciation-assessment backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Azure Speech service region
    #[serde(default = "default_region")]
    pub region: String,

    /// Subscription key; empty disables the remote strategy
    #[serde(default)]
    pub subscription_key: String,

    /// BCP-47 language tag used when the request does not carry one
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            subscription_key: String::new(),
            language: default_language(),
        }
    }
}

impl RemoteConfig {
    /// Build from `AZURE_SPEECH_KEY` / `AZURE_SPEECH_REGION`, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Self {
        let region = std::env::var("AZURE_SPEECH_REGION")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(default_region);
        let subscription_key = std::env::var("AZURE_SPEECH_KEY").unwrap_or_default();

        Self {
            region,
            subscription_key,
            language: default_language(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

fn default_region() -> String {
    "eastasia".to_string()
}

fn default_language() -> String {
    "th-TH".to_string()
}
