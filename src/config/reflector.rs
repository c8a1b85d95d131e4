use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::BackoffPolicy;
use crate::Result;

/// List-and-watch parameters applied to every reflector
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReflectorConfig {
    /// Period at which every mirrored object is re-delivered to event
    /// handlers. 0 disables resync.
    #[serde(default = "default_resync_period_secs")]
    pub resync_period_secs: u64,

    /// Retry policy for list/watch failures the source marks as retryable
    #[serde(default)]
    pub backoff: BackoffPolicy,
}

impl Default for ReflectorConfig {
    fn default() -> Self {
        Self {
            resync_period_secs: default_resync_period_secs(),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl ReflectorConfig {
    pub fn validate(&self) -> Result<()> {
        self.backoff.validate()
    }

    pub fn resync_period(&self) -> Option<Duration> {
        match self.resync_period_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn default_resync_period_secs() -> u64 {
    180
}
