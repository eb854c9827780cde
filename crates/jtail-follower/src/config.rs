use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FollowerError, FollowerResult};
use crate::retry::RetryPolicy;

/// What the chain walker does when a block on the path to genesis is not
/// in the cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingBlockPolicy {
    /// Stop walking and replay the blocks found so far. History is
    /// silently truncated; the live tail still follows.
    #[default]
    Truncate,
    /// Report `FollowerError::MissingBlock` to the consumer and end.
    Fail,
}

/// How the chain walker reads a block whose parent link is present but
/// unreadable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParentLinkPolicy {
    /// Same as an absent link: the block is treated as genesis.
    #[default]
    Genesis,
    /// Report `FollowerError::MalformedParent` to the consumer and end.
    Fail,
}

/// Follower settings.
///
/// Every field has a default, so a TOML file only needs the keys it
/// changes:
///
/// ```toml
/// max_retry = 5
/// missing_block = "fail"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowerConfig {
    /// Reconstruct history before following the live tail.
    pub catchup: bool,
    /// Subscription attempts before the live receiver gives up.
    pub max_retry: u32,
    /// Delay before the first resubscription; doubles per attempt.
    pub retry_base_delay_ms: u64,
    /// Upper bound on the resubscription delay.
    pub retry_max_delay_ms: u64,
    /// Wait window for one read of the live queue.
    pub poll_interval_ms: u64,
    pub missing_block: MissingBlockPolicy,
    pub malformed_parent: ParentLinkPolicy,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            catchup: true,
            max_retry: 20,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 5_000,
            poll_interval_ms: 200,
            missing_block: MissingBlockPolicy::Truncate,
            malformed_parent: ParentLinkPolicy::Genesis,
        }
    }
}

impl FollowerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retry,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn from_toml_str(s: &str) -> FollowerResult<Self> {
        toml::from_str(s).map_err(|e| FollowerError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> FollowerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| FollowerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}
