//! Engine tunables. Every field has a default, so an empty `[engine]` table
//! (or none at all) is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// How long an idempotency token keeps deduplicating retried appends.
  pub idempotency_retention_secs: u64,
  /// Applied events between two score checkpoints.
  pub checkpoint_interval:        u32,
  /// Notifications buffered per group before slow subscribers start lagging.
  pub notification_buffer:        usize,
  pub retry:                      RetryPolicy,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      idempotency_retention_secs: 86_400,
      checkpoint_interval:        16,
      notification_buffer:        256,
      retry:                      RetryPolicy::default(),
    }
  }
}

impl EngineConfig {
  pub fn idempotency_retention(&self) -> Duration {
    Duration::from_secs(self.idempotency_retention_secs)
  }
}

/// Bounded exponential backoff for transient storage failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Total tries, including the first. `1` disables retrying.
  pub max_attempts:  u32,
  pub base_delay_ms: u64,
  pub max_delay_ms:  u64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts:  4,
      base_delay_ms: 25,
      max_delay_ms:  1_000,
    }
  }
}

impl RetryPolicy {
  pub fn base_delay(&self) -> Duration { Duration::from_millis(self.base_delay_ms) }

  pub fn max_delay(&self) -> Duration { Duration::from_millis(self.max_delay_ms) }
}
