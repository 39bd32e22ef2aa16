//! Coordinator tuning knobs, loaded the same way every component in this core loads its
//! configuration: see `meridian_core::config::load_or_default`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoordinatorConfig {
    /// Outer deadline for the prepare phase, past which outstanding prepares are cancelled
    /// and treated as abort votes.
    pub prepare_deadline_ms: u64,
    /// Base delay for the per-participant retry back-off during fan-out.
    pub retry_base_delay_ms: u64,
    pub max_retry_attempts: u32,
    /// Delay after decision propagation completes before a document becomes eligible for
    /// garbage collection.
    pub gc_delay_secs: i64,
}

impl CoordinatorConfig {
    pub fn prepare_deadline(&self) -> Duration {
        Duration::from_millis(self.prepare_deadline_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            prepare_deadline_ms: 10_000,
            retry_base_delay_ms: 50,
            max_retry_attempts: 5,
            gc_delay_secs: 15 * 60,
        }
    }
}
