//! Process-wide configuration, loaded the same way every other component in this workspace
//! loads its config: [`meridian_core::config::load_or_default`] against a JSON file, falling
//! back to (and persisting) [`Default::default`] only when the file is genuinely absent.

use meridian_txn::CoordinatorConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeridianServerConfig {
    pub coordinator: CoordinatorConfig,
    /// How often the garbage-collection sweeper scans for expired, decided transactions.
    pub gc_sweep_interval_secs: u64,
}

impl Default for MeridianServerConfig {
    fn default() -> Self {
        Self { coordinator: CoordinatorConfig::default(), gc_sweep_interval_secs: 60 }
    }
}
