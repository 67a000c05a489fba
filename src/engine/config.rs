//! Engine configuration options.

use crate::types::AccountId;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of events to retain in memory.
    pub max_events: usize,
    /// Account allowed to list markets and change parameters.
    pub admin: AccountId,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            admin: AccountId(0),
        }
    }
}
