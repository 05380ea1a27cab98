//! Store configuration
//!
//! Tunables for the log geometry, the bounded waits on backend
//! completion, and the recovery policies. Serializable with postcard so
//! the firmware can keep an override in flash.

use serde::{Deserialize, Serialize};

use crate::layout::{DEFAULT_PAGES_PER_LOG, MAX_PAGES_PER_LOG};

/// Recovery when the backend reports flash exhaustion during a log flush
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NoSpacePolicy {
    /// Discard the whole log and restart at page 0
    #[default]
    ResetLog,
    /// Delete the page holding the tail and move the tail past it
    DropOldestPage,
}

/// Store configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StoreConfig {
    /// Flash pages reserved for the log (1..=64)
    pub pages_per_log: u8,
    /// How long boot waits for the backend to report ready
    pub init_timeout_ms: u32,
    /// How long page rotation waits for the previous flush
    pub write_timeout_ms: u32,
    /// What to do when a log flush runs out of flash
    pub no_space_policy: NoSpacePolicy,
    /// Persist settings every N clock ticks (0 = never on tick)
    pub tick_persist_interval: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            pages_per_log: DEFAULT_PAGES_PER_LOG,
            init_timeout_ms: 5000,
            write_timeout_ms: 1000,
            no_space_policy: NoSpacePolicy::ResetLog,
            tick_persist_interval: 3600,
        }
    }
}

impl StoreConfig {
    /// Check that the geometry is usable
    pub fn is_valid(&self) -> bool {
        (1..=MAX_PAGES_PER_LOG).contains(&self.pages_per_log)
    }
}
