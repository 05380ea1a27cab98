//! Service configuration

use serde::{Deserialize, Serialize};

/// Storage task tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceConfig {
    /// Clock ticks between automatic GC checks (0 = only on request)
    pub gc_interval_ticks: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            gc_interval_ticks: 60,
        }
    }
}
