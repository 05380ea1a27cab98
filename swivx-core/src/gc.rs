//! Garbage collection scheduling
//!
//! Record updates and deletes leave dead records behind in flash. The
//! scheduler only tracks that a compaction is owed and whether one is
//! running; the main loop decides when to call
//! [`Store::run_garbage_collection`](crate::Store::run_garbage_collection).

use swivx_hal::{BackendError, RecordBackend};

/// GC bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GcScheduler {
    pending: bool,
    in_progress: bool,
}

impl GcScheduler {
    /// Create an idle scheduler
    pub const fn new() -> Self {
        Self {
            pending: false,
            in_progress: false,
        }
    }

    /// A record was replaced by a newer copy
    pub fn note_update(&mut self) {
        self.pending = true;
    }

    /// A record was deleted
    pub fn note_delete(&mut self) {
        self.pending = true;
    }

    /// Check if dead records are waiting for compaction
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Check if a compaction is running
    pub fn is_in_progress(&self) -> bool {
        self.in_progress
    }

    /// Start a compaction pass
    ///
    /// Clears the pending flag and marks a pass in progress. If the backend
    /// refuses the request both flags are restored.
    pub fn start<B: RecordBackend>(&mut self, backend: &mut B) -> Result<(), BackendError> {
        let was_pending = self.pending;
        self.pending = false;
        self.in_progress = true;

        if let Err(e) = backend.compact() {
            self.pending = was_pending;
            self.in_progress = false;
            return Err(e);
        }
        Ok(())
    }

    /// Handle the backend's compaction outcome
    pub fn on_complete(&mut self, result: Result<(), BackendError>) {
        self.in_progress = false;
        if result.is_err() {
            // Nothing was reclaimed; leave the work queued
            self.pending = true;
        }
    }
}
