//! Settings register ownership
//!
//! Holds the in-memory register and moves it to and from its flash
//! record. Mutations stay in RAM until [`SettingsStore::persist`] is
//! called.

use swivx_hal::{BackendError, RecordBackend};

use super::persist::{self, MAX_PERSISTED_LEN};
use super::record::{SettingsRecord, WIRE_LEN};
use crate::error::StoreError;
use crate::gc::GcScheduler;
use crate::layout::settings_key;
use crate::store::replace_record;

/// The settings register and its persistence
#[derive(Debug, Clone)]
pub struct SettingsStore {
    record: SettingsRecord,
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore {
    /// Create a register holding the defaults
    pub const fn new() -> Self {
        Self {
            record: SettingsRecord::DEFAULT,
        }
    }

    /// Current register contents
    pub fn record(&self) -> &SettingsRecord {
        &self.record
    }

    /// Mutable access for the log and configuration paths
    pub fn record_mut(&mut self) -> &mut SettingsRecord {
        &mut self.record
    }

    /// Restore the defaults in RAM
    pub fn reset_to_defaults(&mut self) {
        self.record = SettingsRecord::DEFAULT;
    }

    /// Load the register from flash
    ///
    /// Returns true if a valid record was found; the in-memory register is
    /// only overwritten in that case. Records whose log pointers do not fit
    /// a log of `capacity` bytes are rejected.
    pub fn recall<B: RecordBackend>(&mut self, backend: &mut B, capacity: u32) -> bool {
        match Self::load(backend) {
            Ok(record) if record.log_pointers_valid(capacity) => {
                self.record = record;
                true
            }
            Ok(record) => {
                warn!(
                    "Stored log pointers out of range: head={}, tail={}",
                    record.log_head,
                    record.log_tail
                );
                false
            }
            Err(StoreError::Backend(BackendError::NotFound)) => {
                debug!("No settings record in flash");
                false
            }
            Err(e) => {
                warn!("Failed to load settings: {:?}", e);
                false
            }
        }
    }

    fn load<B: RecordBackend>(backend: &mut B) -> Result<SettingsRecord, StoreError> {
        let desc = backend.find(settings_key())?;
        let mut buffer = [0u8; MAX_PERSISTED_LEN];
        let len = backend.read(&desc, &mut buffer)?;

        debug!("Read {} bytes of settings from flash", len);

        Ok(persist::decode(&buffer[..len])?)
    }

    /// Queue a write of the register, replacing any stored copy
    ///
    /// Completion arrives later as a backend event; the record is not
    /// durable when this returns.
    pub fn persist<B: RecordBackend>(
        &self,
        backend: &mut B,
        gc: &mut GcScheduler,
    ) -> Result<(), StoreError> {
        let mut buffer = [0u8; MAX_PERSISTED_LEN];
        let bytes = persist::encode(&self.record, &mut buffer)?;

        let updated = replace_record(backend, gc, settings_key(), bytes)?;
        if updated {
            trace!("Settings register updating");
        } else {
            debug!("Settings register creating");
        }
        Ok(())
    }

    /// Encode the wire form for the configuration characteristic
    pub fn to_wire(&self) -> [u8; WIRE_LEN] {
        self.record.to_wire()
    }

    /// Apply a configuration write from the central
    pub fn set_from_wire(&mut self, bytes: &[u8; WIRE_LEN]) {
        self.record.set_from_wire(bytes);
    }

    /// Advance the epoch clock by one second
    pub fn tick(&mut self) {
        self.record.epoch_timestamp = self.record.epoch_timestamp.wrapping_add(1);
    }

    /// Set the epoch clock
    pub fn set_epoch(&mut self, seconds: u32) {
        self.record.epoch_timestamp = seconds;
    }

    /// Current epoch time in seconds
    pub fn epoch(&self) -> u32 {
        self.record.epoch_timestamp
    }
}
