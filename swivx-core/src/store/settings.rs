//! Settings operations on the store

use swivx_hal::{Clock, RecordBackend};

use super::Store;
use crate::error::StoreError;
use crate::settings::WIRE_LEN;

impl<B: RecordBackend, C: Clock> Store<B, C> {
    /// Wire form of the settings for the configuration characteristic
    pub fn settings_wire(&self) -> [u8; WIRE_LEN] {
        self.settings.to_wire()
    }

    /// Apply a configuration write from the central and persist it
    ///
    /// `bytes` must be exactly [`WIRE_LEN`] long.
    pub fn apply_settings_write(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
        self.ensure_initialized()?;
        let wire: &[u8; WIRE_LEN] = bytes
            .try_into()
            .map_err(|_| StoreError::InvalidArgument)?;

        self.settings.set_from_wire(wire);
        info!(
            "Settings updated: angle {}..{}, motor {}% x{}",
            self.settings.record().angle_min,
            self.settings.record().angle_max,
            self.settings.record().motor_intensity(),
            self.settings.record().motor_pulse_count
        );
        self.persist_settings()
    }

    /// Queue a write of the settings register
    pub fn persist_settings(&mut self) -> Result<(), StoreError> {
        self.ticks_since_persist = 0;
        self.settings.persist(&mut self.backend, &mut self.gc)
    }

    /// Advance the epoch clock by one second
    ///
    /// The clock is persisted every `tick_persist_interval` ticks; packet
    /// flushes persist it in between. Returns true if this tick persisted.
    pub fn clock_tick(&mut self) -> Result<bool, StoreError> {
        self.settings.tick();
        self.ticks_since_persist = self.ticks_since_persist.saturating_add(1);

        let interval = self.config.tick_persist_interval;
        if !self.initialized || interval == 0 || self.ticks_since_persist < interval {
            return Ok(false);
        }

        trace!("Persisting epoch {}", self.settings.epoch());
        self.persist_settings()?;
        Ok(true)
    }

    /// Set the epoch clock, in seconds since the Unix epoch
    ///
    /// Takes effect in RAM; the next persist stores it.
    pub fn set_epoch(&mut self, seconds: u32) {
        self.settings.set_epoch(seconds);
    }
}
