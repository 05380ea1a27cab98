//! Settings record and its wire codec
//!
//! Wire layout (14 bytes, multi-byte fields big-endian):
//!
//! ```text
//! [0]      angle_min
//! [1]      angle_max
//! [2..6]   touch_duration_ms
//! [6..8]   motor_duration_ms
//! [8]      motor_intensity_percent
//! [9]      motor_pulse_count
//! [10..14] epoch_timestamp
//! ```
//!
//! Log pointers are not part of the wire form.

use serde::{Deserialize, Serialize};

use crate::layout::PACKET_SIZE;

/// Length of the settings wire form
pub const WIRE_LEN: usize = 14;

/// Epoch loaded when no settings are stored (2020-10-08 07:51:22 UTC)
pub const DEFAULT_EPOCH: u32 = 0x5F7E_C4FA;

/// Motor intensity ceiling in percent
pub const MAX_MOTOR_INTENSITY: u8 = 100;

/// The settings register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SettingsRecord {
    /// Lower angle threshold
    pub angle_min: u8,
    /// Upper angle threshold
    pub angle_max: u8,
    /// Touch hold duration
    pub touch_duration_ms: u32,
    /// Total vibration duration
    pub motor_duration_ms: u16,
    /// Vibration strength, 0-100
    pub motor_intensity_percent: u8,
    /// Number of vibration pulses
    pub motor_pulse_count: u8,
    /// Next write offset in the log
    pub log_head: u32,
    /// Oldest valid offset in the log
    pub log_tail: u32,
    /// Log has wrapped; disambiguates `log_head == log_tail`
    pub log_full: bool,
    /// Seconds since the Unix epoch
    pub epoch_timestamp: u32,
}

impl Default for SettingsRecord {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl SettingsRecord {
    /// Values used when flash holds no settings
    pub const DEFAULT: Self = Self {
        angle_min: 50,
        angle_max: 70,
        touch_duration_ms: 30_000,
        motor_duration_ms: 1000,
        motor_intensity_percent: 80,
        motor_pulse_count: 3,
        log_head: 0,
        log_tail: 0,
        log_full: false,
        epoch_timestamp: DEFAULT_EPOCH,
    };

    /// Encode the wire form
    pub fn to_wire(&self) -> [u8; WIRE_LEN] {
        let touch = self.touch_duration_ms.to_be_bytes();
        let motor = self.motor_duration_ms.to_be_bytes();
        let epoch = self.epoch_timestamp.to_be_bytes();
        [
            self.angle_min,
            self.angle_max,
            touch[0],
            touch[1],
            touch[2],
            touch[3],
            motor[0],
            motor[1],
            self.motor_intensity_percent,
            self.motor_pulse_count,
            epoch[0],
            epoch[1],
            epoch[2],
            epoch[3],
        ]
    }

    /// Apply a wire form written by the central
    ///
    /// Log pointers are left untouched. Intensity above 100 is clamped.
    pub fn set_from_wire(&mut self, bytes: &[u8; WIRE_LEN]) {
        self.angle_min = bytes[0];
        self.angle_max = bytes[1];
        self.touch_duration_ms = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        self.motor_duration_ms = u16::from_be_bytes([bytes[6], bytes[7]]);
        self.motor_intensity_percent = bytes[8].min(MAX_MOTOR_INTENSITY);
        self.motor_pulse_count = bytes[9];
        self.epoch_timestamp = u32::from_be_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]);
    }

    /// Motor intensity with the ceiling applied
    pub fn motor_intensity(&self) -> u8 {
        self.motor_intensity_percent.min(MAX_MOTOR_INTENSITY)
    }

    /// Check the log pointers against a log of `capacity` bytes
    pub fn log_pointers_valid(&self, capacity: u32) -> bool {
        let packet = PACKET_SIZE as u32;
        self.log_head % packet == 0
            && self.log_tail % packet == 0
            && self.log_head < capacity
            && self.log_tail < capacity
            && (!self.log_full || self.log_head == self.log_tail)
    }
}
