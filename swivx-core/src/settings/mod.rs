//! Settings register
//!
//! The fixed configuration record shared with the motor and wireless
//! layers, its 14-byte wire form, and its persisted flash form.

pub mod persist;
pub mod record;
pub mod register;

pub use persist::{SettingsError, MAX_PERSISTED_LEN, SETTINGS_MAGIC, SETTINGS_VERSION};
pub use record::{SettingsRecord, DEFAULT_EPOCH, MAX_MOTOR_INTENSITY, WIRE_LEN};
pub use register::SettingsStore;
