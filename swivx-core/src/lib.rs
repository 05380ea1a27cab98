//! Persistent storage core for the SwivX wearable
//!
//! This crate owns everything the device keeps in flash:
//!
//! - Settings register (thresholds, motor profile, epoch clock, log pointers)
//! - Angle log ring buffer spread over fixed flash pages
//! - Garbage collection scheduling for the record backend
//! - The [`Store`] tying them to a `swivx_hal::RecordBackend`
//!
//! Nothing here touches hardware directly; the backend, clock and
//! notifier are injected through the `swivx-hal` traits.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod config;
pub mod error;
pub mod gc;
pub mod layout;
pub mod log;
pub mod settings;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::{NoSpacePolicy, StoreConfig};
pub use error::StoreError;
pub use gc::GcScheduler;
pub use log::LogRing;
pub use settings::{SettingsRecord, SettingsStore, WIRE_LEN};
pub use store::Store;
