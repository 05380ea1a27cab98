//! NOR flash record backend for the SwivX storage firmware
//!
//! Implements `swivx_hal::RecordBackend` on any flash that provides the
//! `embedded-storage-async` NOR traits, using sequential-storage maps for
//! wear leveling. Chip crates only need to hand over their flash driver
//! and the partition range.

#![no_std]
#![deny(unsafe_code)]

pub mod flash;

pub use flash::{NorRecordBackend, DATA_BUFFER_SIZE, EVENT_QUEUE_DEPTH};
