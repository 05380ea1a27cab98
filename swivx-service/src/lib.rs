//! Storage service for the SwivX wearable
//!
//! Everything that mutates the log and settings runs on one task. Other
//! tasks (sensor sampling, the 1 Hz tick, the GATT handlers) send
//! [`StorageRequest`]s over a channel and read the published
//! [`StorageStatus`]:
//!
//! ```text
//!  sensor ──Sample──┐
//!  tick ──ClockTick─┼──► RequestChannel ──► StorageService ──► Store
//!  GATT ──Settings──┘                           │   │
//!                                               │   └──► Notifier (packets)
//!                                               └──────► StatusSignal
//! ```

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod channels;
pub mod config;
pub mod service;

pub use channels::{
    RequestChannel, RequestReceiver, RequestSender, StatusSignal, REQUEST_QUEUE_DEPTH,
};
pub use config::ServiceConfig;
pub use service::{StorageRequest, StorageService, StorageStatus};
