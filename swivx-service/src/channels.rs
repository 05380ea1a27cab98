//! Channel types for talking to the storage task
//!
//! The firmware declares the statics with its own mutex flavour:
//!
//! ```ignore
//! static STORAGE_REQUESTS: RequestChannel<CriticalSectionRawMutex> = Channel::new();
//! static STORAGE_STATUS: StatusSignal<CriticalSectionRawMutex> = Signal::new();
//! ```

use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_sync::signal::Signal;

use crate::service::{StorageRequest, StorageStatus};

/// Requests that can queue before senders wait
pub const REQUEST_QUEUE_DEPTH: usize = 8;

/// Request queue into the storage task
pub type RequestChannel<M> = Channel<M, StorageRequest, REQUEST_QUEUE_DEPTH>;

/// Sending half of [`RequestChannel`]
pub type RequestSender<'a, M> = Sender<'a, M, StorageRequest, REQUEST_QUEUE_DEPTH>;

/// Receiving half of [`RequestChannel`]
pub type RequestReceiver<'a, M> = Receiver<'a, M, StorageRequest, REQUEST_QUEUE_DEPTH>;

/// Latest storage status (updated by the storage task)
pub type StatusSignal<M> = Signal<M, StorageStatus>;
