//! SwivX Hardware Abstraction Layer
//!
//! This crate defines the collaborator interfaces the storage firmware
//! consumes. Chip-specific crates implement them; the store and its tests
//! only see the traits.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  swivx-service (storage actor)          │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  swivx-core (settings, log ring, GC)    │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  swivx-hal (this crate - traits)        │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ swivx-hal-nor │       │ SoC record    │
//! │ (seq-storage) │       │ store (FDS)   │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`flash::RecordBackend`] - Key-addressed flash records with completion events
//! - [`notify::Notifier`] - Wireless notification sink
//! - [`clock::Clock`] - Monotonic milliseconds for bounded waits

#![no_std]
#![deny(unsafe_code)]

pub mod clock;
pub mod flash;
pub mod notify;

// Re-export key traits at crate root for convenience
pub use clock::Clock;
pub use flash::{BackendError, BackendEvent, RecordBackend, RecordDescriptor, RecordKey};
pub use notify::{NotifyError, Notifier};
