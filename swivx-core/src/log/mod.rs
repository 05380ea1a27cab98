//! Angle log
//!
//! Packets of timestamped samples stored in a ring of flash pages.

pub mod ring;

pub use ring::{circular_size, LogRing};
