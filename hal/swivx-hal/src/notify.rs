//! Wireless notification sink
//!
//! The GATT service layer implements this to push log packets and live
//! sample values to a connected central.

/// Errors from notification attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NotifyError {
    /// No active session, or notifications not enabled
    NotConnected,
    /// Service handle is not valid
    InvalidHandle,
    /// Transmit queue is full
    Busy,
}

/// Notification sink for the log characteristic
pub trait Notifier {
    /// Send a notification payload
    ///
    /// Log packets are 18 bytes; live samples are a single byte.
    fn send(&mut self, data: &[u8]) -> Result<(), NotifyError>;

    /// Check if a central is connected and subscribed
    fn is_connected(&self) -> bool;
}
