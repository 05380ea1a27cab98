//! Store errors

use swivx_hal::BackendError;

use crate::settings::SettingsError;

/// Errors surfaced by store operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// Record backend operation failed
    Backend(BackendError),
    /// Settings record could not be encoded
    Settings(SettingsError),
    /// Backend did not complete within the configured timeout
    Timeout,
    /// Argument out of range (page index, wire length, config)
    InvalidArgument,
    /// Operation requires a completed `init`
    NotInitialized,
}

impl From<BackendError> for StoreError {
    fn from(e: BackendError) -> Self {
        StoreError::Backend(e)
    }
}

impl From<SettingsError> for StoreError {
    fn from(e: SettingsError) -> Self {
        StoreError::Settings(e)
    }
}
