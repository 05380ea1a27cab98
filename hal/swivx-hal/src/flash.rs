//! Flash record backend abstractions
//!
//! The backend is a key-addressed record store in on-chip flash. Issuing
//! a write, delete or compaction only queues the operation; the outcome
//! arrives later as a [`BackendEvent`] pulled with
//! [`RecordBackend::poll_event`]. Reads are synchronous.

/// Size of a flash word in bytes
pub const WORD_SIZE: usize = 4;

/// Number of flash words needed to hold `len` bytes
///
/// Word-addressed record stores size records in words, not bytes.
pub const fn length_words(len: usize) -> usize {
    len.div_ceil(WORD_SIZE)
}

/// Identifies a record: a file id plus a key within that file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RecordKey {
    /// File the record belongs to
    pub file_id: u16,
    /// Record key within the file
    pub key: u16,
}

impl RecordKey {
    /// Encoded key length in bytes
    pub const ENCODED_LEN: usize = 4;

    /// Create a record key
    pub const fn new(file_id: u16, key: u16) -> Self {
        Self { file_id, key }
    }

    /// Encode as file id then key, both big-endian
    pub fn to_bytes(self) -> [u8; Self::ENCODED_LEN] {
        let file = self.file_id.to_be_bytes();
        let key = self.key.to_be_bytes();
        [file[0], file[1], key[0], key[1]]
    }

    /// Decode from the first four bytes of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::ENCODED_LEN {
            return None;
        }
        Some(Self {
            file_id: u16::from_be_bytes([bytes[0], bytes[1]]),
            key: u16::from_be_bytes([bytes[2], bytes[3]]),
        })
    }
}

/// Handle to a record located by [`RecordBackend::find`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RecordDescriptor {
    /// Key the record was found under
    pub key: RecordKey,
    /// Backend-specific record id (0 when the backend has none)
    pub record_id: u32,
}

/// Errors from record backend operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BackendError {
    /// Record not present
    NotFound,
    /// Flash exhausted
    NoSpace,
    /// Open, read or program failure
    Io,
    /// Operation queue is full
    Busy,
    /// Backend has not been initialized
    NotInitialized,
    /// Caller buffer cannot hold the record
    BufferTooSmall,
}

/// Completion events delivered by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BackendEvent {
    /// Backend finished initializing
    InitReady {
        /// Initialization outcome
        result: Result<(), BackendError>,
    },
    /// A queued write finished
    WriteComplete {
        /// Key that was written
        key: RecordKey,
        /// Write outcome
        result: Result<(), BackendError>,
    },
    /// A queued delete finished
    DeleteComplete {
        /// Key that was deleted
        key: RecordKey,
        /// Delete outcome
        result: Result<(), BackendError>,
    },
    /// A compaction pass finished
    GcComplete {
        /// Compaction outcome
        result: Result<(), BackendError>,
    },
}

/// Key-addressed flash record store with asynchronous completion
///
/// Implementations copy `data` before `write` returns, so callers may
/// reuse their buffer immediately. Errors returned directly mean the
/// operation was never queued; errors inside events mean it was queued
/// and then failed.
pub trait RecordBackend {
    /// Start backend initialization
    ///
    /// Completion is reported with [`BackendEvent::InitReady`].
    fn init(&mut self) -> Result<(), BackendError>;

    /// Locate a record by key
    fn find(&mut self, key: RecordKey) -> Result<RecordDescriptor, BackendError>;

    /// Read a located record into `buffer`
    ///
    /// # Returns
    /// The number of bytes read.
    fn read(&mut self, desc: &RecordDescriptor, buffer: &mut [u8])
        -> Result<usize, BackendError>;

    /// Queue a write of a new record under `key`
    fn write(&mut self, key: RecordKey, data: &[u8]) -> Result<(), BackendError>;

    /// Queue deletion of a located record
    fn delete(&mut self, desc: &RecordDescriptor) -> Result<(), BackendError>;

    /// Queue a compaction pass reclaiming deleted records
    fn compact(&mut self) -> Result<(), BackendError>;

    /// Take the next completion event, if any
    fn poll_event(&mut self) -> Option<BackendEvent>;
}

// Implement the sequential-storage Key trait when the feature is enabled
#[cfg(feature = "sequential-storage")]
impl sequential_storage::map::Key for RecordKey {
    fn serialize_into(
        &self,
        buffer: &mut [u8],
    ) -> Result<usize, sequential_storage::map::SerializationError> {
        if buffer.len() < Self::ENCODED_LEN {
            return Err(sequential_storage::map::SerializationError::BufferTooSmall);
        }
        buffer[..Self::ENCODED_LEN].copy_from_slice(&self.to_bytes());
        Ok(Self::ENCODED_LEN)
    }

    fn deserialize_from(
        buffer: &[u8],
    ) -> Result<(Self, usize), sequential_storage::map::SerializationError> {
        match RecordKey::from_bytes(buffer) {
            Some(key) => Ok((key, Self::ENCODED_LEN)),
            None => Err(sequential_storage::map::SerializationError::BufferTooSmall),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_words_rounds_up() {
        assert_eq!(length_words(0), 0);
        assert_eq!(length_words(1), 1);
        assert_eq!(length_words(4), 1);
        assert_eq!(length_words(24), 6);
        assert_eq!(length_words(4032), 1008);
    }

    #[test]
    fn test_record_key_bytes() {
        let key = RecordKey::new(0x1112, 0x0003);
        assert_eq!(key.to_bytes(), [0x11, 0x12, 0x00, 0x03]);
        assert_eq!(RecordKey::from_bytes(&key.to_bytes()), Some(key));
        assert_eq!(RecordKey::from_bytes(&[0x11, 0x12]), None);
    }
}
