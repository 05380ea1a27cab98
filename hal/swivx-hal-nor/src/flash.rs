//! Record backend over NOR flash
//!
//! Uses sequential-storage for wear-leveled key-value storage in a flash
//! partition. The map API is async; operations are driven to completion
//! on the caller's context and their outcome is queued as a completion
//! event, matching the event-driven contract of `RecordBackend`.

use core::ops::Range;

use embassy_futures::block_on;
use embedded_storage_async::nor_flash::MultiwriteNorFlash;
use heapless::Deque;
use sequential_storage::cache::NoCache;
use sequential_storage::map;

// Re-export shared types from swivx-hal
pub use swivx_hal::flash::{
    BackendError, BackendEvent, RecordBackend, RecordDescriptor, RecordKey,
};

/// Scratch buffer size; must hold the largest item plus its key and header
pub const DATA_BUFFER_SIZE: usize = 4096;

/// Completion events that can be pending at once
pub const EVENT_QUEUE_DEPTH: usize = 8;

/// Map a sequential-storage error onto the backend error set
fn storage_error<E>(e: sequential_storage::Error<E>) -> BackendError {
    match e {
        sequential_storage::Error::FullStorage => BackendError::NoSpace,
        _ => BackendError::Io,
    }
}

/// Record backend on a NOR flash partition
///
/// Sequential-storage reclaims erased pages while storing, so an explicit
/// compaction has nothing left to do and completes immediately.
pub struct NorRecordBackend<F> {
    flash: F,
    range: Range<u32>,
    data_buffer: [u8; DATA_BUFFER_SIZE],
    events: Deque<BackendEvent, EVENT_QUEUE_DEPTH>,
    initialized: bool,
}

impl<F: MultiwriteNorFlash> NorRecordBackend<F> {
    /// Create a backend over `range` of `flash`
    ///
    /// The range must be aligned to the flash erase size and span at
    /// least two erase pages.
    pub fn new(flash: F, range: Range<u32>) -> Self {
        Self {
            flash,
            range,
            data_buffer: [0u8; DATA_BUFFER_SIZE],
            events: Deque::new(),
            initialized: false,
        }
    }

    /// Get the raw flash for low-level access
    pub fn flash(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Consume the backend and return the flash
    pub fn into_flash(self) -> F {
        self.flash
    }

    fn push_event(&mut self, event: BackendEvent) -> Result<(), BackendError> {
        self.events
            .push_back(event)
            .map_err(|_| BackendError::Busy)
    }

    fn ensure_initialized(&self) -> Result<(), BackendError> {
        if self.initialized {
            Ok(())
        } else {
            Err(BackendError::NotInitialized)
        }
    }
}

impl<F: MultiwriteNorFlash> RecordBackend for NorRecordBackend<F> {
    fn init(&mut self) -> Result<(), BackendError> {
        self.initialized = true;
        self.push_event(BackendEvent::InitReady { result: Ok(()) })
    }

    fn find(&mut self, key: RecordKey) -> Result<RecordDescriptor, BackendError> {
        self.ensure_initialized()?;

        let result = block_on(map::fetch_item::<RecordKey, &[u8], _>(
            &mut self.flash,
            self.range.clone(),
            &mut NoCache::new(),
            &mut self.data_buffer,
            &key,
        ));

        match result {
            Ok(Some(_)) => Ok(RecordDescriptor { key, record_id: 0 }),
            Ok(None) => Err(BackendError::NotFound),
            Err(e) => Err(storage_error(e)),
        }
    }

    fn read(
        &mut self,
        desc: &RecordDescriptor,
        buffer: &mut [u8],
    ) -> Result<usize, BackendError> {
        self.ensure_initialized()?;

        let result = block_on(map::fetch_item::<RecordKey, &[u8], _>(
            &mut self.flash,
            self.range.clone(),
            &mut NoCache::new(),
            &mut self.data_buffer,
            &desc.key,
        ));

        match result {
            Ok(Some(data)) => {
                let len = data.len();
                if buffer.len() < len {
                    return Err(BackendError::BufferTooSmall);
                }
                buffer[..len].copy_from_slice(data);
                Ok(len)
            }
            Ok(None) => Err(BackendError::NotFound),
            Err(e) => Err(storage_error(e)),
        }
    }

    fn write(&mut self, key: RecordKey, data: &[u8]) -> Result<(), BackendError> {
        self.ensure_initialized()?;
        if self.events.is_full() {
            return Err(BackendError::Busy);
        }

        block_on(map::store_item(
            &mut self.flash,
            self.range.clone(),
            &mut NoCache::new(),
            &mut self.data_buffer,
            &key,
            &data,
        ))
        .map_err(storage_error)?;

        self.push_event(BackendEvent::WriteComplete {
            key,
            result: Ok(()),
        })
    }

    fn delete(&mut self, desc: &RecordDescriptor) -> Result<(), BackendError> {
        self.ensure_initialized()?;
        if self.events.is_full() {
            return Err(BackendError::Busy);
        }

        block_on(map::remove_item(
            &mut self.flash,
            self.range.clone(),
            &mut NoCache::new(),
            &mut self.data_buffer,
            &desc.key,
        ))
        .map_err(storage_error)?;

        self.push_event(BackendEvent::DeleteComplete {
            key: desc.key,
            result: Ok(()),
        })
    }

    fn compact(&mut self) -> Result<(), BackendError> {
        self.ensure_initialized()?;
        self.push_event(BackendEvent::GcComplete { result: Ok(()) })
    }

    fn poll_event(&mut self) -> Option<BackendEvent> {
        self.events.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_storage_async::nor_flash::{
        ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
    };

    const PAGE_SIZE: usize = 4096;
    const PAGES: usize = 6;
    const FLASH_SIZE: usize = PAGE_SIZE * PAGES;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct MemFlashError(NorFlashErrorKind);

    impl NorFlashError for MemFlashError {
        fn kind(&self) -> NorFlashErrorKind {
            self.0
        }
    }

    /// In-memory NOR flash: erase sets bytes to 0xFF, writes can only clear bits
    struct MemFlash {
        data: [u8; FLASH_SIZE],
    }

    impl MemFlash {
        fn new() -> Self {
            Self {
                data: [0xFF; FLASH_SIZE],
            }
        }

        fn check(&self, offset: u32, len: usize, align: usize) -> Result<(), MemFlashError> {
            let offset = offset as usize;
            if offset % align != 0 || len % align != 0 {
                return Err(MemFlashError(NorFlashErrorKind::NotAligned));
            }
            if offset + len > FLASH_SIZE {
                return Err(MemFlashError(NorFlashErrorKind::OutOfBounds));
            }
            Ok(())
        }
    }

    impl ErrorType for MemFlash {
        type Error = MemFlashError;
    }

    impl ReadNorFlash for MemFlash {
        const READ_SIZE: usize = 1;

        async fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
            self.check(offset, bytes.len(), Self::READ_SIZE)?;
            let start = offset as usize;
            bytes.copy_from_slice(&self.data[start..start + bytes.len()]);
            Ok(())
        }

        fn capacity(&self) -> usize {
            FLASH_SIZE
        }
    }

    impl NorFlash for MemFlash {
        const WRITE_SIZE: usize = 4;
        const ERASE_SIZE: usize = PAGE_SIZE;

        async fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
            self.check(from, (to - from) as usize, Self::ERASE_SIZE)?;
            self.data[from as usize..to as usize].fill(0xFF);
            Ok(())
        }

        async fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
            self.check(offset, bytes.len(), Self::WRITE_SIZE)?;
            let start = offset as usize;
            for (cell, byte) in self.data[start..start + bytes.len()].iter_mut().zip(bytes) {
                *cell &= *byte;
            }
            Ok(())
        }
    }

    impl MultiwriteNorFlash for MemFlash {}

    fn backend() -> NorRecordBackend<MemFlash> {
        let mut backend = NorRecordBackend::new(MemFlash::new(), 0..FLASH_SIZE as u32);
        backend.init().unwrap();
        assert_eq!(
            backend.poll_event(),
            Some(BackendEvent::InitReady { result: Ok(()) })
        );
        backend
    }

    const SETTINGS: RecordKey = RecordKey::new(0x1111, 0x2222);

    #[test]
    fn test_operations_before_init_fail() {
        let mut backend = NorRecordBackend::new(MemFlash::new(), 0..FLASH_SIZE as u32);
        assert_eq!(backend.find(SETTINGS), Err(BackendError::NotInitialized));
        assert_eq!(backend.write(SETTINGS, &[1]), Err(BackendError::NotInitialized));
    }

    #[test]
    fn test_find_missing_record() {
        let mut backend = backend();
        assert_eq!(backend.find(SETTINGS), Err(BackendError::NotFound));
    }

    #[test]
    fn test_write_then_read() {
        let mut backend = backend();
        backend.write(SETTINGS, &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(
            backend.poll_event(),
            Some(BackendEvent::WriteComplete {
                key: SETTINGS,
                result: Ok(())
            })
        );

        let desc = backend.find(SETTINGS).unwrap();
        let mut buffer = [0u8; 16];
        let len = backend.read(&desc, &mut buffer).unwrap();
        assert_eq!(&buffer[..len], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_read_into_small_buffer() {
        let mut backend = backend();
        backend.write(SETTINGS, &[7; 8]).unwrap();
        let desc = backend.find(SETTINGS).unwrap();
        let mut buffer = [0u8; 4];
        assert_eq!(
            backend.read(&desc, &mut buffer),
            Err(BackendError::BufferTooSmall)
        );
    }

    #[test]
    fn test_overwrite_keeps_latest() {
        let mut backend = backend();
        backend.write(SETTINGS, &[1; 8]).unwrap();
        backend.write(SETTINGS, &[2; 8]).unwrap();

        let desc = backend.find(SETTINGS).unwrap();
        let mut buffer = [0u8; 8];
        backend.read(&desc, &mut buffer).unwrap();
        assert_eq!(buffer, [2; 8]);
    }

    #[test]
    fn test_delete_removes_record() {
        let mut backend = backend();
        backend.write(SETTINGS, &[1; 8]).unwrap();
        let _ = backend.poll_event();

        let desc = backend.find(SETTINGS).unwrap();
        backend.delete(&desc).unwrap();
        assert_eq!(
            backend.poll_event(),
            Some(BackendEvent::DeleteComplete {
                key: SETTINGS,
                result: Ok(())
            })
        );
        assert_eq!(backend.find(SETTINGS), Err(BackendError::NotFound));
    }

    #[test]
    fn test_full_log_page_fits() {
        let mut backend = backend();
        let page_key = RecordKey::new(0x1112, 0x0001);
        let mut page = [0xFFu8; 4032];
        page[..18].copy_from_slice(&[0xA5; 18]);
        backend.write(page_key, &page).unwrap();

        let desc = backend.find(page_key).unwrap();
        let mut buffer = [0u8; 4032];
        assert_eq!(backend.read(&desc, &mut buffer), Ok(4032));
        assert_eq!(&buffer[..18], &[0xA5; 18]);
    }

    #[test]
    fn test_compact_completes_immediately() {
        let mut backend = backend();
        backend.compact().unwrap();
        assert_eq!(
            backend.poll_event(),
            Some(BackendEvent::GcComplete { result: Ok(()) })
        );
    }

    #[test]
    fn test_full_partition_is_no_space() {
        let mut backend = backend();
        let page = [0x5Au8; 4032];

        let failure = (1..=16u16)
            .map(|key| {
                let result = backend.write(RecordKey::new(0x1112, key), &page);
                let _ = backend.poll_event();
                result
            })
            .find(|result| result.is_err());
        assert_eq!(failure, Some(Err(BackendError::NoSpace)));
    }

    #[test]
    fn test_store_log_survives_reboot() {
        use swivx_core::layout::{page_key, PACKETS_PER_PAGE, PACKET_SAMPLES};
        use swivx_core::testing::ManualClock;
        use swivx_core::{Store, StoreConfig};

        let config = StoreConfig {
            pages_per_log: 2,
            ..StoreConfig::default()
        };
        let backend = NorRecordBackend::new(MemFlash::new(), 0..FLASH_SIZE as u32);
        let mut store = Store::new(backend, ManualClock::new(), config).unwrap();
        store.init().unwrap();

        // Across the rotation into page 1
        for n in 0..(PACKETS_PER_PAGE + 2) * PACKET_SAMPLES {
            store.append_sample(n as u8).unwrap();
        }
        assert_eq!(store.active_page(), 1);
        let head = store.head();
        let mut first_packet = [0u8; 18];
        first_packet.copy_from_slice(&store.ring().staging()[..18]);

        let (mut backend, clock) = store.shutdown();
        assert!(backend.find(page_key(0)).is_ok());
        assert!(backend.find(page_key(1)).is_ok());

        let mut store = Store::new(backend, clock, config).unwrap();
        store.init().unwrap();
        assert_eq!(store.head(), head);
        assert_eq!(store.active_page(), 1);
        assert_eq!(store.cursor(), 36);
        assert_eq!(&store.ring().staging()[..18], &first_packet);
        assert_eq!(store.ring().staging()[36], 0xFF);
    }

    #[test]
    fn test_event_queue_overflow_is_busy() {
        let mut backend = backend();
        for _ in 0..EVENT_QUEUE_DEPTH {
            backend.compact().unwrap();
        }
        assert_eq!(backend.write(SETTINGS, &[1]), Err(BackendError::Busy));
    }
}
