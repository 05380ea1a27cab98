//! In-memory collaborators for host tests
//!
//! [`MemoryBackend`] behaves like a word-addressed flash record store:
//! deleted records keep occupying space until a compaction, writes fail
//! with `NoSpace` once the byte budget is used, and completions are queued
//! as events. Failure modes can be injected per test.

use core::cell::Cell;

use heapless::{Deque, Vec};
use swivx_hal::flash::length_words;
use swivx_hal::{
    BackendError, BackendEvent, Clock, NotifyError, Notifier, RecordBackend, RecordDescriptor,
    RecordKey,
};

use crate::layout::BYTES_PER_PAGE;

/// Records the backend can hold
pub const MAX_RECORDS: usize = 24;

/// Largest record the backend accepts
pub const MAX_RECORD_LEN: usize = BYTES_PER_PAGE;

/// Completion events that can be queued
pub const EVENT_DEPTH: usize = 32;

#[derive(Debug, Clone)]
struct StoredRecord {
    key: RecordKey,
    record_id: u32,
    data: Vec<u8, MAX_RECORD_LEN>,
}

/// In-memory record backend
#[derive(Debug)]
pub struct MemoryBackend {
    records: Vec<StoredRecord, MAX_RECORDS>,
    events: Deque<BackendEvent, EVENT_DEPTH>,
    held: Deque<BackendEvent, EVENT_DEPTH>,
    initialized: bool,
    report_ready: bool,
    defer_events: bool,
    fail_reads: bool,
    fail_compact: bool,
    async_write_error: Option<BackendError>,
    budget_words: usize,
    garbage_words: usize,
    next_record_id: u32,
    writes: u32,
    deletes: u32,
    compactions: u32,
    last_write: Option<RecordKey>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an uninitialized backend that reports ready on `init`
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            events: Deque::new(),
            held: Deque::new(),
            initialized: false,
            report_ready: true,
            defer_events: false,
            fail_reads: false,
            fail_compact: false,
            async_write_error: None,
            budget_words: usize::MAX,
            garbage_words: 0,
            next_record_id: 1,
            writes: 0,
            deletes: 0,
            compactions: 0,
            last_write: None,
        }
    }

    /// Create a backend that never reports ready
    pub fn silent() -> Self {
        Self {
            report_ready: false,
            ..Self::new()
        }
    }

    /// Create an initialized backend with the ready event consumed
    pub fn ready() -> Self {
        let mut backend = Self::new();
        backend.initialized = true;
        backend
    }

    /// Limit the flash space to `bytes`, counted in whole words
    pub fn with_budget(mut self, bytes: usize) -> Self {
        self.budget_words = length_words(bytes);
        self
    }

    /// Change the flash space limit, counted in whole words
    pub fn set_budget(&mut self, bytes: usize) {
        self.budget_words = length_words(bytes);
    }

    /// Hold completion events until [`MemoryBackend::release_events`]
    pub fn defer_events(&mut self, defer: bool) {
        self.defer_events = defer;
    }

    /// Deliver held completion events
    pub fn release_events(&mut self) {
        while let Some(event) = self.held.pop_front() {
            let _ = self.events.push_back(event);
        }
    }

    /// Make reads fail with `Io`
    pub fn fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    /// Make compaction requests fail with `Io`
    pub fn fail_compact(&mut self, fail: bool) {
        self.fail_compact = fail;
    }

    /// Queue the next write but complete it with `error`
    pub fn fail_next_write_async(&mut self, error: BackendError) {
        self.async_write_error = Some(error);
    }

    /// Store a record directly, bypassing events and accounting
    pub fn insert(&mut self, key: RecordKey, data: &[u8]) {
        self.records.retain(|r| r.key != key);
        let mut stored = Vec::new();
        let _ = stored.extend_from_slice(data);
        let _ = self.records.push(StoredRecord {
            key,
            record_id: self.next_record_id,
            data: stored,
        });
        self.next_record_id += 1;
    }

    /// Contents of the live record under `key`
    pub fn record(&self, key: RecordKey) -> Option<&[u8]> {
        self.records
            .iter()
            .find(|r| r.key == key)
            .map(|r| r.data.as_slice())
    }

    /// Number of live records
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Writes queued so far
    pub fn writes(&self) -> u32 {
        self.writes
    }

    /// Deletes queued so far
    pub fn deletes(&self) -> u32 {
        self.deletes
    }

    /// Compactions queued so far
    pub fn compactions(&self) -> u32 {
        self.compactions
    }

    /// Key of the most recent write
    pub fn last_write(&self) -> Option<RecordKey> {
        self.last_write
    }

    /// Words of deleted records awaiting compaction
    pub fn garbage_words(&self) -> usize {
        self.garbage_words
    }

    fn used_words(&self) -> usize {
        let live: usize = self.records.iter().map(|r| length_words(r.data.len())).sum();
        live + self.garbage_words
    }

    fn complete(&mut self, event: BackendEvent) -> Result<(), BackendError> {
        let queue = if self.defer_events {
            &mut self.held
        } else {
            &mut self.events
        };
        queue.push_back(event).map_err(|_| BackendError::Busy)
    }

    fn ensure_initialized(&self) -> Result<(), BackendError> {
        if self.initialized {
            Ok(())
        } else {
            Err(BackendError::NotInitialized)
        }
    }
}

impl RecordBackend for MemoryBackend {
    fn init(&mut self) -> Result<(), BackendError> {
        self.initialized = true;
        if self.report_ready {
            self.complete(BackendEvent::InitReady { result: Ok(()) })?;
        }
        Ok(())
    }

    fn find(&mut self, key: RecordKey) -> Result<RecordDescriptor, BackendError> {
        self.ensure_initialized()?;
        self.records
            .iter()
            .find(|r| r.key == key)
            .map(|r| RecordDescriptor {
                key,
                record_id: r.record_id,
            })
            .ok_or(BackendError::NotFound)
    }

    fn read(
        &mut self,
        desc: &RecordDescriptor,
        buffer: &mut [u8],
    ) -> Result<usize, BackendError> {
        self.ensure_initialized()?;
        if self.fail_reads {
            return Err(BackendError::Io);
        }
        let record = self
            .records
            .iter()
            .find(|r| r.record_id == desc.record_id)
            .ok_or(BackendError::NotFound)?;
        let len = record.data.len();
        if buffer.len() < len {
            return Err(BackendError::BufferTooSmall);
        }
        buffer[..len].copy_from_slice(&record.data);
        Ok(len)
    }

    fn write(&mut self, key: RecordKey, data: &[u8]) -> Result<(), BackendError> {
        self.ensure_initialized()?;
        if data.len() > MAX_RECORD_LEN || self.records.is_full() {
            return Err(BackendError::NoSpace);
        }
        if self.used_words() + length_words(data.len()) > self.budget_words {
            return Err(BackendError::NoSpace);
        }

        self.writes += 1;
        self.last_write = Some(key);

        if let Some(error) = self.async_write_error.take() {
            return self.complete(BackendEvent::WriteComplete {
                key,
                result: Err(error),
            });
        }

        let mut stored = Vec::new();
        stored
            .extend_from_slice(data)
            .map_err(|_| BackendError::NoSpace)?;
        self.records
            .push(StoredRecord {
                key,
                record_id: self.next_record_id,
                data: stored,
            })
            .map_err(|_| BackendError::NoSpace)?;
        self.next_record_id += 1;

        self.complete(BackendEvent::WriteComplete {
            key,
            result: Ok(()),
        })
    }

    fn delete(&mut self, desc: &RecordDescriptor) -> Result<(), BackendError> {
        self.ensure_initialized()?;
        let index = self
            .records
            .iter()
            .position(|r| r.record_id == desc.record_id)
            .ok_or(BackendError::NotFound)?;
        let removed = self.records.swap_remove(index);
        self.garbage_words += length_words(removed.data.len());
        self.deletes += 1;

        self.complete(BackendEvent::DeleteComplete {
            key: desc.key,
            result: Ok(()),
        })
    }

    fn compact(&mut self) -> Result<(), BackendError> {
        self.ensure_initialized()?;
        if self.fail_compact {
            return Err(BackendError::Io);
        }
        self.garbage_words = 0;
        self.compactions += 1;
        self.complete(BackendEvent::GcComplete { result: Ok(()) })
    }

    fn poll_event(&mut self) -> Option<BackendEvent> {
        self.events.pop_front()
    }
}

/// Clock that advances by a fixed step every time it is read
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<u64>,
    step: u64,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Clock starting at 0 and advancing 1 ms per read
    pub fn new() -> Self {
        Self::with_step(1)
    }

    /// Clock starting at 0 and advancing `step` ms per read
    pub fn with_step(step: u64) -> Self {
        Self {
            now: Cell::new(0),
            step,
        }
    }

    /// Move the clock forward
    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        let now = self.now.get();
        self.now.set(now + self.step);
        now
    }
}

/// Notifier that records what it was asked to send
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    /// Whether a central is connected
    pub connected: bool,
    sent: Vec<Vec<u8, 32>, 64>,
}

impl RecordingNotifier {
    /// Create a connected notifier
    pub fn connected() -> Self {
        Self {
            connected: true,
            sent: Vec::new(),
        }
    }

    /// Payloads sent so far
    pub fn sent(&self) -> &[Vec<u8, 32>] {
        &self.sent
    }
}

impl Notifier for RecordingNotifier {
    fn send(&mut self, data: &[u8]) -> Result<(), NotifyError> {
        if !self.connected {
            return Err(NotifyError::NotConnected);
        }
        let mut payload = Vec::new();
        payload
            .extend_from_slice(data)
            .map_err(|_| NotifyError::Busy)?;
        self.sent.push(payload).map_err(|_| NotifyError::Busy)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
