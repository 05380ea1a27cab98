//! Log ring buffer state
//!
//! The log is a circular byte space of `pages * BYTES_PER_PAGE` bytes.
//! Samples accumulate in a staging copy of the active page; every
//! `PACKET_SAMPLES` samples a big-endian timestamp closes the packet and
//! `head` moves one packet forward. When `head` lands on `tail` the log is
//! full and each further packet pushes `tail` forward too, discarding the
//! oldest packet.
//!
//! This type only does the bookkeeping. Flushing the staging page and
//! loading the next one is done by the [`Store`](crate::Store).

use crate::layout::{
    capacity, BYTES_PER_PAGE, ERASED_BYTE, PACKET_SAMPLES, PACKET_SIZE, TIMESTAMP_LEN,
};
use crate::settings::SettingsRecord;

/// Number of valid bytes between `tail` and `head`
pub fn circular_size(head: u32, tail: u32, full: bool, capacity: u32) -> u32 {
    if head > tail {
        head - tail
    } else if tail > head {
        capacity - (tail - head)
    } else if full {
        capacity
    } else {
        0
    }
}

/// Staging buffer and cursors of the active log page
#[derive(Debug, Clone)]
pub struct LogRing {
    staging: [u8; BYTES_PER_PAGE],
    /// Write position inside the staging page
    cursor: usize,
    /// Samples staged since the last packet was closed
    since_flush: usize,
    /// Active page index
    page: u8,
    /// Pages in the log
    pages: u8,
    /// Page flushes queued but not yet completed
    flushes_in_flight: u16,
    /// The active page is complete and the next one is not loaded yet
    rotation_pending: bool,
    last_packet: Option<[u8; PACKET_SIZE]>,
}

impl LogRing {
    /// Create a ring over `pages` pages with an erased staging page
    pub fn new(pages: u8) -> Self {
        Self {
            staging: [ERASED_BYTE; BYTES_PER_PAGE],
            cursor: 0,
            since_flush: 0,
            page: 0,
            pages,
            flushes_in_flight: 0,
            rotation_pending: false,
            last_packet: None,
        }
    }

    /// Pages in the log
    pub fn pages(&self) -> u8 {
        self.pages
    }

    /// Log capacity in bytes
    pub fn capacity(&self) -> u32 {
        capacity(self.pages)
    }

    /// Active page index
    pub fn active_page(&self) -> u8 {
        self.page
    }

    /// Write position inside the active page
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Samples waiting for the next packet to close
    pub fn samples_pending(&self) -> usize {
        self.since_flush
    }

    /// Staging copy of the active page
    pub fn staging(&self) -> &[u8; BYTES_PER_PAGE] {
        &self.staging
    }

    /// Mutable staging page, for loading it from flash
    pub fn staging_mut(&mut self) -> &mut [u8; BYTES_PER_PAGE] {
        &mut self.staging
    }

    /// Fill the staging page with the erased pattern
    pub fn erase_staging(&mut self) {
        self.staging.fill(ERASED_BYTE);
    }

    /// Most recently closed packet
    pub fn last_packet(&self) -> Option<&[u8; PACKET_SIZE]> {
        self.last_packet.as_ref()
    }

    /// Place the cursors at log offset `head`
    ///
    /// Used at boot; any partially staged packet is dropped.
    pub fn position_at(&mut self, head: u32) {
        self.page = (head / BYTES_PER_PAGE as u32) as u8;
        self.cursor = (head % BYTES_PER_PAGE as u32) as usize;
        self.since_flush = 0;
        self.rotation_pending = false;
    }

    /// Return to page 0, offset 0
    pub fn reset(&mut self) {
        self.position_at(0);
        self.last_packet = None;
    }

    /// Stage one sample byte
    ///
    /// Returns true once `PACKET_SAMPLES` samples are staged and the packet
    /// must be closed with [`LogRing::seal`].
    pub fn stage(&mut self, sample: u8) -> bool {
        debug_assert!(!self.rotation_pending);
        self.staging[self.cursor] = sample;
        self.cursor += 1;
        self.since_flush += 1;
        self.since_flush == PACKET_SAMPLES
    }

    /// Close the staged packet
    ///
    /// Appends the record's epoch timestamp, advances `log_head` one packet
    /// and, if the log was full, pushes `log_tail` past the oldest packet.
    pub fn seal(&mut self, record: &mut SettingsRecord) {
        let capacity = self.capacity();
        let packet = PACKET_SIZE as u32;

        if record.log_full && record.log_head == record.log_tail {
            record.log_tail = (record.log_tail + packet) % capacity;
        }

        let stamp = record.epoch_timestamp.to_be_bytes();
        self.staging[self.cursor..self.cursor + TIMESTAMP_LEN].copy_from_slice(&stamp);
        self.cursor += TIMESTAMP_LEN;
        self.since_flush = 0;

        record.log_head = (record.log_head + packet) % capacity;
        if record.log_head == record.log_tail {
            record.log_full = true;
        }

        let mut closed = [0u8; PACKET_SIZE];
        closed.copy_from_slice(&self.staging[self.cursor - PACKET_SIZE..self.cursor]);
        self.last_packet = Some(closed);

        if self.cursor >= BYTES_PER_PAGE {
            self.rotation_pending = true;
        }
    }

    /// Check if the active page is complete and must be rotated
    pub fn is_rotation_pending(&self) -> bool {
        self.rotation_pending
    }

    /// Move to the next page, wrapping to page 0 after the last one
    ///
    /// The caller loads the new page into the staging buffer.
    pub fn advance_page(&mut self) {
        self.page = if self.page + 1 >= self.pages {
            0
        } else {
            self.page + 1
        };
        self.cursor = 0;
        self.rotation_pending = false;
    }

    /// Note that a page flush was queued
    pub fn mark_flush_issued(&mut self) {
        self.flushes_in_flight = self.flushes_in_flight.saturating_add(1);
    }

    /// Note that the backend finished a page flush
    pub fn mark_flush_complete(&mut self) {
        self.flushes_in_flight = self.flushes_in_flight.saturating_sub(1);
    }

    /// Check if any page flush is still in flight
    pub fn is_flush_outstanding(&self) -> bool {
        self.flushes_in_flight > 0
    }
}
