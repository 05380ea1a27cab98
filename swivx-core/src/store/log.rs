//! Log operations on the store

use swivx_hal::{BackendError, Clock, RecordBackend};

use super::{replace_record, Store};
use crate::config::NoSpacePolicy;
use crate::error::StoreError;
use crate::layout::{page_key, BYTES_PER_PAGE, PACKET_SIZE};
use crate::log::circular_size;

impl<B: RecordBackend, C: Clock> Store<B, C> {
    /// Append one sample byte to the log
    ///
    /// Every `PACKET_SAMPLES`th sample closes a packet: the timestamp is
    /// appended, the active page is flushed and the settings (with the new
    /// head) are persisted. Returns true when that happened.
    ///
    /// Running out of flash is handled here by the configured
    /// [`NoSpacePolicy`]; it is not returned.
    pub fn append_sample(&mut self, sample: u8) -> Result<bool, StoreError> {
        self.ensure_initialized()?;
        self.process_events();

        if self.ring.is_rotation_pending() {
            self.rotate_page()?;
        }

        if !self.ring.stage(sample) {
            return Ok(false);
        }

        self.ring.seal(self.settings.record_mut());

        match self.flush_active_page() {
            Ok(()) => {}
            Err(StoreError::Backend(BackendError::NoSpace)) => {
                warn!("No space for log page {}", self.ring.active_page());
                self.recover_no_space(self.ring.active_page())?;
            }
            Err(e) => return Err(e),
        }

        self.last_flush_ms = Some(self.clock.now_ms());
        self.persist_settings()?;

        if self.ring.is_rotation_pending() {
            match self.rotate_page() {
                Ok(()) => {}
                // Retried on the next sample
                Err(StoreError::Timeout) => warn!("Page flush still in flight, rotation deferred"),
                Err(e) => return Err(e),
            }
        }

        Ok(true)
    }

    /// Bytes of valid log data
    pub fn log_size(&self) -> u32 {
        let record = self.settings.record();
        circular_size(
            record.log_head,
            record.log_tail,
            record.log_full,
            self.ring.capacity(),
        )
    }

    /// Log capacity in bytes
    pub fn capacity(&self) -> u32 {
        self.ring.capacity()
    }

    /// Next write offset in the log
    pub fn head(&self) -> u32 {
        self.settings.record().log_head
    }

    /// Oldest valid offset in the log
    pub fn tail(&self) -> u32 {
        self.settings.record().log_tail
    }

    /// Check if the log has wrapped
    pub fn is_full(&self) -> bool {
        self.settings.record().log_full
    }

    /// Active page index
    pub fn active_page(&self) -> u8 {
        self.ring.active_page()
    }

    /// Write position inside the active page
    pub fn cursor(&self) -> usize {
        self.ring.cursor()
    }

    /// The most recently closed packet, samples then big-endian timestamp
    pub fn last_packet(&self) -> Option<&[u8; PACKET_SIZE]> {
        self.ring.last_packet()
    }

    /// Empty the log
    ///
    /// Head, tail and the full flag go back to zero and page 0 becomes the
    /// active page. Stored pages are not erased; they are overwritten as
    /// the log fills again.
    pub fn full_flush(&mut self) -> Result<(), StoreError> {
        self.ensure_initialized()?;
        info!("Clearing log");

        self.clear_pointers();
        self.ring.reset();
        self.load_active_page();
        self.persist_settings()
    }

    /// Delete the stored record of log page `page`
    ///
    /// A page that was never written is not an error.
    pub fn delete_page(&mut self, page: u8) -> Result<(), StoreError> {
        self.ensure_initialized()?;
        if page >= self.ring.pages() {
            return Err(StoreError::InvalidArgument);
        }

        match self.backend.find(page_key(page)) {
            Ok(desc) => {
                self.backend.delete(&desc)?;
                self.gc.note_delete();
                debug!("Log page {} deleted", page);
                Ok(())
            }
            Err(BackendError::NotFound) => {
                debug!("Log page {} not stored", page);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Queue a write of the staging page under the active page key
    fn flush_active_page(&mut self) -> Result<(), StoreError> {
        let key = page_key(self.ring.active_page());
        replace_record(&mut self.backend, &mut self.gc, key, self.ring.staging())?;
        self.ring.mark_flush_issued();
        trace!("Flushing log page {}", self.ring.active_page());
        Ok(())
    }

    /// Move to the next page once the previous flush completed
    fn rotate_page(&mut self) -> Result<(), StoreError> {
        if self.ring.is_flush_outstanding() {
            self.wait_for(self.config.write_timeout_ms, |s| {
                !s.ring.is_flush_outstanding()
            })?;
        }

        // No-space recovery while waiting repositions the ring
        if !self.ring.is_rotation_pending() {
            return Ok(());
        }

        self.ring.advance_page();
        debug!("Log rotated to page {}", self.ring.active_page());
        self.load_active_page();
        Ok(())
    }

    /// Load the active page into staging, or erase staging if it is absent
    pub(super) fn load_active_page(&mut self) {
        let page = self.ring.active_page();
        let loaded = match self.backend.find(page_key(page)) {
            Ok(desc) => self.backend.read(&desc, self.ring.staging_mut()),
            Err(e) => Err(e),
        };

        match loaded {
            Ok(BYTES_PER_PAGE) => debug!("Log page {} loaded", page),
            Ok(len) => {
                warn!("Log page {} has {} bytes, erasing", page, len);
                self.ring.erase_staging();
            }
            Err(BackendError::NotFound) => self.ring.erase_staging(),
            Err(e) => {
                warn!("Log page {} unreadable: {:?}", page, e);
                self.ring.erase_staging();
            }
        }
    }

    /// Apply the no-space policy after a flush of `page` ran out of flash
    ///
    /// When the oldest page is dropped, the failed page is flushed again
    /// if it is still the active one, so `head` never counts data that is
    /// not in flash. A retry that also runs out of space resets the log.
    /// The caller persists the settings afterwards.
    pub(super) fn recover_no_space(&mut self, page: u8) -> Result<(), StoreError> {
        let dropped = match self.config.no_space_policy {
            NoSpacePolicy::ResetLog => false,
            NoSpacePolicy::DropOldestPage => self.drop_oldest_page()?,
        };
        if !dropped {
            self.restart_log();
            return Ok(());
        }

        // A reposition since the failed flush already discarded that page
        if page != self.ring.active_page() {
            return Ok(());
        }
        match self.flush_active_page() {
            Ok(()) => Ok(()),
            Err(StoreError::Backend(BackendError::NoSpace)) => {
                warn!("Log page {} still does not fit", page);
                self.restart_log();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn restart_log(&mut self) {
        warn!("Resetting log");
        self.clear_pointers();
        self.ring.position_at(0);
        self.load_active_page();
    }

    /// Delete the page holding the tail and move the tail past it
    ///
    /// Returns false without touching flash if the tail is on the active
    /// page, since dropping it would lose the staging page too.
    fn drop_oldest_page(&mut self) -> Result<bool, StoreError> {
        let page_bytes = BYTES_PER_PAGE as u32;
        let capacity = self.ring.capacity();
        let tail_page = (self.settings.record().log_tail / page_bytes) as u8;

        if tail_page == self.ring.active_page() {
            return Ok(false);
        }

        warn!("Dropping log page {}", tail_page);
        match self.backend.find(page_key(tail_page)) {
            Ok(desc) => {
                self.backend.delete(&desc)?;
                self.gc.note_delete();
            }
            Err(BackendError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        let record = self.settings.record_mut();
        record.log_tail = (u32::from(tail_page) + 1) * page_bytes % capacity;
        record.log_full = false;
        Ok(true)
    }

    fn clear_pointers(&mut self) {
        let record = self.settings.record_mut();
        record.log_head = 0;
        record.log_tail = 0;
        record.log_full = false;
    }
}
