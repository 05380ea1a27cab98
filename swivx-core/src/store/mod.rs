//! The storage owner
//!
//! [`Store`] holds the settings register, the log ring and the GC
//! bookkeeping together with the injected backend and clock. It is the
//! only thing that mutates them, so the firmware gives it to a single task
//! and feeds it through a channel.
//!
//! Lifecycle: [`Store::new`] → [`Store::init`] → operations →
//! [`Store::shutdown`].
//!
//! Backend completions are pulled from the backend and dispatched by
//! [`Store::handle_event`]. The two places that must wait for a
//! completion, boot readiness and page rotation, poll for events with a
//! timeout from [`StoreConfig`].

mod log;
mod settings;

use swivx_hal::{BackendError, BackendEvent, Clock, RecordBackend, RecordKey};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::gc::GcScheduler;
use crate::layout::{page_of, settings_key};
use crate::log::LogRing;
use crate::settings::{SettingsRecord, SettingsStore};

/// Queue a write of `data` under `key`, deleting any existing record first
///
/// Returns true if an existing record was replaced, in which case the
/// dead copy is reported to `gc`.
pub(crate) fn replace_record<B: RecordBackend>(
    backend: &mut B,
    gc: &mut GcScheduler,
    key: RecordKey,
    data: &[u8],
) -> Result<bool, BackendError> {
    match backend.find(key) {
        Ok(desc) => {
            backend.delete(&desc)?;
            backend.write(key, data)?;
            gc.note_update();
            Ok(true)
        }
        Err(BackendError::NotFound) => {
            backend.write(key, data)?;
            Ok(false)
        }
        Err(e) => {
            warn!("Record lookup failed: {:?}, writing fresh copy", e);
            backend.write(key, data)?;
            Ok(false)
        }
    }
}

/// Persistent log and settings store
pub struct Store<B, C> {
    backend: B,
    clock: C,
    config: StoreConfig,
    settings: SettingsStore,
    ring: LogRing,
    gc: GcScheduler,
    /// Outcome of backend initialization, once reported
    backend_ready: Option<Result<(), BackendError>>,
    initialized: bool,
    ticks_since_persist: u32,
    last_flush_ms: Option<u64>,
}

impl<B: RecordBackend, C: Clock> Store<B, C> {
    /// Create a store over `backend`
    ///
    /// Nothing touches flash until [`Store::init`].
    pub fn new(backend: B, clock: C, config: StoreConfig) -> Result<Self, StoreError> {
        if !config.is_valid() {
            return Err(StoreError::InvalidArgument);
        }

        Ok(Self {
            backend,
            clock,
            config,
            settings: SettingsStore::new(),
            ring: LogRing::new(config.pages_per_log),
            gc: GcScheduler::new(),
            backend_ready: None,
            initialized: false,
            ticks_since_persist: 0,
            last_flush_ms: None,
        })
    }

    /// Bring up the backend and load the settings and active log page
    ///
    /// Waits up to `init_timeout_ms` for the backend to report ready. A
    /// missing or invalid settings record is replaced by the defaults,
    /// which are persisted straight away. An error here leaves the store
    /// unusable; the firmware treats it as fatal.
    pub fn init(&mut self) -> Result<(), StoreError> {
        info!("Initializing storage");

        self.backend.init()?;
        self.wait_for(self.config.init_timeout_ms, |s| s.backend_ready.is_some())
            .inspect_err(|_| error!("Backend never reported ready"))?;
        if let Some(Err(e)) = self.backend_ready {
            error!("Backend initialization failed: {:?}", e);
            return Err(StoreError::Backend(e));
        }

        let capacity = self.ring.capacity();
        if !self.settings.recall(&mut self.backend, capacity) {
            info!("No saved settings, using defaults");
            self.settings.reset_to_defaults();
            self.settings.persist(&mut self.backend, &mut self.gc)?;
        }

        let record = self.settings.record();
        info!(
            "Log head={}, tail={}, full={}",
            record.log_head,
            record.log_tail,
            record.log_full
        );

        self.ring.position_at(record.log_head);
        self.load_active_page();
        self.initialized = true;
        Ok(())
    }

    /// Drain pending backend events and hand back the collaborators
    ///
    /// Waits up to `write_timeout_ms` for in-flight page flushes.
    pub fn shutdown(mut self) -> (B, C) {
        self.process_events();
        if self.ring.is_flush_outstanding()
            && self
                .wait_for(self.config.write_timeout_ms, |s| !s.ring.is_flush_outstanding())
                .is_err()
        {
            warn!("Shutting down with log flushes in flight");
        }
        info!("Storage shut down");
        (self.backend, self.clock)
    }

    /// Dispatch one backend completion event
    pub fn handle_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::InitReady { result } => {
                match result {
                    Ok(()) => info!("Backend initialized"),
                    Err(e) => error!("Backend init failed: {:?}", e),
                }
                self.backend_ready = Some(result);
            }
            BackendEvent::WriteComplete { key, result } => {
                if let Some(page) = page_of(key, self.ring.pages()) {
                    self.ring.mark_flush_complete();
                    match result {
                        Ok(()) => trace!("Log page {} saved", page),
                        Err(BackendError::NoSpace) => {
                            warn!("Log page {} ran out of space", page);
                            if let Err(e) = self
                                .recover_no_space(page)
                                .and_then(|()| self.persist_settings())
                            {
                                error!("No-space recovery failed: {:?}", e);
                            }
                        }
                        Err(e) => warn!("Log page {} write failed: {:?}", page, e),
                    }
                } else if key == settings_key() {
                    match result {
                        Ok(()) => debug!("Settings saved"),
                        Err(e) => warn!("Settings write failed: {:?}", e),
                    }
                }
            }
            BackendEvent::DeleteComplete { key, result } => {
                if let Err(e) = result {
                    warn!("Delete of {:?} failed: {:?}", key, e);
                }
            }
            BackendEvent::GcComplete { result } => {
                match result {
                    Ok(()) => info!("Garbage collection done"),
                    Err(e) => warn!("Garbage collection failed: {:?}", e),
                }
                self.gc.on_complete(result);
            }
        }
    }

    /// Dispatch every queued backend event
    ///
    /// Returns the number of events handled.
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.backend.poll_event() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Start a backend compaction pass
    ///
    /// Completion clears the in-progress flag through [`Store::handle_event`].
    pub fn run_garbage_collection(&mut self) -> Result<(), StoreError> {
        info!("Starting garbage collection");
        self.gc.start(&mut self.backend)?;
        Ok(())
    }

    /// GC bookkeeping
    pub fn gc(&self) -> &GcScheduler {
        &self.gc
    }

    /// Current settings register
    pub fn settings(&self) -> &SettingsRecord {
        self.settings.record()
    }

    /// Log ring state
    pub fn ring(&self) -> &LogRing {
        &self.ring
    }

    /// Store configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Check if [`Store::init`] completed
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Clock time of the most recent packet flush
    pub fn last_flush_ms(&self) -> Option<u64> {
        self.last_flush_ms
    }

    /// The record backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable record backend
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn ensure_initialized(&self) -> Result<(), StoreError> {
        if self.initialized {
            Ok(())
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    /// Poll backend events until `done` holds or `timeout_ms` elapses
    fn wait_for(&mut self, timeout_ms: u32, done: fn(&Self) -> bool) -> Result<(), StoreError> {
        let start = self.clock.now_ms();
        loop {
            self.process_events();
            if done(self) {
                return Ok(());
            }
            if self.clock.now_ms().saturating_sub(start) >= u64::from(timeout_ms) {
                return Err(StoreError::Timeout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{capacity, page_key};
    use crate::testing::{ManualClock, MemoryBackend};

    fn store() -> Store<MemoryBackend, ManualClock> {
        Store::new(MemoryBackend::new(), ManualClock::new(), StoreConfig::default()).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = StoreConfig {
            pages_per_log: 0,
            ..StoreConfig::default()
        };
        assert!(matches!(
            Store::new(MemoryBackend::new(), ManualClock::new(), config),
            Err(StoreError::InvalidArgument)
        ));
    }

    #[test]
    fn test_fresh_backend_gets_defaults() {
        let mut store = store();
        store.init().unwrap();

        let settings = store.settings();
        assert_eq!(settings.angle_min, 50);
        assert_eq!(settings.angle_max, 70);
        assert_eq!(settings.touch_duration_ms, 30_000);
        assert_eq!(settings.motor_duration_ms, 1000);
        assert_eq!(settings.motor_intensity_percent, 80);
        assert_eq!(settings.motor_pulse_count, 3);
        assert_eq!(settings.log_head, 0);
        assert_eq!(settings.log_tail, 0);
        assert_eq!(store.log_size(), 0);

        // Defaults are persisted immediately
        assert!(store.backend().record(settings_key()).is_some());
        assert!(store.is_initialized());
    }

    #[test]
    fn test_init_times_out_without_ready() {
        let mut store = Store::new(
            MemoryBackend::silent(),
            ManualClock::new(),
            StoreConfig::default(),
        )
        .unwrap();
        assert_eq!(store.init(), Err(StoreError::Timeout));
        assert!(!store.is_initialized());
    }

    #[test]
    fn test_init_waits_for_deferred_ready() {
        let mut backend = MemoryBackend::new();
        backend.defer_events(true);
        let mut store =
            Store::new(backend, ManualClock::new(), StoreConfig::default()).unwrap();
        // Ready is held back, so boot gives up
        assert_eq!(store.init(), Err(StoreError::Timeout));

        store.backend_mut().defer_events(false);
        store.backend_mut().release_events();
        store.init().unwrap();
    }

    #[test]
    fn test_init_reports_backend_failure() {
        let mut store = Store::new(
            MemoryBackend::silent(),
            ManualClock::new(),
            StoreConfig::default(),
        )
        .unwrap();
        store.handle_event(BackendEvent::InitReady {
            result: Err(BackendError::Io),
        });
        assert_eq!(store.init(), Err(StoreError::Backend(BackendError::Io)));
    }

    #[test]
    fn test_settings_survive_restart() {
        let mut store = store();
        store.init().unwrap();
        store.apply_settings_write(&[10, 20, 0, 0, 0, 100, 0, 200, 55, 2, 0, 0, 1, 0]).unwrap();
        let (backend, clock) = store.shutdown();

        let mut store = Store::new(backend, clock, StoreConfig::default()).unwrap();
        store.init().unwrap();
        assert_eq!(store.settings().angle_min, 10);
        assert_eq!(store.settings().angle_max, 20);
        assert_eq!(store.settings().touch_duration_ms, 100);
        assert_eq!(store.settings().motor_duration_ms, 200);
        assert_eq!(store.settings().motor_intensity_percent, 55);
        assert_eq!(store.settings().epoch_timestamp, 256);
    }

    #[test]
    fn test_pointers_beyond_smaller_log_fall_back_to_defaults() {
        let mut store = store();
        store.init().unwrap();
        for i in 0..(crate::layout::PACKET_SAMPLES * 230) {
            store.append_sample(i as u8).unwrap();
        }
        assert!(store.settings().log_head >= capacity(1));
        let (backend, clock) = store.shutdown();

        let config = StoreConfig {
            pages_per_log: 1,
            ..StoreConfig::default()
        };
        let mut store = Store::new(backend, clock, config).unwrap();
        store.init().unwrap();
        assert_eq!(store.settings().log_head, 0);
        assert_eq!(store.settings().angle_min, 50);
    }

    #[test]
    fn test_garbage_collection_cycle() {
        let mut store = store();
        store.init().unwrap();
        store.persist_settings().unwrap();
        assert!(store.gc().is_pending());

        store.run_garbage_collection().unwrap();
        assert!(!store.gc().is_pending());
        assert!(store.gc().is_in_progress());

        store.process_events();
        assert!(!store.gc().is_in_progress());
        assert_eq!(store.backend().compactions(), 1);
        assert_eq!(store.backend().garbage_words(), 0);
    }

    #[test]
    fn test_operations_need_init() {
        let mut store = store();
        assert_eq!(store.append_sample(1), Err(StoreError::NotInitialized));
        assert_eq!(store.full_flush(), Err(StoreError::NotInitialized));
    }

    #[test]
    fn test_shutdown_waits_for_flushes() {
        let mut store = store();
        store.init().unwrap();
        for i in 0..14 {
            store.append_sample(i).unwrap();
        }
        let (backend, _) = store.shutdown();
        assert!(backend.record(page_key(0)).is_some());
    }
}
