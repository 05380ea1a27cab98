//! The storage task
//!
//! [`StorageService`] owns the [`Store`] and the notifier. It serves
//! requests until [`StorageRequest::Shutdown`], after each one draining
//! backend events and publishing a fresh [`StorageStatus`].

use embassy_sync::blocking_mutex::raw::RawMutex;
use swivx_core::{Store, StoreError, WIRE_LEN};
use swivx_hal::{Clock, NotifyError, Notifier, RecordBackend};

use crate::channels::{RequestReceiver, StatusSignal};
use crate::config::ServiceConfig;

/// Requests to the storage task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageRequest {
    /// Angle sample for the log
    Sample(u8),
    /// Angle sample for live streaming only
    LiveSample(u8),
    /// One second elapsed
    ClockTick,
    /// Configuration written by the central
    SettingsWrite([u8; WIRE_LEN]),
    /// Empty the log
    FullFlush,
    /// Delete one log page
    DeletePage(u8),
    /// Compact the backend if dead records are waiting
    CollectGarbage,
    /// Stop serving and hand the store back
    Shutdown,
}

/// Snapshot of the store published after every request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StorageStatus {
    /// Settings in wire form
    pub settings: [u8; WIRE_LEN],
    /// Next write offset in the log
    pub log_head: u32,
    /// Oldest valid offset in the log
    pub log_tail: u32,
    /// Bytes of valid log data
    pub log_size: u32,
    /// Log has wrapped
    pub log_full: bool,
    /// Dead records are waiting for compaction
    pub gc_pending: bool,
    /// A compaction is running
    pub gc_in_progress: bool,
}

/// Single owner of the store
pub struct StorageService<'a, M: RawMutex, B, C, N> {
    store: Store<B, C>,
    notifier: N,
    config: ServiceConfig,
    status: &'a StatusSignal<M>,
    ticks: u32,
}

impl<'a, M, B, C, N> StorageService<'a, M, B, C, N>
where
    M: RawMutex,
    B: RecordBackend,
    C: Clock,
    N: Notifier,
{
    /// Wrap an initialized store
    pub fn new(
        store: Store<B, C>,
        notifier: N,
        config: ServiceConfig,
        status: &'a StatusSignal<M>,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
            status,
            ticks: 0,
        }
    }

    /// Serve requests until `Shutdown`
    ///
    /// Returns the store and notifier so the caller can shut the store
    /// down or restart the service.
    pub async fn run<R: RawMutex>(
        mut self,
        requests: RequestReceiver<'_, R>,
    ) -> (Store<B, C>, N) {
        info!("Storage service started");
        self.publish();

        loop {
            let request = requests.receive().await;
            if request == StorageRequest::Shutdown {
                break;
            }

            if let Err(e) = self.handle(request) {
                warn!("Storage request {:?} failed: {:?}", request, e);
            }
            self.store.process_events();
            self.publish();
        }

        self.store.process_events();
        self.publish();
        info!("Storage service stopped");
        (self.store, self.notifier)
    }

    /// Serve one request
    pub fn handle(&mut self, request: StorageRequest) -> Result<(), StoreError> {
        match request {
            StorageRequest::Sample(sample) => {
                let flushed = self.store.append_sample(sample)?;
                if flushed && self.notifier.is_connected() {
                    if let Some(packet) = self.store.last_packet().copied() {
                        self.notify(&packet);
                    }
                }
            }
            StorageRequest::LiveSample(sample) => {
                if self.notifier.is_connected() {
                    self.notify(&[sample]);
                }
            }
            StorageRequest::ClockTick => {
                self.store.clock_tick()?;
                self.ticks = self.ticks.saturating_add(1);
                let interval = self.config.gc_interval_ticks;
                if interval != 0 && self.ticks >= interval {
                    self.ticks = 0;
                    self.collect_garbage()?;
                }
            }
            StorageRequest::SettingsWrite(bytes) => self.store.apply_settings_write(&bytes)?,
            StorageRequest::FullFlush => self.store.full_flush()?,
            StorageRequest::DeletePage(page) => self.store.delete_page(page)?,
            StorageRequest::CollectGarbage => self.collect_garbage()?,
            StorageRequest::Shutdown => {}
        }
        Ok(())
    }

    /// Current status snapshot
    pub fn status(&self) -> StorageStatus {
        StorageStatus {
            settings: self.store.settings_wire(),
            log_head: self.store.head(),
            log_tail: self.store.tail(),
            log_size: self.store.log_size(),
            log_full: self.store.is_full(),
            gc_pending: self.store.gc().is_pending(),
            gc_in_progress: self.store.gc().is_in_progress(),
        }
    }

    /// The owned store
    pub fn store(&self) -> &Store<B, C> {
        &self.store
    }

    fn collect_garbage(&mut self) -> Result<(), StoreError> {
        let gc = self.store.gc();
        if gc.is_pending() && !gc.is_in_progress() {
            self.store.run_garbage_collection()?;
        }
        Ok(())
    }

    fn notify(&mut self, data: &[u8]) {
        match self.notifier.send(data) {
            Ok(()) => {}
            // Session dropped since the connection check
            Err(NotifyError::NotConnected) => {}
            Err(e) => warn!("Notification failed: {:?}", e),
        }
    }

    fn publish(&self) {
        self.status.signal(self.status());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use embassy_sync::channel::Channel;
    use embassy_sync::signal::Signal;
    use swivx_core::testing::{ManualClock, MemoryBackend, RecordingNotifier};
    use swivx_core::StoreConfig;

    use crate::channels::RequestChannel;

    type TestStore = Store<MemoryBackend, ManualClock>;

    fn store() -> TestStore {
        let mut store =
            Store::new(MemoryBackend::new(), ManualClock::new(), StoreConfig::default()).unwrap();
        store.init().unwrap();
        store
    }

    /// Feed `requests` then `Shutdown` through a channel and run the service
    fn serve(
        notifier: RecordingNotifier,
        config: ServiceConfig,
        status: &StatusSignal<NoopRawMutex>,
        requests: &[StorageRequest],
    ) -> (TestStore, RecordingNotifier) {
        let channel: RequestChannel<NoopRawMutex> = Channel::new();
        let service = StorageService::new(store(), notifier, config, status);

        let producer = async {
            for request in requests {
                channel.send(*request).await;
            }
            channel.send(StorageRequest::Shutdown).await;
        };
        let (_, parts) = block_on(join(producer, service.run(channel.receiver())));
        parts
    }

    fn samples(count: usize) -> impl Iterator<Item = StorageRequest> {
        (0..count).map(|i| StorageRequest::Sample(i as u8))
    }

    #[test]
    fn test_packet_notified_on_flush() {
        let status = Signal::new();
        let requests: Vec<_> = samples(14).collect();
        let (store, notifier) = serve(
            RecordingNotifier::connected(),
            ServiceConfig::default(),
            &status,
            &requests,
        );

        assert_eq!(store.head(), 18);
        assert_eq!(notifier.sent().len(), 1);
        let packet = &notifier.sent()[0];
        assert_eq!(packet.len(), 18);
        assert_eq!(&packet[..14], &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13]);
        assert_eq!(&packet[14..], &[0x5F, 0x7E, 0xC4, 0xFA]);
    }

    #[test]
    fn test_disconnected_notifier_is_ignored() {
        let status = Signal::new();
        let mut requests: Vec<_> = samples(28).collect();
        requests.push(StorageRequest::LiveSample(7));
        let (store, notifier) = serve(
            RecordingNotifier::default(),
            ServiceConfig::default(),
            &status,
            &requests,
        );

        assert_eq!(store.head(), 36);
        assert!(notifier.sent().is_empty());
    }

    /// Notifier that counts send attempts and is never connected
    #[derive(Default)]
    struct OfflineNotifier {
        attempts: u32,
    }

    impl Notifier for OfflineNotifier {
        fn send(&mut self, _data: &[u8]) -> Result<(), NotifyError> {
            self.attempts += 1;
            Err(NotifyError::NotConnected)
        }

        fn is_connected(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_no_send_without_connection() {
        let status: StatusSignal<NoopRawMutex> = Signal::new();
        let mut service = StorageService::new(
            store(),
            OfflineNotifier::default(),
            ServiceConfig::default(),
            &status,
        );

        for request in samples(14) {
            service.handle(request).unwrap();
        }
        service.handle(StorageRequest::LiveSample(3)).unwrap();

        assert_eq!(service.store().head(), 18);
        assert_eq!(service.notifier.attempts, 0);
    }

    #[test]
    fn test_live_sample() {
        let status = Signal::new();
        let (_, notifier) = serve(
            RecordingNotifier::connected(),
            ServiceConfig::default(),
            &status,
            &[StorageRequest::LiveSample(42)],
        );
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(notifier.sent()[0].as_slice(), &[42]);
    }

    #[test]
    fn test_settings_write_published() {
        let status = Signal::new();
        let wire = [45, 75, 0, 0, 0x4E, 0x20, 0x02, 0x58, 60, 2, 0x65, 0, 0, 0];
        let (store, _) = serve(
            RecordingNotifier::connected(),
            ServiceConfig::default(),
            &status,
            &[StorageRequest::SettingsWrite(wire)],
        );

        assert_eq!(store.settings().touch_duration_ms, 20_000);
        let published: StorageStatus = status.try_take().unwrap();
        assert_eq!(published.settings, wire);
        assert_eq!(published.log_size, 0);
        // Defaults were replaced, leaving a dead record
        assert!(published.gc_pending);
    }

    #[test]
    fn test_gc_runs_on_tick_interval() {
        let status = Signal::new();
        let wire = swivx_core::SettingsRecord::DEFAULT.to_wire();
        let config = ServiceConfig {
            gc_interval_ticks: 3,
        };
        let (store, _) = serve(
            RecordingNotifier::connected(),
            config,
            &status,
            &[
                StorageRequest::SettingsWrite(wire),
                StorageRequest::ClockTick,
                StorageRequest::ClockTick,
            ],
        );
        assert_eq!(store.backend().compactions(), 0);

        let (store, _) = serve(
            RecordingNotifier::connected(),
            config,
            &status,
            &[
                StorageRequest::SettingsWrite(wire),
                StorageRequest::ClockTick,
                StorageRequest::ClockTick,
                StorageRequest::ClockTick,
            ],
        );
        assert_eq!(store.backend().compactions(), 1);
        assert!(!store.gc().is_pending());
        assert!(!store.gc().is_in_progress());
    }

    #[test]
    fn test_gc_request_only_when_pending() {
        let status = Signal::new();
        let (store, _) = serve(
            RecordingNotifier::connected(),
            ServiceConfig::default(),
            &status,
            &[StorageRequest::CollectGarbage],
        );
        assert_eq!(store.backend().compactions(), 0);

        let (store, _) = serve(
            RecordingNotifier::connected(),
            ServiceConfig::default(),
            &status,
            &[
                StorageRequest::DeletePage(0),
                StorageRequest::FullFlush,
                StorageRequest::CollectGarbage,
            ],
        );
        assert_eq!(store.backend().compactions(), 1);
    }

    #[test]
    fn test_failed_request_keeps_serving() {
        let status = Signal::new();
        let mut requests = vec![StorageRequest::DeletePage(200), StorageRequest::FullFlush];
        requests.extend(samples(14));
        let (store, _) = serve(
            RecordingNotifier::connected(),
            ServiceConfig::default(),
            &status,
            &requests,
        );

        assert_eq!(store.head(), 18);
        let published = status.try_take().unwrap();
        assert_eq!(published.log_head, 18);
        assert_eq!(published.log_size, 18);
    }
}
