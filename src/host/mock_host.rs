//! Mock host stack for testing.
//!
//! This backend serves scripted advertisements and profiles from memory
//! and records every call it receives, so the orchestrator can be tested
//! without a radio.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use log::info;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::central::interrupt::bounded;

use crate::gatt::{Address, Advertisement, Characteristic, Descriptor, Profile, SubscriptionMode};
use crate::host::{
    AdvertisementFilter, AdvertisementStream, Connection, DisconnectEvent, DisconnectNotifier, HostError,
    HostStack, NotificationHandler,
};

/// One recorded host stack call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Scan { allow_duplicates: bool },
    StopScan,
    Connect(Address),
    /// A connect attempt was given up and cleaned up
    AbortConnect(Address),
    DiscoverProfile(Address),
    ReadCharacteristic(Uuid),
    ReadDescriptor(Uuid),
    Subscribe(Uuid, SubscriptionMode),
    Unsubscribe(Uuid, SubscriptionMode),
    CancelConnection(Address),
    Disconnected(Address),
}

/// How a mock peripheral answers a connection attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Reachability {
    #[default]
    Reachable,
    /// Fails immediately
    Refuses,
    /// Never answers; only the connect window or a cancel ends the attempt
    Hangs,
}

/// Scripted peripheral
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    /// Discovered profile; `None` makes discovery fail
    pub profile: Option<Profile>,

    /// Characteristic values; a missing entry makes the read fail
    pub values: HashMap<Uuid, Vec<u8>>,

    /// Descriptor values keyed by (characteristic, descriptor)
    pub descriptor_values: HashMap<(Uuid, Uuid), Vec<u8>>,

    /// Values pushed to every subscription handler right after subscribing
    pub pushes: Vec<Vec<u8>>,

    pub reachability: Reachability,

    pub fail_subscribe: bool,

    pub fail_unsubscribe: bool,

    /// The peripheral drops the link right after profile discovery
    pub drops_link: bool,
}

impl MockDevice {
    pub fn with_profile(profile: Profile) -> Self {
        Self {
            profile: Some(profile),
            ..Self::default()
        }
    }

    pub fn value(mut self, characteristic: Uuid, value: &[u8]) -> Self {
        self.values.insert(characteristic, value.to_vec());
        self
    }

    pub fn descriptor_value(mut self, characteristic: Uuid, descriptor: Uuid, value: &[u8]) -> Self {
        self.descriptor_values.insert((characteristic, descriptor), value.to_vec());
        self
    }

    pub fn push(mut self, value: &[u8]) -> Self {
        self.pushes.push(value.to_vec());
        self
    }

    pub fn reachability(mut self, reachability: Reachability) -> Self {
        self.reachability = reachability;
        self
    }

    pub fn fail_subscribe(mut self) -> Self {
        self.fail_subscribe = true;
        self
    }

    pub fn fail_unsubscribe(mut self) -> Self {
        self.fail_unsubscribe = true;
        self
    }

    pub fn drops_link(mut self) -> Self {
        self.drops_link = true;
        self
    }
}

/// Shared call log and connection accounting
#[derive(Debug, Default)]
struct Journal {
    calls: Mutex<Vec<HostCall>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Journal {
    fn record(&self, call: HostCall) {
        info!("[MOCK HOST] {:?}", call);
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
    }

    fn opened(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
    }

    fn closed(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock host stack that plays back scripted advertisements and devices.
#[derive(Debug, Clone, Default)]
pub struct MockHost {
    advertisements: Vec<Advertisement>,
    devices: HashMap<Address, MockDevice>,
    keep_scanning: bool,
    journal: Arc<Journal>,
}

impl MockHost {
    /// Create a mock host with nothing to report
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an advertisement for the next scan
    pub fn advertise(mut self, advertisement: Advertisement) -> Self {
        self.advertisements.push(advertisement);
        self
    }

    /// Register the peripheral behind an address
    pub fn device(mut self, address: Address, device: MockDevice) -> Self {
        self.devices.insert(address, device);
        self
    }

    /// Keep the advertisement stream open after the queued reports, so the
    /// scan only ends on its deadline or an interrupt
    pub fn keep_scanning(mut self) -> Self {
        self.keep_scanning = true;
        self
    }

    /// All calls received so far, in order
    pub fn calls(&self) -> Vec<HostCall> {
        self.journal.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Highest number of simultaneously open connections seen
    pub fn max_concurrent_connections(&self) -> usize {
        self.journal.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostStack for MockHost {
    type Connection = MockConnection;

    async fn scan(&self, allow_duplicates: bool) -> Result<AdvertisementStream, HostError> {
        self.journal.record(HostCall::Scan { allow_duplicates });

        let reports = stream::iter(self.advertisements.clone());
        if self.keep_scanning {
            Ok(reports.chain(stream::pending()).boxed())
        } else {
            Ok(reports.boxed())
        }
    }

    async fn stop_scan(&self) -> Result<(), HostError> {
        self.journal.record(HostCall::StopScan);
        Ok(())
    }

    async fn connect(
        &self,
        filter: AdvertisementFilter<'_>,
        window: Duration,
        cancel: &CancellationToken,
    ) -> Result<MockConnection, HostError> {
        let address = self
            .advertisements
            .iter()
            .find(|&a| filter(a))
            .map(|a| a.address.clone())
            .ok_or(HostError::PeripheralNotFound)?;

        self.journal.record(HostCall::Connect(address.clone()));

        let device = self.devices.get(&address).cloned().ok_or(HostError::PeripheralNotFound)?;
        match device.reachability {
            Reachability::Reachable => {}
            Reachability::Refuses => {
                return Err(HostError::Operation(format!("{} refused the connection", address)));
            }
            Reachability::Hangs => {
                let outcome = bounded(window, cancel, futures::future::pending::<()>()).await;
                self.journal.record(HostCall::AbortConnect(address));
                return Err(HostError::abandoned(outcome, window));
            }
        }

        self.journal.opened();
        let (notifier, event) = DisconnectNotifier::new();
        Ok(MockConnection {
            address,
            device,
            journal: Arc::clone(&self.journal),
            notifier,
            event: Mutex::new(Some(event)),
            link: Arc::new(AtomicBool::new(true)),
        })
    }
}

/// Connection to a scripted peripheral
#[derive(Debug)]
pub struct MockConnection {
    address: Address,
    device: MockDevice,
    journal: Arc<Journal>,
    notifier: DisconnectNotifier,
    event: Mutex<Option<DisconnectEvent>>,
    /// Set while the link is up
    link: Arc<AtomicBool>,
}

impl MockConnection {
    fn check_link(&self) -> Result<(), HostError> {
        if self.link.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(HostError::Operation("not connected".to_string()))
        }
    }
}

/// Take the link down once: journal it, then fire the disconnect event
fn tear_down(journal: &Journal, link: &AtomicBool, notifier: &DisconnectNotifier, address: &Address) {
    if link.swap(false, Ordering::SeqCst) {
        journal.record(HostCall::Disconnected(address.clone()));
        journal.closed();
        notifier.notify();
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn address(&self) -> &Address {
        &self.address
    }

    fn disconnected(&self) -> DisconnectEvent {
        self.event
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .unwrap_or_else(DisconnectEvent::closed)
    }

    async fn discover_profile(&self) -> Result<Profile, HostError> {
        self.journal.record(HostCall::DiscoverProfile(self.address.clone()));
        self.check_link()?;
        let profile = self
            .device
            .profile
            .clone()
            .ok_or_else(|| HostError::Operation("profile discovery failed".to_string()))?;

        if self.device.drops_link {
            tear_down(&self.journal, &self.link, &self.notifier, &self.address);
        }
        Ok(profile)
    }

    async fn read_long_characteristic(&self, characteristic: &Characteristic) -> Result<Vec<u8>, HostError> {
        self.journal.record(HostCall::ReadCharacteristic(characteristic.uuid));
        self.check_link()?;
        self.device
            .values
            .get(&characteristic.uuid)
            .cloned()
            .ok_or_else(|| HostError::Operation("read not permitted".to_string()))
    }

    async fn read_descriptor(&self, descriptor: &Descriptor) -> Result<Vec<u8>, HostError> {
        self.journal.record(HostCall::ReadDescriptor(descriptor.uuid));
        self.check_link()?;
        self.device
            .descriptor_values
            .get(&(descriptor.characteristic_uuid, descriptor.uuid))
            .cloned()
            .ok_or(HostError::AttributeNotFound(descriptor.uuid))
    }

    async fn subscribe(
        &self,
        characteristic: &Characteristic,
        mode: SubscriptionMode,
        mut handler: NotificationHandler,
    ) -> Result<(), HostError> {
        self.journal.record(HostCall::Subscribe(characteristic.uuid, mode));
        self.check_link()?;
        if self.device.fail_subscribe {
            return Err(HostError::Operation("CCCD write rejected".to_string()));
        }

        for value in &self.device.pushes {
            handler(value);
        }
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: &Characteristic, mode: SubscriptionMode) -> Result<(), HostError> {
        self.journal.record(HostCall::Unsubscribe(characteristic.uuid, mode));
        self.check_link()?;
        if self.device.fail_unsubscribe {
            return Err(HostError::Operation("CCCD write rejected".to_string()));
        }
        Ok(())
    }

    async fn cancel_connection(&self) -> Result<(), HostError> {
        self.journal.record(HostCall::CancelConnection(self.address.clone()));

        // Tear down asynchronously, like a real link
        let journal = Arc::clone(&self.journal);
        let notifier = self.notifier.clone();
        let link = Arc::clone(&self.link);
        let address = self.address.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            tear_down(&journal, &link, &notifier, &address);
        });
        Ok(())
    }
}
