//! Host stack backed by `btleplug`
//!
//! Maps the platform BLE central (BlueZ, CoreBluetooth, WinRT) onto the
//! [`HostStack`] and [`Connection`] traits.

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic as BtleCharacteristic, Descriptor as BtleDescriptor,
    Manager as _, Peripheral as _, PeripheralProperties, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use log::{debug, info, trace, warn};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::central::interrupt::{bounded, WaitOutcome};

use crate::gatt::{
    Address, Advertisement, Characteristic, Descriptor, Profile, Service, SubscriptionMode, DEFAULT_DEVICE,
};
use crate::host::{
    AdvertisementFilter, AdvertisementStream, Connection, DisconnectEvent, DisconnectNotifier, HostError,
    HostStack, NotificationHandler,
};

/// Host stack on top of one btleplug adapter
pub struct BtleplugHost {
    // Keeps the platform session alive for the adapter's lifetime
    _manager: Manager,
    adapter: Adapter,
}

impl BtleplugHost {
    /// Open the adapter selected by `device`.
    ///
    /// `"default"` picks the first adapter; anything else picks the first
    /// adapter whose description contains it (e.g. `hci1`).
    pub async fn new(device: &str) -> Result<Self, HostError> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;

        if adapters.is_empty() {
            return Err(HostError::NoAdapter);
        }

        for adapter in adapters {
            let adapter_info = adapter.adapter_info().await?;
            if device == DEFAULT_DEVICE || adapter_info.contains(device) {
                info!("Using Bluetooth adapter: {}", adapter_info);
                return Ok(Self {
                    _manager: manager,
                    adapter,
                });
            }
            debug!("Skipping adapter '{}' (want '{}')", adapter_info, device);
        }

        Err(HostError::AdapterNotFound(device.to_string()))
    }

    /// Find an already known peripheral matching the filter
    async fn find_known(&self, filter: AdvertisementFilter<'_>) -> Result<Option<(Peripheral, Address)>, HostError> {
        for peripheral in self.adapter.peripherals().await? {
            if let Ok(Some(properties)) = peripheral.properties().await {
                let advertisement = advertisement_from_properties(&peripheral.id(), properties);
                if filter(&advertisement) {
                    return Ok(Some((peripheral, advertisement.address)));
                }
            }
        }
        Ok(None)
    }

    /// Find the peripheral to connect to, scanning if it is not known yet
    async fn locate(&self, filter: AdvertisementFilter<'_>) -> Result<(Peripheral, Address), HostError> {
        match self.find_known(filter).await? {
            Some(found) => Ok(found),
            None => self.scan_for(filter).await,
        }
    }

    /// Scan until a peripheral matching the filter shows up
    async fn scan_for(&self, filter: AdvertisementFilter<'_>) -> Result<(Peripheral, Address), HostError> {
        let mut events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;

        let mut found = None;
        while let Some(event) = events.next().await {
            let id = match event {
                CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                _ => continue,
            };
            if let Some((peripheral, advertisement)) = snapshot(&self.adapter, &id).await {
                if filter(&advertisement) {
                    found = Some((peripheral, advertisement.address));
                    break;
                }
            }
        }

        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop scan after connect lookup: {}", e);
        }

        found.ok_or(HostError::PeripheralNotFound)
    }

    /// Connect and start watching for the disconnect event
    async fn open(
        &self,
        peripheral: Peripheral,
        address: Address,
        window: Duration,
        cancel: &CancellationToken,
    ) -> Result<BtleplugConnection, HostError> {
        // Subscribe before connecting so an early remote disconnect is not missed
        let mut events = self.adapter.events().await?;

        debug!("Connecting to {}", address);
        match bounded(window, cancel, peripheral.connect()).await {
            WaitOutcome::Completed(result) => result?,
            outcome => {
                // The platform stack may still bring the link up
                if let Err(e) = peripheral.disconnect().await {
                    debug!("Failed to drop abandoned link to {}: {}", address, e);
                }
                return Err(HostError::abandoned(outcome, window));
            }
        }

        let (notifier, event) = DisconnectNotifier::new();
        let id = peripheral.id();
        let watcher_notifier = notifier.clone();
        let watcher = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(gone) = event {
                    if gone == id {
                        break;
                    }
                }
            }
            watcher_notifier.notify();
        });

        Ok(BtleplugConnection {
            peripheral,
            address,
            notifier,
            event: Mutex::new(Some(event)),
            watcher,
            subscriptions: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl HostStack for BtleplugHost {
    type Connection = BtleplugConnection;

    async fn scan(&self, allow_duplicates: bool) -> Result<AdvertisementStream, HostError> {
        let events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;
        info!("Scan started (duplicates {})", if allow_duplicates { "allowed" } else { "suppressed" });

        let adapter = self.adapter.clone();
        let mut reports = ReportFilter::new(allow_duplicates);
        let stream = events.filter_map(move |event| {
            let id = match event {
                CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => Some(id),
                _ => None,
            }
            .filter(|id| reports.admit(id.clone()));

            let adapter = adapter.clone();
            async move { snapshot(&adapter, &id?).await.map(|(_, advertisement)| advertisement) }
        });

        Ok(stream.boxed())
    }

    async fn stop_scan(&self) -> Result<(), HostError> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn connect(
        &self,
        filter: AdvertisementFilter<'_>,
        window: Duration,
        cancel: &CancellationToken,
    ) -> Result<BtleplugConnection, HostError> {
        let started = Instant::now();
        let (peripheral, address) = match bounded(window, cancel, self.locate(filter)).await {
            WaitOutcome::Completed(found) => found?,
            outcome => {
                // The lookup may have been dropped while scanning
                if let Err(e) = self.adapter.stop_scan().await {
                    debug!("Failed to stop lookup scan: {}", e);
                }
                return Err(HostError::abandoned(outcome, window));
            }
        };

        let remaining = remaining_window(window, started.elapsed()).ok_or(HostError::ConnectTimeout(window))?;
        self.open(peripheral, address, remaining, cancel).await
    }
}

/// Live btleplug connection
pub struct BtleplugConnection {
    peripheral: Peripheral,
    address: Address,
    notifier: DisconnectNotifier,
    event: Mutex<Option<DisconnectEvent>>,
    watcher: JoinHandle<()>,
    /// Notification forwarding tasks per subscription
    subscriptions: Mutex<HashMap<(Uuid, SubscriptionMode), JoinHandle<()>>>,
}

impl BtleplugConnection {
    fn find_characteristic(&self, characteristic: &Characteristic) -> Result<BtleCharacteristic, HostError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic.uuid && c.service_uuid == characteristic.service_uuid)
            .ok_or(HostError::AttributeNotFound(characteristic.uuid))
    }

    fn find_descriptor(&self, descriptor: &Descriptor) -> Result<BtleDescriptor, HostError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .filter(|c| c.uuid == descriptor.characteristic_uuid && c.service_uuid == descriptor.service_uuid)
            .flat_map(|c| c.descriptors.into_iter())
            .find(|d| d.uuid == descriptor.uuid)
            .ok_or(HostError::AttributeNotFound(descriptor.uuid))
    }
}

#[async_trait]
impl Connection for BtleplugConnection {
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
        self.peripheral.discover_services().await?;

        let services = self
            .peripheral
            .services()
            .into_iter()
            .map(|service| Service {
                uuid: service.uuid,
                handle: None,
                characteristics: service.characteristics.into_iter().map(convert_characteristic).collect(),
            })
            .collect();

        Ok(Profile { services })
    }

    async fn read_long_characteristic(&self, characteristic: &Characteristic) -> Result<Vec<u8>, HostError> {
        // The platform stack issues Read Blob requests as needed
        let target = self.find_characteristic(characteristic)?;
        Ok(self.peripheral.read(&target).await?)
    }

    async fn read_descriptor(&self, descriptor: &Descriptor) -> Result<Vec<u8>, HostError> {
        let target = self.find_descriptor(descriptor)?;
        Ok(self.peripheral.read_descriptor(&target).await?)
    }

    async fn subscribe(
        &self,
        characteristic: &Characteristic,
        mode: SubscriptionMode,
        mut handler: NotificationHandler,
    ) -> Result<(), HostError> {
        let target = self.find_characteristic(characteristic)?;

        // btleplug writes the CCCD itself and picks notify or indicate from
        // the characteristic properties, so `mode` only keys the bookkeeping
        if mode == SubscriptionMode::Indication && characteristic.supports(SubscriptionMode::Notification) {
            warn!(
                "{} supports both notify and indicate; the platform enables notifications for the indication session",
                characteristic.uuid
            );
        }
        let mut notifications = self.peripheral.notifications().await?;
        self.peripheral.subscribe(&target).await?;
        debug!("Subscribed to {} ({})", characteristic.uuid, mode);

        let uuid = characteristic.uuid;
        let task = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid == uuid {
                    handler(&notification.value);
                } else {
                    trace!("Ignoring value for {}", notification.uuid);
                }
            }
        });

        let previous = self
            .subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((uuid, mode), task);
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: &Characteristic, mode: SubscriptionMode) -> Result<(), HostError> {
        let target = self.find_characteristic(characteristic)?;
        self.peripheral.unsubscribe(&target).await?;

        let task = self
            .subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(characteristic.uuid, mode));
        if let Some(task) = task {
            task.abort();
        }
        debug!("Unsubscribed from {} ({})", characteristic.uuid, mode);
        Ok(())
    }

    async fn cancel_connection(&self) -> Result<(), HostError> {
        let result = self.peripheral.disconnect().await;

        // Not every platform reports DeviceDisconnected for a local
        // disconnect; fall back to polling the link state
        if !self.peripheral.is_connected().await.unwrap_or(true) && self.notifier.notify() {
            debug!("{} disconnected (link state)", self.address);
        }

        result.map_err(HostError::from)
    }
}

impl Drop for BtleplugConnection {
    fn drop(&mut self) {
        self.watcher.abort();
        for (_, task) in self.subscriptions.lock().unwrap_or_else(|e| e.into_inner()).drain() {
            task.abort();
        }
    }
}

/// Time left of `window` after `elapsed`. Zero stays unbounded; `None`
/// once a bounded window has run out.
fn remaining_window(window: Duration, elapsed: Duration) -> Option<Duration> {
    if window.is_zero() {
        return Some(Duration::ZERO);
    }
    window.checked_sub(elapsed).filter(|left| !left.is_zero())
}

/// Decides which discovery events of one scan become reports.
///
/// BlueZ announces peripherals it already has cached with updates only, so
/// the first event of either kind for an id always gets through.
struct ReportFilter<K> {
    allow_duplicates: bool,
    seen: HashSet<K>,
}

impl<K: Eq + Hash> ReportFilter<K> {
    fn new(allow_duplicates: bool) -> Self {
        Self {
            allow_duplicates,
            seen: HashSet::new(),
        }
    }

    fn admit(&mut self, id: K) -> bool {
        self.seen.insert(id) || self.allow_duplicates
    }
}

/// Look up a peripheral and take an advertisement snapshot of it
async fn snapshot(adapter: &Adapter, id: &PeripheralId) -> Option<(Peripheral, Advertisement)> {
    let peripheral = adapter.peripheral(id).await.ok()?;
    let properties = peripheral.properties().await.ok()??;
    let advertisement = advertisement_from_properties(id, properties);
    Some((peripheral, advertisement))
}

/// Convert btleplug peripheral properties into an advertisement snapshot.
///
/// btleplug does not expose the advertising PDU type, so every reported
/// peripheral is taken as connectable.
fn advertisement_from_properties(id: &PeripheralId, properties: PeripheralProperties) -> Advertisement {
    let raw = properties.address.into_inner();
    let address = if raw == [0u8; 6] {
        // CoreBluetooth hides the radio address behind a per-host UUID
        Address::opaque(format!("{:?}", id))
    } else {
        Address::from_bytes(raw)
    };

    let mut companies: Vec<(u16, Vec<u8>)> = properties.manufacturer_data.into_iter().collect();
    companies.sort_by_key(|(company, _)| *company);
    let mut manufacturer_data = Vec::new();
    for (company, data) in companies {
        manufacturer_data.extend_from_slice(&company.to_le_bytes());
        manufacturer_data.extend_from_slice(&data);
    }

    Advertisement {
        address,
        connectable: true,
        local_name: properties.local_name,
        services: properties.services,
        manufacturer_data,
        rssi: properties.rssi.unwrap_or_default(),
    }
}

fn convert_characteristic(characteristic: BtleCharacteristic) -> Characteristic {
    let descriptors = characteristic
        .descriptors
        .into_iter()
        .map(|d| Descriptor {
            uuid: d.uuid,
            characteristic_uuid: d.characteristic_uuid,
            service_uuid: d.service_uuid,
            handle: None,
        })
        .collect();

    Characteristic {
        uuid: characteristic.uuid,
        service_uuid: characteristic.service_uuid,
        properties: characteristic.properties,
        handle: None,
        value_handle: None,
        descriptors,
    }
}
