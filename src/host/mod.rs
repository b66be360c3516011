//! Host stack abstraction
//!
//! This module describes the capabilities the explorer consumes from a
//! BLE host stack: scanning, connecting by predicate, profile discovery,
//! attribute reads, subscriptions and disconnect detection.

pub mod btleplug_host;
pub mod mock_host;

pub use btleplug_host::{BtleplugConnection, BtleplugHost};
pub use mock_host::{HostCall, MockConnection, MockDevice, MockHost, Reachability};

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::central::interrupt::WaitOutcome;
use crate::gatt::{Address, Advertisement, Characteristic, Descriptor, Profile, SubscriptionMode};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    #[error("No Bluetooth adapters found")]
    NoAdapter,

    #[error("No Bluetooth adapter matching '{0}'")]
    AdapterNotFound(String),

    #[error("Peripheral not found")]
    PeripheralNotFound,

    #[error("Connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Connection attempt canceled")]
    ConnectCanceled,

    #[error("Attribute {0} not found")]
    AttributeNotFound(Uuid),

    #[error("Host operation failed: {0}")]
    Operation(String),
}

impl HostError {
    /// Error for a connect attempt that ended on its window or a cancel
    pub(crate) fn abandoned<T>(outcome: WaitOutcome<T>, window: Duration) -> Self {
        match outcome {
            WaitOutcome::Canceled => HostError::ConnectCanceled,
            _ => HostError::ConnectTimeout(window),
        }
    }
}

/// Stream of advertisement snapshots produced by an active scan
pub type AdvertisementStream = BoxStream<'static, Advertisement>;

/// Predicate selecting the peripheral to connect to
pub type AdvertisementFilter<'a> = &'a (dyn Fn(&Advertisement) -> bool + Send + Sync);

/// Callback invoked once per pushed notification/indication value
pub type NotificationHandler = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Resolves once the connection is fully torn down
#[derive(Debug)]
pub struct DisconnectEvent(oneshot::Receiver<()>);

impl DisconnectEvent {
    /// An event that has already fired
    pub fn closed() -> Self {
        let (_, rx) = oneshot::channel();
        Self(rx)
    }

    /// Wait for the disconnect. A dropped notifier counts as disconnected.
    pub async fn wait(self) {
        let _ = self.0.await;
    }
}

/// Firing side of a [`DisconnectEvent`], shareable between every task
/// that can observe the teardown. Only the first notification counts.
#[derive(Debug, Clone)]
pub struct DisconnectNotifier(Arc<Mutex<Option<oneshot::Sender<()>>>>);

impl DisconnectNotifier {
    pub fn new() -> (Self, DisconnectEvent) {
        let (tx, rx) = oneshot::channel();
        (Self(Arc::new(Mutex::new(Some(tx)))), DisconnectEvent(rx))
    }

    /// Fire the event. Returns `true` for the first caller only.
    pub fn notify(&self) -> bool {
        let sender = self.0.lock().unwrap_or_else(|e| e.into_inner()).take();
        match sender {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }
}

/// BLE host stack in the central role
#[async_trait]
pub trait HostStack: Send + Sync {
    type Connection: Connection;

    /// Start scanning. With `allow_duplicates` unset the host stack reports
    /// each peripheral once; otherwise every radio report is forwarded.
    async fn scan(&self, allow_duplicates: bool) -> Result<AdvertisementStream, HostError>;

    /// Stop a scan started by [`HostStack::scan`]
    async fn stop_scan(&self) -> Result<(), HostError>;

    /// Connect to the first peripheral whose advertisement matches `filter`.
    ///
    /// The attempt gives up after `window` (zero = no limit) or when
    /// `cancel` fires. An abandoned attempt is cleaned up (lookup scan
    /// stopped, half-open link disconnected) before this returns.
    async fn connect(
        &self,
        filter: AdvertisementFilter<'_>,
        window: Duration,
        cancel: &CancellationToken,
    ) -> Result<Self::Connection, HostError>;
}

/// Live connection to one peripheral
#[async_trait]
pub trait Connection: Send + Sync {
    /// Address of the connected peripheral
    fn address(&self) -> &Address;

    /// Disconnect event for this connection. Can be taken once; later
    /// calls return an event that has already fired.
    fn disconnected(&self) -> DisconnectEvent;

    /// Discover all services, characteristics and descriptors
    async fn discover_profile(&self) -> Result<Profile, HostError>;

    /// Read a characteristic value, following long reads to the end
    async fn read_long_characteristic(&self, characteristic: &Characteristic) -> Result<Vec<u8>, HostError>;

    /// Read a descriptor value
    async fn read_descriptor(&self, descriptor: &Descriptor) -> Result<Vec<u8>, HostError>;

    /// Enable notifications or indications and route values to `handler`
    async fn subscribe(
        &self,
        characteristic: &Characteristic,
        mode: SubscriptionMode,
        handler: NotificationHandler,
    ) -> Result<(), HostError>;

    /// Disable a subscription made with the same mode
    async fn unsubscribe(&self, characteristic: &Characteristic, mode: SubscriptionMode) -> Result<(), HostError>;

    /// Request disconnection. Completion is signalled through
    /// [`Connection::disconnected`].
    async fn cancel_connection(&self) -> Result<(), HostError>;
}
