//! gatt-explorer: BLE GATT profile explorer
//!
//! This library scans for connectable BLE peripherals, connects to each
//! one in turn and reports the characteristics and descriptors of a
//! target service, optionally listening to notifications and indications
//! for a fixed window.

pub mod central;
pub mod config;
pub mod gatt;
pub mod host;
pub mod manager;
pub mod report;

// Re-export commonly used items
pub use central::{ExploreError, Interrupt};
pub use config::{CliArgs, Config};
pub use gatt::{Address, Advertisement, CharPropFlags, Characteristic, Descriptor, Profile, Service, SubscriptionMode};
pub use host::{BtleplugHost, Connection, HostError, HostStack, MockHost};
pub use manager::{DeviceOutcome, ExplorerManager, RunSummary};
pub use report::Reporter;
