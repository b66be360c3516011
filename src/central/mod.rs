//! Central role: scanning, connecting and exploring peripherals
//!
//! The pieces here run in a fixed order per run: the [`Collector`] gathers
//! advertisements, the manager walks them through the [`DeviceRegistry`],
//! and each connected peripheral is handed to the [`ProfileExplorer`].

pub mod collector;
pub mod explorer;
pub mod interrupt;
pub mod registry;
pub mod subscription;

pub use collector::{Collector, ScanOutcome};
pub use explorer::{Exploration, ProfileExplorer};
pub use interrupt::{bounded, deadline, Interrupt, WaitOutcome};
pub use registry::DeviceRegistry;
pub use subscription::{SessionEnd, SubscriptionSession};

use thiserror::Error;
use uuid::Uuid;

use crate::gatt::SubscriptionMode;
use crate::host::HostError;

/// Errors that end an exploration run
#[derive(Debug, Error)]
pub enum ExploreError {
    #[error("scan failed: {0}")]
    Scan(#[source] HostError),

    #[error("subscribe failed: {mode} of {uuid}: {source}")]
    Subscribe {
        uuid: Uuid,
        mode: SubscriptionMode,
        #[source]
        source: HostError,
    },

    #[error("unsubscribe failed: {mode} of {uuid}: {source}")]
    Unsubscribe {
        uuid: Uuid,
        mode: SubscriptionMode,
        #[source]
        source: HostError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ExploreError::Subscribe {
            uuid: Uuid::nil(),
            mode: SubscriptionMode::Indication,
            source: HostError::Operation("denied".into()),
        };
        assert_eq!(
            err.to_string(),
            "subscribe failed: indication of 00000000-0000-0000-0000-000000000000: Host operation failed: denied"
        );
        assert_eq!(
            ExploreError::Scan(HostError::NoAdapter).to_string(),
            "scan failed: No Bluetooth adapters found"
        );
    }
}
