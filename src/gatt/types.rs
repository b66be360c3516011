//! GATT type definitions
//!
//! This module defines the data types shared by the host stack and the
//! orchestrator: advertisement snapshots, the discovered profile tree and
//! subscription modes. Characteristic properties use btleplug's
//! `CharPropFlags` directly.

use btleplug::api::CharPropFlags;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Peripheral address as reported by the host stack.
///
/// Usually a 6-byte device address (`aa:bb:cc:dd:ee:ff`). Platforms that
/// hide the radio address hand out an opaque identifier instead, so the
/// address is kept in its normalized textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    /// Build an address from its 6 raw bytes (most significant first)
    pub fn from_bytes(bytes: [u8; 6]) -> Self {
        let text = bytes
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":");
        Self(text)
    }

    /// Wrap a platform identifier that is not a device address
    pub fn opaque(id: impl Into<String>) -> Self {
        Self(id.into().to_lowercase())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    #[error("invalid address '{0}': expected 6 octets")]
    OctetCount(String),

    #[error("invalid address '{address}': bad octet '{octet}'")]
    BadOctet { address: String, octet: String },
}

impl FromStr for Address {
    type Err = AddressParseError;

    /// Parse a `aa:bb:cc:dd:ee:ff` style address (case-insensitive, `-` allowed)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(|c| c == ':' || c == '-').collect();
        if parts.len() != 6 {
            return Err(AddressParseError::OctetCount(s.to_string()));
        }

        let mut bytes = [0u8; 6];
        for (byte, part) in bytes.iter_mut().zip(&parts) {
            *byte = u8::from_str_radix(part, 16).map_err(|_| AddressParseError::BadOctet {
                address: s.to_string(),
                octet: part.to_string(),
            })?;
        }
        Ok(Self::from_bytes(bytes))
    }
}

/// Snapshot of one advertisement event.
///
/// A peripheral may be reported several times during one scan; every
/// report is its own snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub address: Address,

    /// Whether the peripheral accepts connections
    pub connectable: bool,

    /// Advertised local name
    pub local_name: Option<String>,

    /// Advertised service UUIDs
    pub services: Vec<Uuid>,

    /// Raw manufacturer specific data (company ID little-endian, then payload)
    pub manufacturer_data: Vec<u8>,

    /// Signal strength in dBm
    pub rssi: i16,
}

impl Advertisement {
    /// Create a connectable advertisement with no optional fields
    pub fn new(address: Address, rssi: i16) -> Self {
        Self {
            address,
            connectable: true,
            local_name: None,
            services: Vec::new(),
            manufacturer_data: Vec::new(),
            rssi,
        }
    }

    pub fn with_connectable(mut self, connectable: bool) -> Self {
        self.connectable = connectable;
        self
    }

    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }

    pub fn with_services(mut self, services: Vec<Uuid>) -> Self {
        self.services = services;
        self
    }

    pub fn with_manufacturer_data(mut self, data: Vec<u8>) -> Self {
        self.manufacturer_data = data;
        self
    }
}

/// Subscription kind. Indications are acknowledged by the central,
/// notifications are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionMode {
    Notification,
    Indication,
}

impl SubscriptionMode {
    /// Property bit the peripheral must advertise for this mode
    pub fn required_property(self) -> CharPropFlags {
        match self {
            SubscriptionMode::Notification => CharPropFlags::NOTIFY,
            SubscriptionMode::Indication => CharPropFlags::INDICATE,
        }
    }
}

impl fmt::Display for SubscriptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionMode::Notification => f.write_str("notification"),
            SubscriptionMode::Indication => f.write_str("indication"),
        }
    }
}

/// Characteristic descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub uuid: Uuid,

    /// Owning characteristic
    pub characteristic_uuid: Uuid,

    /// Owning service
    pub service_uuid: Uuid,

    /// Attribute handle, if the host stack exposes it
    pub handle: Option<u16>,
}

/// GATT characteristic with its descriptors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characteristic {
    pub uuid: Uuid,

    /// Owning service
    pub service_uuid: Uuid,

    pub properties: CharPropFlags,

    /// Declaration handle
    pub handle: Option<u16>,

    /// Value handle
    pub value_handle: Option<u16>,

    pub descriptors: Vec<Descriptor>,
}

impl Characteristic {
    pub fn supports(&self, mode: SubscriptionMode) -> bool {
        self.properties.contains(mode.required_property())
    }
}

/// GATT service with its characteristics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub uuid: Uuid,
    pub handle: Option<u16>,
    pub characteristics: Vec<Characteristic>,
}

/// Discovered GATT profile of one connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub services: Vec<Service>,
}

impl Profile {
    /// Find the first service with the given UUID
    pub fn find_service(&self, uuid: &Uuid) -> Option<&Service> {
        self.services.iter().find(|s| &s.uuid == uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parse_and_display() {
        let address: Address = "AA:BB:CC:DD:EE:0F".parse().unwrap();
        assert_eq!(address.to_string(), "aa:bb:cc:dd:ee:0f");
        assert_eq!(address, Address::from_bytes([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x0f]));

        let dashed: Address = "aa-bb-cc-dd-ee-0f".parse().unwrap();
        assert_eq!(dashed, address);
    }

    #[test]
    fn test_address_parse_rejects_garbage() {
        assert_eq!(
            "aa:bb:cc".parse::<Address>(),
            Err(AddressParseError::OctetCount("aa:bb:cc".to_string()))
        );
        assert_eq!(
            "aa:bb:cc:dd:ee:zz".parse::<Address>(),
            Err(AddressParseError::BadOctet {
                address: "aa:bb:cc:dd:ee:zz".to_string(),
                octet: "zz".to_string(),
            })
        );
    }

    #[test]
    fn test_subscription_mode_support() {
        let characteristic = Characteristic {
            uuid: Uuid::nil(),
            service_uuid: Uuid::nil(),
            properties: CharPropFlags::INDICATE,
            handle: None,
            value_handle: None,
            descriptors: Vec::new(),
        };
        assert!(!characteristic.supports(SubscriptionMode::Notification));
        assert!(characteristic.supports(SubscriptionMode::Indication));
    }
}
