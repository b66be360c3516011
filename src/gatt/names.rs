//! Human-readable names for well-known GATT UUIDs

use uuid::Uuid;

use crate::gatt::constants::{uuid_from_u16, TARGET_SERVICE_UUID, VENDOR_RESERVED_UUID};

/// SIG assigned numbers the report knows about
const KNOWN_SHORT_UUIDS: &[(u16, &str)] = &[
    // Services
    (0x1800, "Generic Access"),
    (0x1801, "Generic Attribute"),
    (0x1802, "Immediate Alert"),
    (0x1803, "Link Loss"),
    (0x1804, "Tx Power"),
    (0x1805, "Current Time Service"),
    (0x180a, "Device Information"),
    (0x180d, "Heart Rate"),
    (0x180f, "Battery Service"),
    (0x1812, "Human Interface Device"),
    (0x181a, "Environmental Sensing"),
    // Characteristics
    (0x2a00, "Device Name"),
    (0x2a01, "Appearance"),
    (0x2a02, "Peripheral Privacy Flag"),
    (0x2a03, "Reconnection Address"),
    (0x2a04, "Peripheral Preferred Connection Parameters"),
    (0x2a05, "Service Changed"),
    (0x2a06, "Alert Level"),
    (0x2a07, "Tx Power Level"),
    (0x2a19, "Battery Level"),
    (0x2a23, "System ID"),
    (0x2a24, "Model Number String"),
    (0x2a25, "Serial Number String"),
    (0x2a26, "Firmware Revision String"),
    (0x2a27, "Hardware Revision String"),
    (0x2a28, "Software Revision String"),
    (0x2a29, "Manufacturer Name String"),
    (0x2a2b, "Current Time"),
    (0x2a37, "Heart Rate Measurement"),
    (0x2a38, "Body Sensor Location"),
    (0x2a4d, "Report"),
    (0x2a50, "PnP ID"),
    (0x2a6e, "Temperature"),
    (0x2a6f, "Humidity"),
    (0x2aa6, "Central Address Resolution"),
    // Descriptors
    (0x2900, "Characteristic Extended Properties"),
    (0x2901, "Characteristic User Description"),
    (0x2902, "Client Characteristic Configuration"),
    (0x2903, "Server Characteristic Configuration"),
    (0x2904, "Characteristic Presentation Format"),
    (0x2905, "Characteristic Aggregate Format"),
    (0x2908, "Report Reference"),
];

/// Look up the name of a UUID, or `""` when it is not a known one
pub fn name(uuid: &Uuid) -> &'static str {
    if *uuid == TARGET_SERVICE_UUID {
        return "Target Service";
    }
    if *uuid == VENDOR_RESERVED_UUID {
        return "Vendor Reserved";
    }

    KNOWN_SHORT_UUIDS
        .iter()
        .find(|(short, _)| uuid_from_u16(*short) == *uuid)
        .map(|(_, name)| *name)
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_names() {
        assert_eq!(name(&uuid_from_u16(0x2902)), "Client Characteristic Configuration");
        assert_eq!(name(&uuid_from_u16(0x2a05)), "Service Changed");
        assert_eq!(name(&uuid_from_u16(0x180f)), "Battery Service");
    }

    #[test]
    fn test_unknown_name_is_empty() {
        assert_eq!(name(&uuid_from_u16(0xfff0)), "");
        assert_eq!(name(&Uuid::from_u128(0x1234)), "");
    }
}
