//! GATT constants
//!
//! This module contains the fixed identifiers the explorer works with:
//! - The target service it looks for on every peripheral
//! - The characteristics it never subscribes to
//! - Default timing values

use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Service & Characteristic UUIDs
// ============================================================================

/// Service the explorer reports on. Peripherals without it are skipped.
pub const TARGET_SERVICE_UUID: Uuid = Uuid::from_u128(0xb82ab3fc_1595_4f6a_80f0_fe094cc218f9);

/// Bluetooth SIG base UUID (`0000xxxx-0000-1000-8000-00805f9b34fb`)
pub const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Service Changed characteristic (0x2A05)
pub const SERVICE_CHANGED_UUID: Uuid = Uuid::from_u128(0x00002a05_0000_1000_8000_00805f9b34fb);

/// Vendor-reserved characteristic found in Apple's continuity service.
/// Property 0x18 (write + notify), guarded by a CCCD that refuses changes.
pub const VENDOR_RESERVED_UUID: Uuid = Uuid::from_u128(0x8667556c_9a37_4c91_84ed_54ee27d90049);

/// Characteristics that are never subscribed to, whatever their properties.
pub const SUBSCRIPTION_DENYLIST: [Uuid; 2] = [SERVICE_CHANGED_UUID, VENDOR_RESERVED_UUID];

/// Check a characteristic against the subscription denylist
pub fn is_subscription_denied(uuid: &Uuid) -> bool {
    SUBSCRIPTION_DENYLIST.contains(uuid)
}

/// Build a full UUID from a 16-bit SIG assigned number
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

// ============================================================================
// Timing Constants
// ============================================================================

/// Default scan window
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(5);

/// Default per-device connect window
pub const DEFAULT_CONNECT_DURATION: Duration = Duration::from_secs(1);

/// Subscriptions are disabled unless a window is given
pub const DEFAULT_SUBSCRIBE_DURATION: Duration = Duration::ZERO;

/// How long to wait for a disconnect after a failed cancel request
pub const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Host stack backend chosen when none is named
pub const DEFAULT_DEVICE: &str = "default";
