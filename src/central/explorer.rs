//! Profile explorer
//!
//! Given a live connection and its discovered profile, reports the target
//! service: peripheral summary, characteristics with their values,
//! descriptors, and optionally a subscription window per characteristic.

use log::debug;
use std::time::Duration;
use uuid::Uuid;

use crate::central::interrupt::Interrupt;
use crate::central::subscription::SubscriptionSession;
use crate::central::ExploreError;
use crate::gatt::format::{handle_string, hex_lower, hex_upper, prop_string, quote_bytes, uuid_string};
use crate::gatt::names::name;
use crate::gatt::{is_subscription_denied, Advertisement, CharPropFlags, Characteristic, Profile, SubscriptionMode};
use crate::host::Connection;
use crate::report::Reporter;

/// Result of exploring one peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exploration {
    /// The profile lacks the target service; nothing was reported
    NotTargeted,
    Explored,
}

/// Reports the target service of connected peripherals
pub struct ProfileExplorer<'a> {
    reporter: &'a Reporter,
    interrupt: &'a Interrupt,
    target_service: Uuid,
    /// Zero disables subscriptions
    subscribe_window: Duration,
}

impl<'a> ProfileExplorer<'a> {
    pub fn new(reporter: &'a Reporter, interrupt: &'a Interrupt, target_service: Uuid, subscribe_window: Duration) -> Self {
        Self {
            reporter,
            interrupt,
            target_service,
            subscribe_window,
        }
    }

    /// Explore one peripheral.
    ///
    /// Read failures only drop the affected value line. Subscription
    /// failures are returned as errors.
    pub async fn explore<C: Connection>(
        &self,
        connection: &C,
        profile: &Profile,
        advertisement: &Advertisement,
    ) -> Result<Exploration, ExploreError> {
        if profile.find_service(&self.target_service).is_none() {
            debug!("{} has no service {}", advertisement.address, self.target_service);
            return Ok(Exploration::NotTargeted);
        }

        self.show_device(advertisement);

        for service in profile.services.iter().filter(|s| s.uuid == self.target_service) {
            self.reporter.line(format_args!(
                "    Service: {} {}, Handle ({})",
                uuid_string(&service.uuid),
                name(&service.uuid),
                handle_string(service.handle)
            ));

            for characteristic in &service.characteristics {
                self.explore_characteristic(connection, characteristic).await?;
            }
            self.reporter.blank();
        }

        Ok(Exploration::Explored)
    }

    /// Print the advertisement summary of a connectable peripheral
    fn show_device(&self, advertisement: &Advertisement) {
        if !advertisement.connectable {
            return;
        }

        self.reporter
            .line(format_args!("[{}] RSSI {:3}:", advertisement.address, advertisement.rssi));

        if let Some(local_name) = advertisement.local_name.as_deref().filter(|n| !n.is_empty()) {
            self.reporter.line(format_args!("Name: {}", local_name));
        }
        if !advertisement.services.is_empty() {
            let services: Vec<String> = advertisement.services.iter().map(uuid_string).collect();
            self.reporter.line(format_args!("Svcs: [{}]", services.join(" ")));
        }
        if !advertisement.manufacturer_data.is_empty() {
            self.reporter
                .text(format_args!("Manu: {}", hex_upper(&advertisement.manufacturer_data)));
        }
        self.reporter.blank();
    }

    async fn explore_characteristic<C: Connection>(
        &self,
        connection: &C,
        characteristic: &Characteristic,
    ) -> Result<(), ExploreError> {
        self.reporter.line(format_args!(
            "      Characteristic: {} {}, Property: 0x{:02X} ({}), Handle({}), VHandle({})",
            uuid_string(&characteristic.uuid),
            name(&characteristic.uuid),
            characteristic.properties.bits(),
            prop_string(characteristic.properties),
            handle_string(characteristic.handle),
            handle_string(characteristic.value_handle)
        ));

        // A failed read drops only the value line; descriptors and
        // subscriptions of the characteristic still run
        if characteristic.properties.contains(CharPropFlags::READ) {
            match connection.read_long_characteristic(characteristic).await {
                Ok(value) => self.show_value(&value),
                Err(e) => debug!("Failed to read characteristic {}: {}", characteristic.uuid, e),
            }
        }

        for descriptor in &characteristic.descriptors {
            self.reporter.line(format_args!(
                "        Descriptor: {} {}, Handle({})",
                uuid_string(&descriptor.uuid),
                name(&descriptor.uuid),
                handle_string(descriptor.handle).to_lowercase()
            ));
            match connection.read_descriptor(descriptor).await {
                Ok(value) => self.show_value(&value),
                Err(e) => debug!("Failed to read descriptor {}: {}", descriptor.uuid, e),
            }
        }

        if self.subscribe_window.is_zero() {
            return Ok(());
        }
        if is_subscription_denied(&characteristic.uuid) {
            debug!("Not subscribing to {}", characteristic.uuid);
            return Ok(());
        }

        // Notify first, then indicate, one after the other
        for mode in [SubscriptionMode::Notification, SubscriptionMode::Indication] {
            if characteristic.supports(mode) {
                SubscriptionSession::new(connection, characteristic, mode)
                    .run(self.subscribe_window, self.reporter, self.interrupt)
                    .await?;
            }
        }

        Ok(())
    }

    fn show_value(&self, value: &[u8]) {
        self.reporter
            .line(format_args!("        Value         {} | {}", hex_lower(value), quote_bytes(value)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatt::{uuid_from_u16, Address, Descriptor, Service, SERVICE_CHANGED_UUID, TARGET_SERVICE_UUID};
    use crate::host::{HostCall, HostStack, MockConnection, MockDevice, MockHost};
    use tokio_util::sync::CancellationToken;

    const DATA_UUID: Uuid = Uuid::from_u128(0xb82a0001_1595_4f6a_80f0_fe094cc218f9);
    const CCCD: Uuid = uuid_from_u16(0x2902);

    fn address() -> Address {
        Address::from_bytes([0xc0, 0xff, 0xee, 0x00, 0x00, 0x01])
    }

    fn characteristic(uuid: Uuid, properties: CharPropFlags, descriptors: Vec<Descriptor>) -> Characteristic {
        Characteristic {
            uuid,
            service_uuid: TARGET_SERVICE_UUID,
            properties,
            handle: Some(0x20),
            value_handle: Some(0x21),
            descriptors,
        }
    }

    fn profile(characteristics: Vec<Characteristic>) -> Profile {
        Profile {
            services: vec![
                Service {
                    uuid: uuid_from_u16(0x1800),
                    handle: Some(0x01),
                    characteristics: Vec::new(),
                },
                Service {
                    uuid: TARGET_SERVICE_UUID,
                    handle: Some(0x1f),
                    characteristics,
                },
            ],
        }
    }

    async fn open(device: MockDevice) -> (MockHost, MockConnection, Advertisement) {
        let advertisement = Advertisement::new(address(), -58).with_local_name("sensor");
        let host = MockHost::new().advertise(advertisement.clone()).device(address(), device);
        let connection = host.connect(&|_: &Advertisement| true, Duration::ZERO, &CancellationToken::new()).await.unwrap();
        (host, connection, advertisement)
    }

    #[tokio::test]
    async fn test_profile_without_target_reports_nothing() {
        let other = Profile {
            services: vec![Service {
                uuid: uuid_from_u16(0x180f),
                handle: Some(0x01),
                characteristics: Vec::new(),
            }],
        };
        let (_host, connection, advertisement) = open(MockDevice::with_profile(other.clone())).await;
        let (reporter, buffer) = Reporter::buffer();
        let interrupt = Interrupt::new();

        let result = ProfileExplorer::new(&reporter, &interrupt, TARGET_SERVICE_UUID, Duration::ZERO)
            .explore(&connection, &other, &advertisement)
            .await
            .unwrap();

        assert_eq!(result, Exploration::NotTargeted);
        assert_eq!(buffer.contents(), "");
    }

    #[tokio::test]
    async fn test_readable_characteristic_report() {
        let profile = profile(vec![characteristic(DATA_UUID, CharPropFlags::READ, Vec::new())]);
        let device = MockDevice::with_profile(profile.clone()).value(DATA_UUID, b"ok");
        let (_host, connection, advertisement) = open(device).await;
        let (reporter, buffer) = Reporter::buffer();
        let interrupt = Interrupt::new();

        ProfileExplorer::new(&reporter, &interrupt, TARGET_SERVICE_UUID, Duration::ZERO)
            .explore(&connection, &profile, &advertisement)
            .await
            .unwrap();

        assert_eq!(
            buffer.contents(),
            "[c0:ff:ee:00:00:01] RSSI -58:\n\
             Name: sensor\n\
             \n\
             \x20   Service: b82ab3fc15954f6a80f0fe094cc218f9 Target Service, Handle (0x1F)\n\
             \x20     Characteristic: b82a000115954f6a80f0fe094cc218f9 , Property: 0x02 (R), Handle(0x20), VHandle(0x21)\n\
             \x20       Value         6f6b | \"ok\"\n\
             \n"
        );
    }

    #[tokio::test]
    async fn test_read_failures_skip_value_lines_only() {
        let descriptor = Descriptor {
            uuid: CCCD,
            characteristic_uuid: DATA_UUID,
            service_uuid: TARGET_SERVICE_UUID,
            handle: Some(0x2a),
        };
        let profile = profile(vec![characteristic(DATA_UUID, CharPropFlags::READ, vec![descriptor])]);
        // No values scripted: both reads fail
        let (host, connection, advertisement) = open(MockDevice::with_profile(profile.clone())).await;
        let (reporter, buffer) = Reporter::buffer();
        let interrupt = Interrupt::new();

        let result = ProfileExplorer::new(&reporter, &interrupt, TARGET_SERVICE_UUID, Duration::ZERO)
            .explore(&connection, &profile, &advertisement)
            .await
            .unwrap();

        assert_eq!(result, Exploration::Explored);
        let output = buffer.contents();
        assert!(output.contains("Characteristic: b82a000115954f6a80f0fe094cc218f9"));
        assert!(output.contains("        Descriptor: 2902 Client Characteristic Configuration, Handle(0x2a)\n"));
        assert!(!output.contains("Value"));
        assert!(host.calls().contains(&HostCall::ReadDescriptor(CCCD)));
    }

    #[tokio::test]
    async fn test_descriptor_value_line() {
        let descriptor = Descriptor {
            uuid: CCCD,
            characteristic_uuid: DATA_UUID,
            service_uuid: TARGET_SERVICE_UUID,
            handle: Some(0x2b),
        };
        let profile = profile(vec![characteristic(DATA_UUID, CharPropFlags::NOTIFY, vec![descriptor])]);
        let device = MockDevice::with_profile(profile.clone()).descriptor_value(DATA_UUID, CCCD, &[0x01, 0x00]);
        let (_host, connection, advertisement) = open(device).await;
        let (reporter, buffer) = Reporter::buffer();
        let interrupt = Interrupt::new();

        ProfileExplorer::new(&reporter, &interrupt, TARGET_SERVICE_UUID, Duration::ZERO)
            .explore(&connection, &profile, &advertisement)
            .await
            .unwrap();

        assert!(buffer.contents().contains(
            "        Descriptor: 2902 Client Characteristic Configuration, Handle(0x2b)\n\
             \x20       Value         0100 | \"\\x01\\x00\"\n"
        ));
    }

    #[tokio::test]
    async fn test_unreadable_property_is_not_read() {
        let profile = profile(vec![characteristic(DATA_UUID, CharPropFlags::WRITE, Vec::new())]);
        let device = MockDevice::with_profile(profile.clone()).value(DATA_UUID, b"secret");
        let (host, connection, advertisement) = open(device).await;
        let (reporter, buffer) = Reporter::buffer();
        let interrupt = Interrupt::new();

        ProfileExplorer::new(&reporter, &interrupt, TARGET_SERVICE_UUID, Duration::ZERO)
            .explore(&connection, &profile, &advertisement)
            .await
            .unwrap();

        assert!(!buffer.contents().contains("secret"));
        assert!(!host.calls().contains(&HostCall::ReadCharacteristic(DATA_UUID)));
    }

    #[tokio::test]
    async fn test_subscriptions_notify_then_indicate_and_denylist() {
        let profile = profile(vec![
            characteristic(SERVICE_CHANGED_UUID, CharPropFlags::INDICATE, Vec::new()),
            characteristic(DATA_UUID, CharPropFlags::NOTIFY | CharPropFlags::INDICATE, Vec::new()),
        ]);
        let (host, connection, advertisement) = open(MockDevice::with_profile(profile.clone())).await;
        let (reporter, buffer) = Reporter::buffer();
        let interrupt = Interrupt::new();

        ProfileExplorer::new(&reporter, &interrupt, TARGET_SERVICE_UUID, Duration::from_millis(5))
            .explore(&connection, &profile, &advertisement)
            .await
            .unwrap();

        let sessions: Vec<HostCall> = host
            .calls()
            .into_iter()
            .filter(|c| matches!(c, HostCall::Subscribe(..) | HostCall::Unsubscribe(..)))
            .collect();
        assert_eq!(
            sessions,
            vec![
                HostCall::Subscribe(DATA_UUID, SubscriptionMode::Notification),
                HostCall::Unsubscribe(DATA_UUID, SubscriptionMode::Notification),
                HostCall::Subscribe(DATA_UUID, SubscriptionMode::Indication),
                HostCall::Unsubscribe(DATA_UUID, SubscriptionMode::Indication),
            ]
        );
        assert!(buffer.contents().contains("-- Subscribe to indication of 5ms --"));
    }

    #[tokio::test]
    async fn test_summary_shows_services_and_manufacturer_data() {
        let profile = profile(Vec::new());
        let advertisement = Advertisement::new(address(), -7)
            .with_services(vec![uuid_from_u16(0x180f)])
            .with_manufacturer_data(vec![0x4c, 0x00, 0x02]);
        let host = MockHost::new()
            .advertise(advertisement.clone())
            .device(address(), MockDevice::with_profile(profile.clone()));
        let connection = host.connect(&|_: &Advertisement| true, Duration::ZERO, &CancellationToken::new()).await.unwrap();
        let (reporter, buffer) = Reporter::buffer();
        let interrupt = Interrupt::new();

        ProfileExplorer::new(&reporter, &interrupt, TARGET_SERVICE_UUID, Duration::ZERO)
            .explore(&connection, &profile, &advertisement)
            .await
            .unwrap();

        assert!(buffer
            .contents()
            .starts_with("[c0:ff:ee:00:00:01] RSSI  -7:\nSvcs: [180f]\nManu: 4C0002\n    Service:"));
    }
}
