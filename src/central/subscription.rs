//! Time-bounded subscription sessions
//!
//! A session subscribes to one characteristic in one mode, prints every
//! pushed value for the window, then unsubscribes. Unsubscribing happens
//! even when nothing arrived or the window was interrupted.

use futures::future::pending;
use log::{debug, info};
use std::time::Duration;

use crate::central::interrupt::{bounded, Interrupt, WaitOutcome};
use crate::central::ExploreError;
use crate::gatt::format::{format_duration, hex_spaced, quote_bytes};
use crate::gatt::{Characteristic, SubscriptionMode};
use crate::host::{Connection, NotificationHandler};
use crate::report::Reporter;

/// How the subscription window ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    WindowElapsed,
    Canceled,
}

/// One subscription on one characteristic
pub struct SubscriptionSession<'a, C: Connection> {
    connection: &'a C,
    characteristic: &'a Characteristic,
    mode: SubscriptionMode,
}

impl<'a, C: Connection> SubscriptionSession<'a, C> {
    pub fn new(connection: &'a C, characteristic: &'a Characteristic, mode: SubscriptionMode) -> Self {
        Self {
            connection,
            characteristic,
            mode,
        }
    }

    /// Subscribe, collect values for `window`, unsubscribe.
    ///
    /// Subscribe and unsubscribe failures are returned as errors; the
    /// caller treats them as fatal.
    pub async fn run(self, window: Duration, reporter: &Reporter, interrupt: &Interrupt) -> Result<SessionEnd, ExploreError> {
        let uuid = self.characteristic.uuid;
        let mode = self.mode;

        reporter.blank();
        match mode {
            SubscriptionMode::Notification => {
                reporter.line(format_args!("-- Subscribe to notification for {} --", format_duration(window)))
            }
            SubscriptionMode::Indication => {
                reporter.line(format_args!("-- Subscribe to indication of {} --", format_duration(window)))
            }
        }

        let label = match mode {
            SubscriptionMode::Notification => "Notified",
            SubscriptionMode::Indication => "Indicated",
        };
        let sink = reporter.clone();
        let handler: NotificationHandler = Box::new(move |value: &[u8]| {
            sink.line(format_args!("{}: {} [ {} ]", label, quote_bytes(value), hex_spaced(value)));
        });

        self.connection
            .subscribe(self.characteristic, mode, handler)
            .await
            .map_err(|source| ExploreError::Subscribe { uuid, mode, source })?;
        info!("Subscribed to {} of {} for {}", mode, uuid, format_duration(window));

        let token = interrupt.scope();
        let end = match bounded(window, &token, pending::<()>()).await {
            WaitOutcome::Canceled => SessionEnd::Canceled,
            WaitOutcome::DeadlineExceeded | WaitOutcome::Completed(()) => SessionEnd::WindowElapsed,
        };
        debug!("Subscription window on {} ended: {:?}", uuid, end);

        self.connection
            .unsubscribe(self.characteristic, mode)
            .await
            .map_err(|source| ExploreError::Unsubscribe { uuid, mode, source })?;
        reporter.line(format_args!("-- Unsubscribe to {} --", mode));

        Ok(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatt::{Address, Advertisement, CharPropFlags, Profile, Service, TARGET_SERVICE_UUID};
    use crate::host::{HostCall, HostStack, MockConnection, MockDevice, MockHost};
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    const CHAR_UUID: Uuid = Uuid::from_u128(0x11111111_2222_3333_4444_555555555555);

    fn characteristic() -> Characteristic {
        Characteristic {
            uuid: CHAR_UUID,
            service_uuid: TARGET_SERVICE_UUID,
            properties: CharPropFlags::NOTIFY | CharPropFlags::INDICATE,
            handle: Some(0x10),
            value_handle: Some(0x11),
            descriptors: Vec::new(),
        }
    }

    async fn connect(device: MockDevice) -> (MockHost, MockConnection) {
        let address = Address::from_bytes([1, 2, 3, 4, 5, 6]);
        let device = MockDevice {
            profile: Some(Profile {
                services: vec![Service {
                    uuid: TARGET_SERVICE_UUID,
                    handle: Some(0x0f),
                    characteristics: vec![characteristic()],
                }],
            }),
            ..device
        };
        let host = MockHost::new()
            .advertise(Advertisement::new(address.clone(), -40))
            .device(address, device);
        let connection = host.connect(&|_: &Advertisement| true, Duration::ZERO, &CancellationToken::new()).await.unwrap();
        (host, connection)
    }

    #[tokio::test]
    async fn test_session_prints_values_and_unsubscribes() {
        let (host, connection) = connect(MockDevice::default().push(b"hi").push(&[0x00, 0xff])).await;
        let (reporter, buffer) = Reporter::buffer();
        let characteristic = characteristic();

        let end = SubscriptionSession::new(&connection, &characteristic, SubscriptionMode::Notification)
            .run(Duration::from_millis(10), &reporter, &Interrupt::new())
            .await
            .unwrap();

        assert_eq!(end, SessionEnd::WindowElapsed);
        assert_eq!(
            buffer.contents(),
            "\n-- Subscribe to notification for 10ms --\n\
             Notified: \"hi\" [ 68 69 ]\n\
             Notified: \"\\x00\\xff\" [ 00 FF ]\n\
             -- Unsubscribe to notification --\n"
        );

        let calls = host.calls();
        let subscribe = calls
            .iter()
            .position(|c| *c == HostCall::Subscribe(CHAR_UUID, SubscriptionMode::Notification));
        let unsubscribe = calls
            .iter()
            .position(|c| *c == HostCall::Unsubscribe(CHAR_UUID, SubscriptionMode::Notification));
        assert!(subscribe.unwrap() < unsubscribe.unwrap());
    }

    #[tokio::test]
    async fn test_unsubscribe_without_values() {
        let (host, connection) = connect(MockDevice::default()).await;
        let (reporter, buffer) = Reporter::buffer();
        let characteristic = characteristic();

        SubscriptionSession::new(&connection, &characteristic, SubscriptionMode::Indication)
            .run(Duration::from_millis(10), &reporter, &Interrupt::new())
            .await
            .unwrap();

        assert!(buffer.contents().contains("-- Unsubscribe to indication --"));
        assert!(host
            .calls()
            .contains(&HostCall::Unsubscribe(CHAR_UUID, SubscriptionMode::Indication)));
    }

    #[tokio::test]
    async fn test_interrupt_ends_window_and_still_unsubscribes() {
        let (host, connection) = connect(MockDevice::default()).await;
        let (reporter, buffer) = Reporter::buffer();
        let characteristic = characteristic();
        let interrupt = Interrupt::new();
        let trigger = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.trigger();
        });

        let end = SubscriptionSession::new(&connection, &characteristic, SubscriptionMode::Notification)
            .run(Duration::from_secs(60), &reporter, &interrupt)
            .await
            .unwrap();

        assert_eq!(end, SessionEnd::Canceled);
        assert!(buffer.contents().ends_with("-- Unsubscribe to notification --\n"));
        assert_eq!(
            host.calls().last(),
            Some(&HostCall::Unsubscribe(CHAR_UUID, SubscriptionMode::Notification))
        );
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_an_error() {
        let (host, connection) = connect(MockDevice::default().fail_subscribe()).await;
        let (reporter, _buffer) = Reporter::buffer();
        let characteristic = characteristic();

        let result = SubscriptionSession::new(&connection, &characteristic, SubscriptionMode::Notification)
            .run(Duration::from_millis(10), &reporter, &Interrupt::new())
            .await;

        assert!(matches!(result, Err(ExploreError::Subscribe { .. })));
        assert!(!host
            .calls()
            .iter()
            .any(|c| matches!(c, HostCall::Unsubscribe(..))));
    }

    #[tokio::test]
    async fn test_unsubscribe_failure_is_an_error() {
        let (_host, connection) = connect(MockDevice::default().fail_unsubscribe()).await;
        let (reporter, _buffer) = Reporter::buffer();
        let characteristic = characteristic();

        let result = SubscriptionSession::new(&connection, &characteristic, SubscriptionMode::Notification)
            .run(Duration::from_millis(10), &reporter, &Interrupt::new())
            .await;

        assert!(matches!(result, Err(ExploreError::Unsubscribe { .. })));
    }
}
