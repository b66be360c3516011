//! Advertisement collector
//!
//! Runs the scan window and keeps every connectable advertisement, in
//! arrival order. Repeated reports of one address are all kept; they are
//! deduplicated when connecting.

use futures::stream::StreamExt;
use log::{info, trace, warn};
use std::time::Duration;

use crate::central::interrupt::{deadline, Interrupt};
use crate::central::ExploreError;
use crate::gatt::Advertisement;
use crate::host::HostStack;

/// How the scan window ended. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The scan duration elapsed
    DeadlineExceeded,
    /// Interrupted
    Canceled,
    /// The host stack closed its advertisement stream
    Exhausted,
}

/// Collects advertisements during one scan window
pub struct Collector<'a, H: HostStack> {
    host: &'a H,
    interrupt: &'a Interrupt,
}

impl<'a, H: HostStack> Collector<'a, H> {
    pub fn new(host: &'a H, interrupt: &'a Interrupt) -> Self {
        Self { host, interrupt }
    }

    /// Scan for `duration` (zero = until interrupted) and append each
    /// connectable advertisement to `peripherals`
    pub async fn scan(
        &self,
        duration: Duration,
        allow_duplicates: bool,
        peripherals: &mut Vec<Advertisement>,
    ) -> Result<ScanOutcome, ExploreError> {
        let token = self.interrupt.scope();
        let mut reports = self.host.scan(allow_duplicates).await.map_err(ExploreError::Scan)?;

        let window = deadline(duration);
        tokio::pin!(window);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break ScanOutcome::Canceled,
                _ = &mut window => break ScanOutcome::DeadlineExceeded,
                report = reports.next() => match report {
                    Some(advertisement) if advertisement.connectable => {
                        trace!("Collected {} (RSSI {})", advertisement.address, advertisement.rssi);
                        peripherals.push(advertisement);
                    }
                    Some(advertisement) => {
                        trace!("Dropping non-connectable {}", advertisement.address);
                    }
                    None => break ScanOutcome::Exhausted,
                },
            }
        };

        if let Err(e) = self.host.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }

        info!("Scan finished ({:?}), {} reports collected", outcome, peripherals.len());
        Ok(outcome)
    }
}
