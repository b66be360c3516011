//! Connection manager
//!
//! Runs one exploration pass: scan, then connect to every collected
//! peripheral one at a time, explore it and tear the link down before the
//! next one. Per-device failures are logged and skipped; only subscription
//! failures end the run.

use log::{debug, info, trace, warn};
use tokio::sync::oneshot;

use crate::central::{
    bounded, Collector, DeviceRegistry, Exploration, ExploreError, Interrupt, ProfileExplorer, ScanOutcome,
    WaitOutcome,
};
use crate::config::Config;
use crate::gatt::format::format_duration;
use crate::gatt::{Advertisement, DISCONNECT_GRACE};
use crate::host::{Connection, HostStack};
use crate::report::Reporter;

/// What happened to one peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOutcome {
    /// Connect failed, timed out or was interrupted
    Unreachable,
    /// Connected, but profile discovery failed
    DiscoveryFailed,
    /// Connected; the target service is absent
    NotTargeted,
    Explored,
}

/// Counters for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Connectable advertisement reports collected, duplicates included
    pub scanned: usize,
    /// Distinct addresses among them
    pub unique: usize,
    pub connected: usize,
    pub explored: usize,
    pub scan: ScanOutcome,
}

/// Drives the scan and the sequential per-device exploration
pub struct ExplorerManager<H: HostStack> {
    host: H,
    config: Config,
    reporter: Reporter,
    interrupt: Interrupt,
    registry: DeviceRegistry,
}

impl<H: HostStack> ExplorerManager<H> {
    pub fn new(host: H, config: Config, reporter: Reporter, interrupt: Interrupt) -> Self {
        Self {
            host,
            config,
            reporter,
            interrupt,
            registry: DeviceRegistry::new(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Addresses visited so far
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Scan, then explore every collected peripheral
    pub async fn run(&mut self) -> Result<RunSummary, ExploreError> {
        let mut peripherals = Vec::new();

        self.reporter
            .line(format_args!("Scanning for {}...", format_duration(self.config.scan_duration)));
        let scan = Collector::new(&self.host, &self.interrupt)
            .scan(self.config.scan_duration, self.config.allow_duplicates, &mut peripherals)
            .await?;
        match scan {
            ScanOutcome::DeadlineExceeded | ScanOutcome::Exhausted => {
                self.reporter.line(format_args!("Scanned {} devices", peripherals.len()))
            }
            ScanOutcome::Canceled => self.reporter.line(format_args!("canceled")),
        }

        self.reporter.line(format_args!("Connecting to devices..."));
        let mut summary = RunSummary {
            scanned: peripherals.len(),
            unique: 0,
            connected: 0,
            explored: 0,
            scan,
        };
        self.connect_all(&peripherals, &mut summary).await?;
        summary.unique = self.registry.len();

        self.reporter.line(format_args!("Done"));
        Ok(summary)
    }

    /// Visit each address once, in collection order
    async fn connect_all(&mut self, peripherals: &[Advertisement], summary: &mut RunSummary) -> Result<(), ExploreError> {
        for advertisement in peripherals {
            if !self.registry.visit(&advertisement.address) {
                trace!("Skipping already visited {}", advertisement.address);
                continue;
            }

            match self.connect(advertisement).await? {
                DeviceOutcome::Unreachable => {}
                DeviceOutcome::DiscoveryFailed | DeviceOutcome::NotTargeted => summary.connected += 1,
                DeviceOutcome::Explored => {
                    summary.connected += 1;
                    summary.explored += 1;
                }
            }
        }
        Ok(())
    }

    /// Connect to one peripheral, explore it and disconnect.
    ///
    /// Returns only after the host stack confirmed the disconnect, so at
    /// most one connection is open at any time.
    pub async fn connect(&self, advertisement: &Advertisement) -> Result<DeviceOutcome, ExploreError> {
        let target = advertisement.address.clone();
        let filter = move |candidate: &Advertisement| candidate.address == target;

        info!("Connecting to {}", advertisement.address);
        let token = self.interrupt.scope();
        let connection = match self
            .host
            .connect(&filter, self.config.connect_duration, &token)
            .await
        {
            Ok(connection) => connection,
            Err(e) => {
                debug!("Failed to connect to {}: {}", advertisement.address, e);
                return Ok(DeviceOutcome::Unreachable);
            }
        };
        info!("✓ Connected to {}", connection.address());

        // Passive watcher: only signals that the link is gone
        let event = connection.disconnected();
        let (done_tx, done_rx) = oneshot::channel();
        let watcher = tokio::spawn(async move {
            event.wait().await;
            let _ = done_tx.send(());
        });

        let result = self.explore(&connection, advertisement).await;

        let mut done_rx = done_rx;
        match connection.cancel_connection().await {
            Ok(()) => {
                let _ = (&mut done_rx).await;
            }
            Err(e) => {
                warn!("Failed to disconnect {}: {}", connection.address(), e);
                let token = self.interrupt.scope();
                if let WaitOutcome::DeadlineExceeded | WaitOutcome::Canceled =
                    bounded(DISCONNECT_GRACE, &token, &mut done_rx).await
                {
                    warn!("No disconnect confirmation from {}", connection.address());
                    watcher.abort();
                }
            }
        }
        if let Err(e) = watcher.await {
            if !e.is_cancelled() {
                warn!("Disconnect watcher for {} failed: {}", advertisement.address, e);
            }
        }
        info!("Disconnected from {}", advertisement.address);

        result
    }

    async fn explore(
        &self,
        connection: &H::Connection,
        advertisement: &Advertisement,
    ) -> Result<DeviceOutcome, ExploreError> {
        let profile = match connection.discover_profile().await {
            Ok(profile) => profile,
            Err(e) => {
                debug!("Failed to discover profile of {}: {}", advertisement.address, e);
                return Ok(DeviceOutcome::DiscoveryFailed);
            }
        };

        let explorer = ProfileExplorer::new(
            &self.reporter,
            &self.interrupt,
            self.config.target_service,
            self.config.subscribe_duration,
        );
        match explorer.explore(connection, &profile, advertisement).await? {
            Exploration::NotTargeted => Ok(DeviceOutcome::NotTargeted),
            Exploration::Explored => {
                info!("✓ Explored {}", advertisement.address);
                Ok(DeviceOutcome::Explored)
            }
        }
    }
}
