//! GATT Explorer - Main Application
//!
//! Scans for BLE peripherals, connects to each one and prints the target
//! service's profile. Press Ctrl+C to cut the current wait short.

use anyhow::Context;
use clap::Parser;
use gatt_explorer::{BtleplugHost, CliArgs, Config, ExplorerManager, Interrupt, Reporter};
use log::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; the report owns stdout
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = CliArgs::parse();
    let config = Config::from_args(&args).context("invalid configuration")?;
    info!("Configuration: {:?}", config);

    let host = BtleplugHost::new(&config.device)
        .await
        .context("can't open host stack")?;

    let interrupt = Interrupt::new();
    let _ctrl_c = interrupt.listen_ctrl_c();

    let mut manager = ExplorerManager::new(host, config, Reporter::stdout(), interrupt);
    let summary = manager.run().await?;
    info!(
        "Run finished: {} reports, {} unique, {} connected, {} explored",
        summary.scanned, summary.unique, summary.connected, summary.explored
    );

    Ok(())
}
