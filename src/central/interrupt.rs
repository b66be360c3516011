//! Interrupt handling and bounded waits
//!
//! Every wait the explorer performs (scan window, connect attempt,
//! subscription window) ends on whichever comes first: its deadline, its
//! own completion, or an interrupt. An interrupt only cancels the wait in
//! progress, so the run carries on with the next step.

use log::{info, warn};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Source of interrupts (Ctrl+C in production, manual in tests)
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    /// Token of the wait currently in progress
    current: Arc<Mutex<CancellationToken>>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward every Ctrl+C to the wait in progress
    pub fn listen_ctrl_c(&self) -> JoinHandle<()> {
        let interrupt = self.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                    break;
                }
                info!("Interrupt received");
                interrupt.trigger();
            }
        })
    }

    /// Begin a new bounded wait and get its cancellation token
    pub fn scope(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = token.clone();
        token
    }

    /// Cancel the wait in progress
    pub fn trigger(&self) {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).cancel();
    }
}

/// How a bounded wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    Completed(T),
    DeadlineExceeded,
    Canceled,
}

/// Sleep for `duration`, or forever when it is zero
pub async fn deadline(duration: Duration) {
    if duration.is_zero() {
        futures::future::pending::<()>().await;
    } else {
        tokio::time::sleep(duration).await;
    }
}

/// Run `fut` until it completes, `duration` elapses (zero = no limit) or
/// `token` is cancelled
pub async fn bounded<F: Future>(duration: Duration, token: &CancellationToken, fut: F) -> WaitOutcome<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => WaitOutcome::Canceled,
        output = fut => WaitOutcome::Completed(output),
        _ = deadline(duration) => WaitOutcome::DeadlineExceeded,
    }
}
