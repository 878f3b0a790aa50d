// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proactive renewal timer: one deferred tick shortly before the current
//! access credential expires.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Arms and disarms the single renewal timer. Ticks are delivered on the
/// channel handed out by [`RefreshScheduler::new`]; the consumer decides
/// what a tick means (here: start a refresh cycle).
pub struct RefreshScheduler {
    margin: Duration,
    floor: Duration,
    tick_tx: mpsc::Sender<()>,
    /// Cancellation handle for the pending timer, if one is armed.
    timer: Mutex<Option<CancellationToken>>,
}

impl RefreshScheduler {
    pub fn new(margin: Duration, floor: Duration) -> (Self, mpsc::Receiver<()>) {
        let (tick_tx, tick_rx) = mpsc::channel(1);
        let scheduler = Self { margin, floor, tick_tx, timer: Mutex::new(None) };
        (scheduler, tick_rx)
    }

    pub fn margin(&self) -> Duration {
        self.margin
    }

    /// Delay before renewal should start for a credential expiring at
    /// `expires_at` (epoch seconds). Renewal leads expiry by the margin;
    /// the floor keeps an expired or skewed credential from scheduling at
    /// zero and stampeding the refresh endpoint.
    pub fn renewal_delay(&self, expires_at: u64, now_secs: u64) -> Duration {
        let remaining = Duration::from_secs(expires_at.saturating_sub(now_secs));
        remaining.saturating_sub(self.margin).max(self.floor)
    }

    /// Cancel any pending timer and start a new one for the credential
    /// expiring at `expires_at`.
    pub fn arm(&self, expires_at: u64, now_secs: u64) {
        let delay = self.renewal_delay(expires_at, now_secs);
        let cancel = CancellationToken::new();
        if let Some(prev) = self.timer.lock().replace(cancel.clone()) {
            prev.cancel();
        }

        let tick_tx = self.tick_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    // A tick already pending means a refresh is due anyway;
                    // coalescing is correct.
                    let _ = tick_tx.try_send(());
                }
                _ = cancel.cancelled() => {}
            }
        });

        debug!(delay_secs = delay.as_secs(), expires_at, "renewal timer armed");
    }

    /// Cancel the pending timer if there is one. Safe to call repeatedly.
    pub fn disarm(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.cancel();
            debug!("renewal timer disarmed");
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
