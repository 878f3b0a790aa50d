// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight execution: concurrent demand for one async operation
//! collapses into a single run whose result every caller shares.
//!
//! Waiters are modeled as a shared future (one producer, many consumers)
//! rather than a list of callbacks; the first caller to find the slot
//! empty runs the operation, everyone arriving while it is pending awaits
//! the same future at zero additional cost.

use std::future::Future;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;

pub struct SingleFlight<T: Clone> {
    slot: Mutex<Option<Shared<BoxFuture<'static, T>>>>,
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self { slot: Mutex::new(None) }
    }

    /// Join the in-flight run if one exists, otherwise start `make()`.
    ///
    /// Exactly one caller's `make` runs per cycle. The slot is cleared
    /// once the run completes, so a later call starts a fresh cycle
    /// instead of re-joining a finished one.
    pub async fn run<F, Fut>(&self, make: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let fut = {
            let mut slot = self.slot.lock().await;
            match slot.as_ref() {
                Some(inflight) => inflight.clone(),
                None => {
                    let fut = make().boxed().shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };

        let out = fut.clone().await;

        // Clear only our own cycle; a newer run may already occupy the slot.
        let mut slot = self.slot.lock().await;
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&fut)) {
            *slot = None;
        }
        out
    }

    /// Whether a run is currently in flight.
    pub async fn in_flight(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "singleflight_tests.rs"]
mod tests;
