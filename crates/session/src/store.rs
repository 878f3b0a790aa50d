// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable storage for the access/refresh pair, shared across processes.
//!
//! Every mutation is observable by the *other* processes sharing the same
//! store; a process never sees notifications for its own writes (each
//! handle diffs against the last contents it knows, so echoes of local
//! writes are dropped instead of triggering a spurious rearm loop).

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::TokenKind;

/// A change to the shared pair made by another process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// Another process wrote a new pair.
    Replaced { access: String, refresh: String },
    /// Another process cleared the store (logged out).
    Cleared,
}

/// Persisted shape of the token file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredPair {
    access_token: String,
    refresh_token: String,
}

/// The durable credential store seam. One handle per execution context;
/// `subscribe` only ever yields changes made through *other* handles.
pub trait TokenStore: Send + Sync {
    fn get(&self, kind: TokenKind) -> Option<String>;
    fn set(&self, access: &str, refresh: &str) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// JSON file store watched with `notify` plus a polling fallback, so writes
/// by other frontdesk processes surface as [`StoreChange`]s.
pub struct FileTokenStore {
    path: PathBuf,
    poll_interval: Duration,
    change_tx: broadcast::Sender<StoreChange>,
    /// Last contents this handle wrote or observed; diffed on every wake
    /// so own writes and no-op filesystem events stay silent.
    last_seen: Mutex<Option<StoredPair>>,
}

impl FileTokenStore {
    /// Open the store at `path` and start its change watcher. The watcher
    /// runs until `shutdown` is cancelled.
    pub fn open(path: PathBuf, poll_interval: Duration, shutdown: CancellationToken) -> Arc<Self> {
        let (change_tx, _) = broadcast::channel(16);
        let store = Arc::new(Self {
            path,
            poll_interval,
            change_tx,
            last_seen: Mutex::new(None),
        });
        // Pre-existing contents are the resume baseline, not a change.
        *store.last_seen.lock() = store.read_pair();
        let watcher = Arc::clone(&store);
        tokio::spawn(async move { watcher.watch_loop(shutdown).await });
        store
    }

    /// Read the pair from disk, failing soft: a missing or corrupt file
    /// reads as "no pair".
    fn read_pair(&self) -> Option<StoredPair> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    /// Write the pair atomically (unique tmp name + rename). A unique temp
    /// filename (PID + counter) avoids corruption when concurrent saves
    /// race on the same `.tmp` file.
    fn write_pair(&self, pair: &StoredPair) -> anyhow::Result<()> {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        let json = serde_json::to_string_pretty(pair)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            "{}.{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id(),
            seq,
        );
        let tmp_path = self.path.with_file_name(tmp_name);
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    async fn watch_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let (wake_tx, mut wake_rx) = mpsc::channel::<()>(1);
        let _watcher = self.setup_notify_watcher(wake_tx);
        let mut poll = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = wake_rx.recv() => {}
                _ = poll.tick() => {}
            }
            self.check_external_change();
        }
    }

    /// Set up a `notify` watcher on the token file's parent directory.
    /// Returns the watcher handle (must be kept alive). The polling tick
    /// covers platforms where this fails.
    fn setup_notify_watcher(&self, wake_tx: mpsc::Sender<()>) -> Option<notify::RecommendedWatcher> {
        use notify::{RecursiveMode, Watcher};

        let mut watcher = notify::recommended_watcher(move |_: notify::Result<notify::Event>| {
            let _ = wake_tx.try_send(());
        })
        .ok()?;

        // Watch the parent directory so file creation is seen too.
        let watch_path = self.path.parent().unwrap_or(self.path.as_ref());
        watcher.watch(watch_path, RecursiveMode::NonRecursive).ok()?;

        Some(watcher)
    }

    /// Diff disk contents against the last known state and broadcast the
    /// change if another process mutated the file. The lock is taken
    /// before the read so a local write in progress (which holds the same
    /// lock) can never be half-observed and misread as external.
    fn check_external_change(&self) {
        let current = {
            let mut last = self.last_seen.lock();
            let current = self.read_pair();
            if *last == current {
                return;
            }
            *last = current.clone();
            current
        };

        let change = match current {
            Some(pair) => {
                debug!("token file replaced by another process");
                StoreChange::Replaced { access: pair.access_token, refresh: pair.refresh_token }
            }
            None => {
                debug!("token file cleared by another process");
                StoreChange::Cleared
            }
        };
        let _ = self.change_tx.send(change);
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, kind: TokenKind) -> Option<String> {
        self.read_pair().map(|p| match kind {
            TokenKind::Access => p.access_token,
            TokenKind::Refresh => p.refresh_token,
        })
    }

    fn set(&self, access: &str, refresh: &str) -> anyhow::Result<()> {
        let pair = StoredPair {
            access_token: access.to_owned(),
            refresh_token: refresh.to_owned(),
        };
        // The lock is held across the write so the watcher never mistakes
        // this handle's own mutation for an external one.
        let mut last = self.last_seen.lock();
        *last = Some(pair.clone());
        self.write_pair(&pair)
    }

    fn clear(&self) -> anyhow::Result<()> {
        let mut last = self.last_seen.lock();
        *last = None;
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.change_tx.subscribe()
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// In-process store for tests and single-process setups. [`handle`] clones
/// share the same underlying pair; each handle only observes changes made
/// through *other* handles, mirroring the cross-process semantics of the
/// file store.
///
/// [`handle`]: MemoryTokenStore::handle
pub struct MemoryTokenStore {
    inner: Arc<MemoryShared>,
    origin: usize,
}

struct MemoryShared {
    pair: Mutex<Option<StoredPair>>,
    subscribers: Mutex<Vec<(usize, broadcast::Sender<StoreChange>)>>,
    next_origin: AtomicUsize,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::with_inner(Arc::new(MemoryShared {
            pair: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
            next_origin: AtomicUsize::new(0),
        }))
    }

    /// A second handle over the same pair, acting as another execution
    /// context.
    pub fn handle(&self) -> Self {
        Self::with_inner(Arc::clone(&self.inner))
    }

    fn with_inner(inner: Arc<MemoryShared>) -> Self {
        let origin = inner.next_origin.fetch_add(1, Ordering::Relaxed);
        let (tx, _) = broadcast::channel(16);
        inner.subscribers.lock().push((origin, tx));
        Self { inner, origin }
    }

    fn notify_others(&self, change: StoreChange) {
        for (origin, tx) in self.inner.subscribers.lock().iter() {
            if *origin != self.origin {
                let _ = tx.send(change.clone());
            }
        }
    }

    fn own_sender(&self) -> Option<broadcast::Sender<StoreChange>> {
        self.inner
            .subscribers
            .lock()
            .iter()
            .find(|(origin, _)| *origin == self.origin)
            .map(|(_, tx)| tx.clone())
    }
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, kind: TokenKind) -> Option<String> {
        self.inner.pair.lock().as_ref().map(|p| match kind {
            TokenKind::Access => p.access_token.clone(),
            TokenKind::Refresh => p.refresh_token.clone(),
        })
    }

    fn set(&self, access: &str, refresh: &str) -> anyhow::Result<()> {
        let pair = StoredPair {
            access_token: access.to_owned(),
            refresh_token: refresh.to_owned(),
        };
        *self.inner.pair.lock() = Some(pair.clone());
        self.notify_others(StoreChange::Replaced {
            access: pair.access_token,
            refresh: pair.refresh_token,
        });
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        *self.inner.pair.lock() = None;
        self.notify_others(StoreChange::Cleared);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        match self.own_sender() {
            Some(tx) => tx.subscribe(),
            None => {
                // Unreachable in practice: every handle registers at
                // construction. Hand back a silent receiver rather than
                // panicking in a session-critical path.
                warn!("memory store handle missing its subscriber entry");
                broadcast::channel(1).1
            }
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
