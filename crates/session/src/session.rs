// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session manager: the façade everything else depends on.
//!
//! Owns the credential pair for one logged-in identity, renews it before
//! expiry through a single-flight refresh, and reconciles with other
//! frontdesk processes sharing the same token store. Consumers call
//! [`SessionManager::get_valid_token`] before attaching an authorization
//! header and subscribe to [`SessionEvent`]s to learn when the session
//! ends.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{AuthClient, RefreshError};
use crate::clock::Clock;
use crate::codec::{Credential, TokenKind, TokenPair};
use crate::config::SessionConfig;
use crate::scheduler::RefreshScheduler;
use crate::singleflight::SingleFlight;
use crate::store::{StoreChange, TokenStore};

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Explicit logout in this process.
    UserLogout,
    /// The server rejected the refresh credential.
    Rejected,
    /// Another process sharing the store logged out.
    ExternalLogout,
}

/// Events broadcast to session consumers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A session was established by login.
    LoggedIn { subject: String },
    /// The pair was renewed, locally or by another process.
    Refreshed { expires_at: u64 },
    /// A refresh cycle failed (transient or fatal).
    RefreshFailed { error: String },
    /// The session is over; consumers must redirect to re-authentication.
    Ended { reason: EndReason },
}

/// Snapshot of the current session for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_expires_in_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_expires_in_secs: Option<u64>,
}

/// Holds and renews the credential pair for one logged-in identity.
///
/// Constructed once with injected store and clock, then passed by `Arc`
/// to every consumer.
pub struct SessionManager {
    auth: AuthClient,
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    scheduler: RefreshScheduler,
    refresh_flight: SingleFlight<Result<TokenPair, RefreshError>>,
    /// In-memory cache of the stored pair. Replaced wholesale, never
    /// field-edited.
    current: RwLock<Option<TokenPair>>,
    event_tx: broadcast::Sender<SessionEvent>,
    shutdown: CancellationToken,
    /// Cancelled on logout so in-flight waiters reject instead of hanging;
    /// replaced with a fresh token for the next login.
    session_cancel: parking_lot::Mutex<CancellationToken>,
    /// Renewal ticks from the scheduler, consumed by the ticker task.
    tick_rx: parking_lot::Mutex<Option<mpsc::Receiver<()>>>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        store: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> (Arc<Self>, broadcast::Receiver<SessionEvent>) {
        let (event_tx, event_rx) = broadcast::channel(64);
        let (scheduler, tick_rx) =
            RefreshScheduler::new(config.refresh_margin(), config.refresh_floor());

        let manager = Arc::new(Self {
            auth: AuthClient::new(config.auth_url.clone()),
            store,
            clock,
            scheduler,
            refresh_flight: SingleFlight::new(),
            current: RwLock::new(None),
            event_tx,
            shutdown,
            session_cancel: parking_lot::Mutex::new(CancellationToken::new()),
            tick_rx: parking_lot::Mutex::new(Some(tick_rx)),
        });

        (manager, event_rx)
    }

    /// Resume any persisted session and spawn the background tasks
    /// (renewal ticker, store-sync bridge). Call once after construction.
    pub async fn start(self: &Arc<Self>) {
        if let Some(pair) = self.reconcile_from_store().await {
            info!(subject = pair.access.subject(), "resumed persisted session");
        }

        let tick_rx = self.tick_rx.lock().take();
        if let Some(tick_rx) = tick_rx {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.run_ticker(tick_rx).await });
        }

        let changes = self.store.subscribe();
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_sync_bridge(changes).await });
    }

    /// Subscribe to session lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Exchange identity/secret for a session. The returned pair goes
    /// through the same adopt path as a refresh: store write, scheduler
    /// arm, event broadcast.
    pub async fn login(&self, identity: &str, secret: &str) -> anyhow::Result<Credential> {
        let resp = self.auth.login(identity, secret).await?;
        let pair = self.adopt_pair(&resp.access_token, &resp.refresh_token, true).await;
        info!(subject = pair.access.subject(), "logged in");
        let _ = self
            .event_tx
            .send(SessionEvent::LoggedIn { subject: pair.access.subject().to_owned() });
        Ok(pair.access)
    }

    /// End the session everywhere: reject in-flight waiters, stop the
    /// timer, clear the store, broadcast [`SessionEvent::Ended`].
    /// Idempotent when already logged out.
    pub async fn logout(&self) {
        let had_session = self.current.read().await.is_some()
            || self.store.get(TokenKind::Access).is_some();
        if !had_session {
            debug!("logout requested with no active session");
            return;
        }
        info!("logging out");
        self.end_session(EndReason::UserLogout, true).await;
    }

    /// A credential good for at least the renewal margin, renewing first
    /// if the cached one is near expiry. `None` means no session or the
    /// refresh failed; transient failures leave the session intact for a
    /// later retry.
    pub async fn get_valid_token(self: &Arc<Self>) -> Option<Credential> {
        let now = self.clock.now_secs();
        {
            let current = self.current.read().await;
            match current.as_ref() {
                Some(pair) if pair.access.time_until_expiry(now) > self.scheduler.margin() => {
                    return Some(pair.access.clone());
                }
                Some(_) => {}
                None => {
                    // Not logged in and nothing persisted: no point
                    // issuing a refresh that cannot succeed.
                    if self.store.get(TokenKind::Refresh).is_none() {
                        return None;
                    }
                }
            }
        }

        match self.refresh().await {
            Ok(pair) => Some(pair.access),
            Err(e) => {
                debug!(error = %e, "no valid token available");
                None
            }
        }
    }

    /// Called by collaborators after an outgoing request came back
    /// authorization-rejected: forces one refresh even if the cached
    /// credential still looks fresh (it may have been revoked
    /// server-side). Concurrent callers collapse into the same cycle.
    pub async fn handle_unauthorized(self: &Arc<Self>) -> Option<Credential> {
        warn!("request rejected as unauthorized, forcing a refresh");
        match self.refresh().await {
            Ok(pair) => Some(pair.access),
            Err(_) => None,
        }
    }

    /// Snapshot for status displays.
    pub async fn status(&self) -> SessionStatus {
        let now = self.clock.now_secs();
        match self.current.read().await.as_ref() {
            Some(pair) => SessionStatus {
                logged_in: true,
                subject: Some(pair.access.subject().to_owned()),
                access_expires_in_secs: Some(pair.access.time_until_expiry(now).as_secs()),
                refresh_expires_in_secs: Some(pair.refresh.time_until_expiry(now).as_secs()),
            },
            None => SessionStatus {
                logged_in: false,
                subject: None,
                access_expires_in_secs: None,
                refresh_expires_in_secs: None,
            },
        }
    }

    /// Run one refresh cycle, or join the cycle already in flight. Every
    /// concurrent caller receives the identical result; exactly one
    /// network call is issued per cycle.
    pub async fn refresh(self: &Arc<Self>) -> Result<TokenPair, RefreshError> {
        let this = Arc::clone(self);
        self.refresh_flight.run(move || async move { this.do_refresh().await }).await
    }

    async fn do_refresh(self: Arc<Self>) -> Result<TokenPair, RefreshError> {
        let cancel = self.session_cancel.lock().clone();

        let refresh_raw = {
            let current = self.current.read().await;
            match current.as_ref() {
                Some(pair) => Some(pair.refresh.raw().to_owned()),
                None => self.store.get(TokenKind::Refresh),
            }
        };
        let Some(refresh_raw) = refresh_raw else {
            return Err(RefreshError::Transient("no refresh credential available".into()));
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(RefreshError::Cancelled),
            r = self.auth.refresh(&refresh_raw) => r,
        };

        match result {
            Ok(resp) => {
                let pair = self.adopt_pair(&resp.access_token, &resp.refresh_token, true).await;
                info!(
                    subject = pair.access.subject(),
                    expires_at = pair.access.expires_at(),
                    "credentials refreshed"
                );
                let _ = self
                    .event_tx
                    .send(SessionEvent::Refreshed { expires_at: pair.access.expires_at() });
                Ok(pair)
            }
            Err(RefreshError::Rejected(msg)) => {
                warn!(error = %msg, "refresh credential rejected, ending session");
                let _ = self.event_tx.send(SessionEvent::RefreshFailed { error: msg.clone() });
                self.end_session(EndReason::Rejected, true).await;
                Err(RefreshError::Rejected(msg))
            }
            Err(RefreshError::Cancelled) => Err(RefreshError::Cancelled),
            Err(RefreshError::Transient(msg)) => {
                warn!(error = %msg, "refresh failed, keeping session for retry");
                let _ = self.event_tx.send(SessionEvent::RefreshFailed { error: msg.clone() });
                // Keep proactive renewal alive: inside the margin the
                // delay resolves to the floor, a bounded retry cadence.
                if let Some(pair) = self.current.read().await.as_ref() {
                    self.scheduler.arm(pair.access.expires_at(), self.clock.now_secs());
                }
                Err(RefreshError::Transient(msg))
            }
        }
    }

    /// Install a new pair: in-memory cache, durable store (unless the
    /// pair came *from* the store), and renewal timer, in that order.
    async fn adopt_pair(&self, access: &str, refresh: &str, write_store: bool) -> TokenPair {
        let pair = TokenPair::from_raw(access, refresh);
        *self.current.write().await = Some(pair.clone());
        if write_store {
            if let Err(e) = self.store.set(access, refresh) {
                warn!(error = %e, "failed to persist credential pair");
            }
        }
        self.scheduler.arm(pair.access.expires_at(), self.clock.now_secs());
        pair
    }

    /// Re-read the store and adopt whatever it holds. Used at startup and
    /// whenever notifications may have been missed.
    async fn reconcile_from_store(&self) -> Option<TokenPair> {
        let access = self.store.get(TokenKind::Access)?;
        let refresh = self.store.get(TokenKind::Refresh)?;
        let pair = TokenPair::from_raw(access, refresh);

        let changed = {
            let mut current = self.current.write().await;
            let changed =
                current.as_ref().map(|c| c.access.raw() != pair.access.raw()).unwrap_or(true);
            *current = Some(pair.clone());
            changed
        };
        if changed {
            self.scheduler.arm(pair.access.expires_at(), self.clock.now_secs());
        }
        Some(pair)
    }

    /// Tear down local session state. `clear_store` is false when another
    /// process already cleared it. Waiters reject and the timer stops
    /// before the store is touched, so no new cycle starts against a
    /// half-torn session.
    async fn end_session(&self, reason: EndReason, clear_store: bool) {
        {
            let mut cancel = self.session_cancel.lock();
            cancel.cancel();
            *cancel = CancellationToken::new();
        }
        self.scheduler.disarm();
        *self.current.write().await = None;
        if clear_store {
            if let Err(e) = self.store.clear() {
                warn!(error = %e, "failed to clear token store");
            }
        }
        let _ = self.event_tx.send(SessionEvent::Ended { reason });
    }

    /// Consume renewal ticks from the scheduler.
    async fn run_ticker(self: Arc<Self>, mut tick_rx: mpsc::Receiver<()>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                tick = tick_rx.recv() => {
                    if tick.is_none() {
                        break;
                    }
                    debug!("renewal timer fired");
                    if let Err(e) = self.refresh().await {
                        debug!(error = %e, "scheduled refresh did not produce a credential");
                    }
                }
            }
        }
    }

    /// React to store changes made by other processes. Adopting their
    /// writes instead of refreshing is what extends single-flight
    /// suppression across processes.
    async fn run_sync_bridge(self: Arc<Self>, mut changes: broadcast::Receiver<StoreChange>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                change = changes.recv() => match change {
                    Ok(StoreChange::Cleared) => {
                        if self.current.read().await.is_some() {
                            info!("session ended by another process");
                            self.end_session(EndReason::ExternalLogout, false).await;
                        }
                    }
                    Ok(StoreChange::Replaced { access, refresh }) => {
                        self.adopt_external(&access, &refresh).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "store notifications lagged, reconciling from store");
                        if self.reconcile_from_store().await.is_none()
                            && self.current.read().await.is_some()
                        {
                            self.end_session(EndReason::ExternalLogout, false).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    /// Adopt a pair another process wrote: update the cache and re-arm the
    /// timer to the new expiry, with zero network calls.
    async fn adopt_external(&self, access: &str, refresh: &str) {
        let changed = {
            let current = self.current.read().await;
            current.as_ref().map(|p| p.access.raw() != access).unwrap_or(true)
        };
        if !changed {
            return;
        }
        let pair = self.adopt_pair(access, refresh, false).await;
        info!(
            expires_at = pair.access.expires_at(),
            "adopted credentials refreshed by another process"
        );
        let _ = self
            .event_tx
            .send(SessionEvent::Refreshed { expires_at: pair.access.expires_at() });
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
