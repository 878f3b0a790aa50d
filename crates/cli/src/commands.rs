// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subcommand handlers. Each command builds its own session manager over
//! the shared token file, so every frontdesk process is an independent
//! execution context kept consistent through the store.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use frontdesk_session::clock::{Clock, SystemClock};
use frontdesk_session::config::SessionConfig;
use frontdesk_session::session::{EndReason, SessionEvent, SessionManager};
use frontdesk_session::store::FileTokenStore;

async fn session(
    config: &SessionConfig,
    shutdown: &CancellationToken,
) -> (Arc<SessionManager>, broadcast::Receiver<SessionEvent>) {
    let store = FileTokenStore::open(
        config.token_path(),
        config.store_poll_interval(),
        shutdown.clone(),
    );
    let (manager, events) = SessionManager::new(
        config.clone(),
        store,
        Arc::new(SystemClock),
        shutdown.clone(),
    );
    manager.start().await;
    (manager, events)
}

fn format_expires(secs: Option<u64>) -> String {
    match secs {
        Some(s) => {
            let m = s / 60;
            let rem = s % 60;
            format!("{m}m {rem:02}s")
        }
        None => "\u{2014}".to_string(),
    }
}

fn describe_end(reason: EndReason) -> &'static str {
    match reason {
        EndReason::UserLogout => "logged out",
        EndReason::Rejected => "credentials rejected by the server",
        EndReason::ExternalLogout => "logged out by another process",
    }
}

pub async fn login(config: SessionConfig, identity: &str, secret: &str) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let (manager, _events) = session(&config, &shutdown).await;

    let access = manager.login(identity, secret).await?;
    let expires_in = access.time_until_expiry(SystemClock.now_secs());
    println!(
        "logged in as {} (access valid {})",
        access.subject(),
        format_expires(Some(expires_in.as_secs()))
    );

    shutdown.cancel();
    Ok(())
}

pub async fn status(config: SessionConfig, json: bool) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let (manager, _events) = session(&config, &shutdown).await;

    let status = manager.status().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else if status.logged_in {
        println!("session:  active");
        println!("subject:  {}", status.subject.as_deref().unwrap_or("?"));
        println!("access:   expires in {}", format_expires(status.access_expires_in_secs));
        println!("refresh:  expires in {}", format_expires(status.refresh_expires_in_secs));
    } else {
        println!("session:  none (run `frontdesk login`)");
    }

    shutdown.cancel();
    Ok(())
}

pub async fn token(config: SessionConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let (manager, _events) = session(&config, &shutdown).await;

    match manager.get_valid_token().await {
        Some(access) => {
            println!("{}", access.raw());
            shutdown.cancel();
            Ok(())
        }
        None => {
            shutdown.cancel();
            anyhow::bail!("no valid session; run `frontdesk login` or try again later")
        }
    }
}

pub async fn run(config: SessionConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let (manager, mut events) = session(&config, &shutdown).await;

    let status = manager.status().await;
    if status.logged_in {
        println!(
            "holding session for {} (access expires in {})",
            status.subject.as_deref().unwrap_or("?"),
            format_expires(status.access_expires_in_secs)
        );
    } else {
        println!("no active session; waiting for a login from any frontdesk process");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                shutdown.cancel();
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::LoggedIn { subject }) => {
                    println!("session started for {subject}");
                }
                Ok(SessionEvent::Refreshed { expires_at }) => {
                    let now = SystemClock.now_secs();
                    println!(
                        "credentials renewed (expires in {})",
                        format_expires(Some(expires_at.saturating_sub(now)))
                    );
                }
                Ok(SessionEvent::RefreshFailed { error }) => {
                    eprintln!("renewal failed: {error}");
                }
                Ok(SessionEvent::Ended { reason }) => {
                    println!("session ended: {}", describe_end(reason));
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    Ok(())
}

pub async fn logout(config: SessionConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let (manager, _events) = session(&config, &shutdown).await;

    manager.logout().await;
    println!("logged out");

    shutdown.cancel();
    Ok(())
}
