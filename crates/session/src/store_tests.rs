// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;

const POLL: Duration = Duration::from_millis(50);

fn open_store(dir: &tempfile::TempDir, shutdown: &CancellationToken) -> Arc<FileTokenStore> {
    FileTokenStore::open(dir.path().join("tokens.json"), POLL, shutdown.clone())
}

async fn expect_change(rx: &mut broadcast::Receiver<StoreChange>) -> StoreChange {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for store change")
        .expect("change channel closed")
}

#[tokio::test]
async fn file_store_roundtrip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let shutdown = CancellationToken::new();
    let store = open_store(&dir, &shutdown);

    assert_eq!(store.get(TokenKind::Access), None);

    store.set("access-1", "refresh-1")?;
    assert_eq!(store.get(TokenKind::Access).as_deref(), Some("access-1"));
    assert_eq!(store.get(TokenKind::Refresh).as_deref(), Some("refresh-1"));

    store.clear()?;
    assert_eq!(store.get(TokenKind::Access), None);
    assert_eq!(store.get(TokenKind::Refresh), None);

    shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn clear_without_file_is_idempotent() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let shutdown = CancellationToken::new();
    let store = open_store(&dir, &shutdown);

    store.clear()?;
    store.clear()?;

    shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn corrupt_file_reads_as_no_pair() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tokens.json");
    std::fs::write(&path, "{ not json")?;

    let shutdown = CancellationToken::new();
    let store = FileTokenStore::open(path, POLL, shutdown.clone());
    assert_eq!(store.get(TokenKind::Access), None);

    shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn own_writes_are_not_echoed() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let shutdown = CancellationToken::new();
    let store = open_store(&dir, &shutdown);
    let mut rx = store.subscribe();

    store.set("access-1", "refresh-1")?;
    store.clear()?;
    store.set("access-2", "refresh-2")?;

    // Several poll cycles worth of quiet.
    tokio::time::sleep(POLL * 6).await;
    assert!(rx.try_recv().is_err(), "handle observed its own write");

    shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn pre_existing_contents_are_not_a_change() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tokens.json");
    std::fs::write(
        &path,
        serde_json::json!({ "access_token": "a", "refresh_token": "r" }).to_string(),
    )?;

    let shutdown = CancellationToken::new();
    let store = FileTokenStore::open(path, POLL, shutdown.clone());
    let mut rx = store.subscribe();

    tokio::time::sleep(POLL * 6).await;
    assert!(rx.try_recv().is_err(), "resume baseline reported as a change");
    assert_eq!(store.get(TokenKind::Access).as_deref(), Some("a"));

    shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn write_by_another_handle_is_observed() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let shutdown = CancellationToken::new();
    let a = open_store(&dir, &shutdown);
    let b = open_store(&dir, &shutdown);
    let mut b_rx = b.subscribe();

    a.set("access-1", "refresh-1")?;

    let change = expect_change(&mut b_rx).await;
    assert_eq!(
        change,
        StoreChange::Replaced { access: "access-1".into(), refresh: "refresh-1".into() }
    );
    assert_eq!(b.get(TokenKind::Access).as_deref(), Some("access-1"));

    shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn clear_by_another_handle_is_observed() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let shutdown = CancellationToken::new();
    let a = open_store(&dir, &shutdown);
    let b = open_store(&dir, &shutdown);

    a.set("access-1", "refresh-1")?;
    let mut b_rx = b.subscribe();
    // Wait until B has seen the write before clearing.
    let _ = expect_change(&mut b_rx).await;

    a.clear()?;
    let change = expect_change(&mut b_rx).await;
    assert_eq!(change, StoreChange::Cleared);

    shutdown.cancel();
    Ok(())
}

// ---------------------------------------------------------------------------
// Memory store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn memory_handles_share_the_pair() -> anyhow::Result<()> {
    let a = MemoryTokenStore::new();
    let b = a.handle();

    a.set("access-1", "refresh-1")?;
    assert_eq!(b.get(TokenKind::Access).as_deref(), Some("access-1"));
    assert_eq!(b.get(TokenKind::Refresh).as_deref(), Some("refresh-1"));

    b.clear()?;
    assert_eq!(a.get(TokenKind::Access), None);
    Ok(())
}

#[tokio::test]
async fn memory_store_notifies_other_handles_only() -> anyhow::Result<()> {
    let a = MemoryTokenStore::new();
    let b = a.handle();
    let mut a_rx = a.subscribe();
    let mut b_rx = b.subscribe();

    a.set("access-1", "refresh-1")?;

    assert_eq!(
        b_rx.try_recv().expect("b should observe a's write"),
        StoreChange::Replaced { access: "access-1".into(), refresh: "refresh-1".into() }
    );
    assert!(a_rx.try_recv().is_err(), "a observed its own write");

    b.clear()?;
    assert_eq!(a_rx.try_recv().expect("a should observe b's clear"), StoreChange::Cleared);
    assert!(b_rx.try_recv().is_err(), "b observed its own clear");
    Ok(())
}
