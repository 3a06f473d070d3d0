// tests/integration/lifecycle_test.rs

//! Integration tests for the connection lifecycle
//! Tests: connect, disconnect, clear_connection, reconnect, drop

use super::fixtures::{ORDERS, WRONGPASS, config_for_user};
use super::test_helpers::{TestContext, wait_for_subscribers};
use spinelink::config::ConnectionConfig;
use spinelink::core::transport::MemoryStore;
use spinelink::core::{ClientError, CommandExecutor, ErrorKind, SubscriberState};
use std::sync::Arc;

// ===== connect / disconnect =====

#[tokio::test]
async fn test_connect_then_disconnect_leaves_manager_empty() {
    let ctx = TestContext::new();

    let handle = ctx.manager.connect(ConnectionConfig::default()).await.unwrap();
    assert!(handle.is_valid());
    assert!(ctx.manager.is_connected().await);
    assert_eq!(ctx.store.open_connections(), 1);

    assert!(ctx.manager.disconnect().await);

    assert!(!ctx.manager.is_connected().await);
    assert!(ctx.manager.handle().await.is_none());
    assert!(!handle.is_valid());
    assert_eq!(ctx.manager.subscriber_state(), SubscriberState::Stopped);
    assert_eq!(ctx.store.open_connections(), 0);
}

#[tokio::test]
async fn test_disconnect_without_connection_is_noop() {
    let ctx = TestContext::new();

    assert!(ctx.manager.disconnect().await);
    assert!(ctx.manager.disconnect().await);
    assert_eq!(ctx.manager.subscriber_state(), SubscriberState::Idle);
}

#[tokio::test]
async fn test_clear_connection_is_idempotent() {
    let ctx = TestContext::new();

    // Never connected
    ctx.manager.clear_connection().await;

    ctx.manager.connect(ConnectionConfig::default()).await.unwrap();
    ctx.manager.clear_connection().await;
    ctx.manager.clear_connection().await;

    assert!(!ctx.manager.is_connected().await);
    assert_eq!(ctx.store.open_connections(), 0);
}

#[tokio::test]
async fn test_handle_reports_config_and_id() {
    let ctx = TestContext::new();
    let config = ConnectionConfig::new("store.local", 7000).with_db(2);

    let handle = ctx.manager.connect(config.clone()).await.unwrap();

    assert_eq!(handle.config(), &config);
    assert_eq!(handle.id(), 1);
    let current = ctx.manager.handle().await.unwrap();
    assert_eq!(current.id(), handle.id());
}

// ===== reconnect =====

#[tokio::test]
async fn test_connect_twice_closes_first_handle() {
    let ctx = TestContext::new();

    let first = ctx.manager.connect(ConnectionConfig::default()).await.unwrap();
    let second = ctx.manager.connect(ConnectionConfig::default()).await.unwrap();

    assert!(!first.is_valid());
    assert!(second.is_valid());
    assert!(second.id() > first.id());
    assert_eq!(ctx.store.open_connections(), 1);
    assert_eq!(ctx.store.subscriptions_at_close(), vec![0]);
}

#[tokio::test]
async fn test_reconnect_stops_running_subscriber_first() {
    let ctx = TestContext::connected().await;
    ctx.subscribe(&[ORDERS]).await;
    assert_eq!(ctx.manager.subscriber_state(), SubscriberState::Running);

    ctx.manager.connect(ConnectionConfig::default()).await.unwrap();

    // The old subscription was gone before the old connection closed.
    assert_eq!(ctx.store.subscriptions_at_close(), vec![0]);
    assert_eq!(ctx.store.subscriber_count(ORDERS), 0);
    assert_eq!(ctx.manager.subscriber_state(), SubscriberState::Idle);
}

#[tokio::test]
async fn test_failed_reconnect_leaves_manager_disconnected() {
    let ctx = TestContext::new();
    let first = ctx.manager.connect(ConnectionConfig::default()).await.unwrap();

    ctx.store.set_reachable(false);
    let err = ctx
        .manager
        .connect(ConnectionConfig::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConnectionError);
    assert!(!first.is_valid());
    assert!(!ctx.manager.is_connected().await);
    assert_eq!(ctx.store.open_connections(), 0);
}

// ===== connect failures =====

#[tokio::test]
async fn test_connect_unreachable_host() {
    let ctx = TestContext::new();
    ctx.store.set_reachable(false);

    let err = ctx
        .manager
        .connect(ConnectionConfig::new("10.0.0.1", 6380))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConnectionError);
    assert!(
        err.message().contains("Failed to connect to 10.0.0.1:6380"),
        "unexpected message: {}",
        err
    );
    assert!(!ctx.manager.is_connected().await);
}

#[tokio::test]
async fn test_connect_wrong_password_keeps_server_text() {
    let store = Arc::new(MemoryStore::new());
    store.add_user("app", "secret");
    let ctx = TestContext::with_store(store);

    let err = ctx
        .manager
        .connect(config_for_user("app", "nope"))
        .await
        .unwrap_err();

    assert_eq!(err, ClientError::Connection(WRONGPASS.to_string()));
    assert_eq!(err.to_string(), WRONGPASS);
}

#[tokio::test]
async fn test_connect_with_valid_credentials() {
    let store = Arc::new(MemoryStore::new());
    store.add_user("app", "secret");
    let ctx = TestContext::with_store(store);

    let handle = ctx
        .manager
        .connect(config_for_user("app", "secret"))
        .await
        .unwrap();

    assert!(handle.is_valid());
    assert_eq!(handle.config().user, "app");
}

#[tokio::test]
async fn test_connect_db_out_of_range() {
    let ctx = TestContext::new();

    let err = ctx
        .manager
        .connect(ConnectionConfig::default().with_db(16))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ClientError::Connection("ERR DB index is out of range".to_string())
    );
}

// ===== stale handles and drop =====

#[tokio::test]
async fn test_executor_on_stale_handle_fails_fast() {
    let ctx = TestContext::connected().await;
    let handle = ctx.manager.handle().await.unwrap();
    let executor = CommandExecutor::new(handle);

    ctx.manager.disconnect().await;

    assert_eq!(executor.get("key").await, Err(ClientError::NotConnected));
    assert_eq!(
        executor.set("key", "value", 0).await,
        Err(ClientError::NotConnected)
    );
}

#[tokio::test]
async fn test_dropping_manager_releases_connection() {
    let ctx = TestContext::connected().await;
    ctx.subscribe(&[ORDERS]).await;
    let handle = ctx.manager.handle().await.unwrap();
    let store = Arc::clone(&ctx.store);

    drop(ctx);

    assert!(!handle.is_valid());
    // The aborted worker drops its subscription.
    assert!(wait_for_subscribers(&store, ORDERS, 0).await);
}
