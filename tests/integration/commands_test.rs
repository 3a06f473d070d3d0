// tests/integration/commands_test.rs

//! Integration tests for request/response commands
//! Tests: SET, GET, DELETE, PUBLISH through the ConnectionManager

use super::fixtures::{ORDERS, TEST_KEY1, TEST_KEY2, TEST_VALUE1, TEST_VALUE2, unique_key};
use super::test_helpers::TestContext;
use spinelink::config::ConnectionConfig;
use spinelink::core::transport::MemoryStore;
use spinelink::core::{ClientError, ErrorKind};
use std::sync::Arc;
use std::time::Duration;

// ===== SET / GET =====

#[tokio::test]
async fn test_set_then_get() {
    let ctx = TestContext::connected().await;

    ctx.manager.set(TEST_KEY1, TEST_VALUE1, 0).await.unwrap();

    assert_eq!(
        ctx.manager.get(TEST_KEY1).await.unwrap(),
        Some(TEST_VALUE1.to_string())
    );
}

#[tokio::test]
async fn test_set_overwrites_value() {
    let ctx = TestContext::connected().await;

    ctx.manager.set(TEST_KEY1, TEST_VALUE1, 0).await.unwrap();
    ctx.manager.set(TEST_KEY1, TEST_VALUE2, 0).await.unwrap();

    assert_eq!(
        ctx.manager.get(TEST_KEY1).await.unwrap(),
        Some(TEST_VALUE2.to_string())
    );
}

#[tokio::test]
async fn test_get_missing_key_is_none() {
    let ctx = TestContext::connected().await;

    assert_eq!(ctx.manager.get("never_set").await, Ok(None));
}

#[tokio::test]
async fn test_set_with_ttl_expires() {
    let ctx = TestContext::connected().await;

    ctx.manager.set(TEST_KEY1, TEST_VALUE1, 50).await.unwrap();
    assert_eq!(
        ctx.manager.get(TEST_KEY1).await.unwrap(),
        Some(TEST_VALUE1.to_string())
    );

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(ctx.manager.get(TEST_KEY1).await.unwrap(), None);
}

#[tokio::test]
async fn test_set_with_negative_ttl_never_expires() {
    let ctx = TestContext::connected().await;

    ctx.manager.set(TEST_KEY1, TEST_VALUE1, -500).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(
        ctx.manager.get(TEST_KEY1).await.unwrap(),
        Some(TEST_VALUE1.to_string())
    );
}

#[tokio::test]
async fn test_many_keys() {
    let ctx = TestContext::connected().await;

    for i in 0..20 {
        let key = unique_key("many", i);
        ctx.manager.set(&key, &i.to_string(), 0).await.unwrap();
    }
    for i in 0..20 {
        let key = unique_key("many", i);
        assert_eq!(ctx.manager.get(&key).await.unwrap(), Some(i.to_string()));
    }
}

// ===== DELETE =====

#[tokio::test]
async fn test_delete_then_get_is_none() {
    let ctx = TestContext::connected().await;
    ctx.manager.set(TEST_KEY1, TEST_VALUE1, 0).await.unwrap();
    ctx.manager.set(TEST_KEY2, TEST_VALUE2, 0).await.unwrap();

    ctx.manager.delete(TEST_KEY1).await.unwrap();

    assert_eq!(ctx.manager.get(TEST_KEY1).await.unwrap(), None);
    assert_eq!(
        ctx.manager.get(TEST_KEY2).await.unwrap(),
        Some(TEST_VALUE2.to_string())
    );
}

#[tokio::test]
async fn test_delete_missing_key_succeeds() {
    let ctx = TestContext::connected().await;

    assert_eq!(ctx.manager.delete("never_set").await, Ok(()));
}

// ===== PUBLISH =====

#[tokio::test]
async fn test_publish_without_subscribers_succeeds() {
    let ctx = TestContext::connected().await;

    assert_eq!(ctx.manager.publish(ORDERS, "nobody listens").await, Ok(()));
}

#[tokio::test]
async fn test_publish_reaches_other_manager() {
    let mut listener = TestContext::connected().await;
    listener.subscribe(&[ORDERS]).await;
    let publisher = TestContext::with_store(Arc::clone(&listener.store));
    publisher
        .manager
        .connect(ConnectionConfig::default())
        .await
        .unwrap();

    publisher.manager.publish(ORDERS, "hello").await.unwrap();

    assert!(listener.pump_until_received(1).await);
    assert_eq!(listener.recorder.messages(), vec!["hello".to_string()]);
}

// ===== databases =====

#[tokio::test]
async fn test_databases_are_isolated() {
    let store = Arc::new(MemoryStore::new());
    let db0 = TestContext::with_store(Arc::clone(&store));
    let db1 = TestContext::with_store(Arc::clone(&store));
    db0.manager.connect(ConnectionConfig::default()).await.unwrap();
    db1.manager
        .connect(ConnectionConfig::default().with_db(1))
        .await
        .unwrap();

    db1.manager.set(TEST_KEY1, TEST_VALUE1, 0).await.unwrap();

    assert_eq!(db0.manager.get(TEST_KEY1).await.unwrap(), None);
    assert_eq!(
        db1.manager.get(TEST_KEY1).await.unwrap(),
        Some(TEST_VALUE1.to_string())
    );
}

#[tokio::test]
async fn test_managers_share_keyspace_of_same_db() {
    let store = Arc::new(MemoryStore::new());
    let writer = TestContext::with_store(Arc::clone(&store));
    let reader = TestContext::with_store(store);
    writer.manager.connect(ConnectionConfig::default()).await.unwrap();
    reader.manager.connect(ConnectionConfig::default()).await.unwrap();

    writer.manager.set(TEST_KEY1, TEST_VALUE1, 0).await.unwrap();

    assert_eq!(
        reader.manager.get(TEST_KEY1).await.unwrap(),
        Some(TEST_VALUE1.to_string())
    );
}

// ===== not connected =====

#[tokio::test]
async fn test_commands_fail_fast_when_never_connected() {
    let ctx = TestContext::new();

    assert_eq!(
        ctx.manager.set(TEST_KEY1, TEST_VALUE1, 0).await,
        Err(ClientError::NotConnected)
    );
    assert_eq!(
        ctx.manager.get(TEST_KEY1).await,
        Err(ClientError::NotConnected)
    );
    assert_eq!(
        ctx.manager.delete(TEST_KEY1).await,
        Err(ClientError::NotConnected)
    );
    assert_eq!(
        ctx.manager.publish(ORDERS, "hello").await,
        Err(ClientError::NotConnected)
    );
}

#[tokio::test]
async fn test_commands_fail_fast_after_disconnect() {
    let ctx = TestContext::connected().await;
    ctx.manager.set(TEST_KEY1, TEST_VALUE1, 0).await.unwrap();

    ctx.manager.disconnect().await;

    let err = ctx.manager.get(TEST_KEY1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);
}
