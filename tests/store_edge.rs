//! State store edge cases: absence, malformed content, verbatim persistence.

use std::sync::Arc;

use anyhow::Result;
use gemflow::session::TokenCache;
use gemflow::store::{JsonFileStore, MemoryStore, StateStore, AUTH_KEY, BALANCES_KEY};
use serde_json::json;
use tempfile::TempDir;

#[tokio::test]
async fn missing_key_loads_as_absent() -> Result<()> {
    let dir = TempDir::new()?;
    let store = JsonFileStore::new(dir.path());

    assert_eq!(store.get(BALANCES_KEY).await?, None);

    Ok(())
}

#[tokio::test]
async fn snapshot_round_trips_verbatim() -> Result<()> {
    let dir = TempDir::new()?;
    let store = JsonFileStore::new(dir.path());

    // Shape is dictated by the upstream API; the store must not touch it.
    let snapshot = json!({
        "data": [
            {"asset": "diamond", "amount": "1.5k"},
            {"asset": "emerald", "amount": 7},
        ],
        "server_time": "2024-11-02T10:00:00Z",
    });

    store.put(BALANCES_KEY, &snapshot).await?;
    assert_eq!(store.get(BALANCES_KEY).await?, Some(snapshot));

    Ok(())
}

#[tokio::test]
async fn malformed_file_loads_as_absent() -> Result<()> {
    let dir = TempDir::new()?;
    let store = JsonFileStore::new(dir.path());

    std::fs::write(dir.path().join("auth.json"), "{not json at all")?;
    assert_eq!(store.get(AUTH_KEY).await?, None);

    Ok(())
}

#[tokio::test]
async fn put_creates_the_data_directory() -> Result<()> {
    let dir = TempDir::new()?;
    let store = JsonFileStore::new(dir.path().join("nested").join("state"));

    store.put(AUTH_KEY, &json!({"auth_token": "t"})).await?;
    assert_eq!(
        store.get(AUTH_KEY).await?,
        Some(json!({"auth_token": "t"}))
    );

    Ok(())
}

#[tokio::test]
async fn token_cache_trims_and_validates() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let cache = TokenCache::new(store.clone());

    assert_eq!(cache.load().await, None);

    store.put(AUTH_KEY, &json!({"auth_token": "  tok-1  "})).await?;
    assert_eq!(cache.load().await.as_deref(), Some("tok-1"));

    store.put(AUTH_KEY, &json!({"auth_token": ""})).await?;
    assert_eq!(cache.load().await, None);

    store.put(AUTH_KEY, &json!({"auth_token": 42})).await?;
    assert_eq!(cache.load().await, None);

    store.put(AUTH_KEY, &json!({"unrelated": "x"})).await?;
    assert_eq!(cache.load().await, None);

    Ok(())
}

#[tokio::test]
async fn token_cache_writes_the_single_field_shape() -> Result<()> {
    let dir = TempDir::new()?;
    let store = Arc::new(JsonFileStore::new(dir.path()));
    let cache = TokenCache::new(store);

    cache.save("abc123").await?;

    let content = std::fs::read_to_string(dir.path().join("auth.json"))?;
    let parsed: serde_json::Value = serde_json::from_str(&content)?;
    assert_eq!(parsed, json!({"auth_token": "abc123"}));

    Ok(())
}
