// Token storage abstraction
// String key-value operations with per-key TTL, plus a JSON object layer on top

pub mod memory;
pub mod redis;

pub use self::memory::MemoryTokenStore;
pub use self::redis::RedisTokenStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Remaining lifetime of a stored key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key does not exist, or has already expired
    Missing,
    /// Key exists and never expires
    Persistent,
    /// Key expires after the contained duration
    Expires(Duration),
}

/// Storage errors
#[derive(Debug, Clone)]
pub enum StoreError {
    /// Object key is missing or holds an empty value
    ObjectNotExist,
    /// Backend unreachable or refused the operation
    Connection(String),
    /// Stored bytes could not be (de)serialized
    Serialization(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::ObjectNotExist => write!(f, "object not exist"),
            StoreError::Connection(msg) => write!(f, "connection error: {}", msg),
            StoreError::Serialization(msg) => write!(f, "serialization error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// String key-value backend with per-key TTL
///
/// A thin adapter over the backing service: no retries are performed here,
/// transient failures surface to the caller unchanged.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Read a key; a missing key is `None`, not an error
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a key with a fresh TTL
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Replace a key's value while keeping its current remaining TTL.
    /// A key that no longer exists is left alone. The TTL read and the
    /// re-set are two separate operations; a concurrent TTL change in
    /// between wins.
    async fn update(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Remaining lifetime of a key
    async fn get_ttl(&self, key: &str) -> Result<KeyTtl, StoreError>;

    /// Reset a key's TTL without touching its value
    async fn set_ttl(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;
}

/// Read a JSON object stored under `key`.
///
/// A missing or empty value fails with [`StoreError::ObjectNotExist`] so
/// callers can decide between create-on-miss and propagation; malformed
/// bytes fail with [`StoreError::Serialization`].
pub async fn get_object<T>(store: &dyn TokenStore, key: &str) -> Result<T, StoreError>
where
    T: DeserializeOwned,
{
    match store.get(key).await? {
        Some(raw) if !raw.is_empty() => {
            serde_json::from_str(&raw).map_err(|e| StoreError::Serialization(e.to_string()))
        }
        _ => Err(StoreError::ObjectNotExist),
    }
}

/// Write a JSON object under `key` with a fresh TTL
pub async fn set_object<T>(
    store: &dyn TokenStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), StoreError>
where
    T: Serialize,
{
    let raw = serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    store.set(key, &raw, ttl).await
}

/// Overwrite a stored JSON object, keeping the key's remaining TTL
pub async fn update_object<T>(store: &dyn TokenStore, key: &str, value: &T) -> Result<(), StoreError>
where
    T: Serialize,
{
    let raw = serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    store.update(key, &raw).await
}

/// Remove a stored JSON object
pub async fn delete_object(store: &dyn TokenStore, key: &str) -> Result<(), StoreError> {
    store.delete(key).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_object_roundtrip() {
        let store = MemoryTokenStore::new();

        let mut value = HashMap::new();
        value.insert("color".to_string(), "green".to_string());

        set_object(&store, "obj:1", &value, Duration::from_secs(60))
            .await
            .unwrap();

        let loaded: HashMap<String, String> = get_object(&store, "obj:1").await.unwrap();
        assert_eq!(loaded, value);
    }

    #[tokio::test]
    async fn test_empty_collections_roundtrip() {
        let store = MemoryTokenStore::new();

        let empty_map: HashMap<String, String> = HashMap::new();
        set_object(&store, "obj:map", &empty_map, Duration::from_secs(60))
            .await
            .unwrap();
        let loaded: HashMap<String, String> = get_object(&store, "obj:map").await.unwrap();
        assert!(loaded.is_empty());

        let empty_list: Vec<u32> = Vec::new();
        set_object(&store, "obj:list", &empty_list, Duration::from_secs(60))
            .await
            .unwrap();
        let loaded: Vec<u32> = get_object(&store, "obj:list").await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_get_object_missing_key() {
        let store = MemoryTokenStore::new();

        let result: Result<Vec<u32>, _> = get_object(&store, "obj:none").await;
        assert!(matches!(result, Err(StoreError::ObjectNotExist)));
    }

    #[tokio::test]
    async fn test_get_object_empty_value() {
        let store = MemoryTokenStore::new();

        store.set("obj:empty", "", Duration::from_secs(60)).await.unwrap();

        let result: Result<Vec<u32>, _> = get_object(&store, "obj:empty").await;
        assert!(matches!(result, Err(StoreError::ObjectNotExist)));
    }

    #[tokio::test]
    async fn test_get_object_malformed_value() {
        let store = MemoryTokenStore::new();

        store
            .set("obj:bad", "not json", Duration::from_secs(60))
            .await
            .unwrap();

        let result: Result<Vec<u32>, _> = get_object(&store, "obj:bad").await;
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_update_object_keeps_ttl() {
        let store = MemoryTokenStore::new();

        set_object(&store, "obj:ttl", &vec![1u32], Duration::from_secs(60))
            .await
            .unwrap();
        update_object(&store, "obj:ttl", &vec![1u32, 2u32]).await.unwrap();

        let loaded: Vec<u32> = get_object(&store, "obj:ttl").await.unwrap();
        assert_eq!(loaded, vec![1, 2]);

        match store.get_ttl("obj:ttl").await.unwrap() {
            KeyTtl::Expires(remaining) => assert!(remaining <= Duration::from_secs(60)),
            other => panic!("expected a finite TTL, got {:?}", other),
        }
    }
}
