// Redis-backed token store
// Maps the store contract onto GET / SET EX / TTL / EXPIRE / DEL over a
// multiplexed tokio connection

use super::{KeyTtl, StoreError, TokenStore};
use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, RedisError};
use std::time::Duration;
use tokio::sync::Mutex;

fn conn_err(e: RedisError) -> StoreError {
    StoreError::Connection(e.to_string())
}

/// Redis [`TokenStore`] backend
///
/// Values are stored as plain strings; the object layer's JSON codec runs
/// client-side, so nothing here depends on redis-side serialization.
pub struct RedisTokenStore {
    conn: Mutex<MultiplexedConnection>,
}

impl RedisTokenStore {
    /// Connect to a redis instance, e.g. `redis://127.0.0.1/`
    pub async fn new(redis_url: &str) -> Result<Self, RedisError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(Self::with_connection(conn))
    }

    /// Wrap an already-established connection
    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.lock().await;
        let value: Option<String> = conn.get(key).await.map_err(conn_err)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().await;
        // SET EX rejects 0
        let secs = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key, value, secs).await.map_err(conn_err)?;
        Ok(())
    }

    async fn update(&self, key: &str, value: &str) -> Result<(), StoreError> {
        // TTL is read and re-applied in two steps; a key that expires in
        // between is treated as already gone
        match self.get_ttl(key).await? {
            KeyTtl::Missing => Ok(()),
            KeyTtl::Persistent => {
                let mut conn = self.conn.lock().await;
                let _: () = conn.set(key, value).await.map_err(conn_err)?;
                Ok(())
            }
            KeyTtl::Expires(remaining) => self.set(key, value, remaining).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().await;
        let _: () = conn.del(key).await.map_err(conn_err)?;
        Ok(())
    }

    async fn get_ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        let mut conn = self.conn.lock().await;
        let ttl: i64 = conn.ttl(key).await.map_err(conn_err)?;
        let ttl = match ttl {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::Persistent,
            secs => KeyTtl::Expires(Duration::from_secs(secs.max(0) as u64)),
        };
        Ok(ttl)
    }

    async fn set_ttl(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().await;
        let _: () = conn
            .expire(key, ttl.as_secs().max(1) as i64)
            .await
            .map_err(conn_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests require a Redis instance running
    // Skip them in CI unless Redis is available

    #[tokio::test]
    #[ignore] // Remove this to run with a local Redis instance
    async fn test_string_roundtrip() {
        let store = RedisTokenStore::new("redis://127.0.0.1/")
            .await
            .expect("Failed to connect to Redis");

        store
            .set("sessauth:test:k1", "v1", Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(
            store.get("sessauth:test:k1").await.unwrap(),
            Some("v1".to_string())
        );

        store.delete("sessauth:test:k1").await.unwrap();
        assert_eq!(store.get("sessauth:test:k1").await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Remove this to run with a local Redis instance
    async fn test_update_keeps_ttl() {
        let store = RedisTokenStore::new("redis://127.0.0.1/")
            .await
            .expect("Failed to connect to Redis");

        store
            .set("sessauth:test:k2", "v1", Duration::from_secs(120))
            .await
            .unwrap();
        store.update("sessauth:test:k2", "v2").await.unwrap();

        assert_eq!(
            store.get("sessauth:test:k2").await.unwrap(),
            Some("v2".to_string())
        );
        match store.get_ttl("sessauth:test:k2").await.unwrap() {
            KeyTtl::Expires(remaining) => assert!(remaining <= Duration::from_secs(120)),
            other => panic!("expected a finite TTL, got {:?}", other),
        }

        store.delete("sessauth:test:k2").await.unwrap();
    }
}
