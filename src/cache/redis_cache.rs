//! Redis cache backends
//!
//! [`RedisCache`] talks to a single node through a reconnecting
//! `ConnectionManager`. [`SentinelCache`] asks Sentinel for the current master
//! and keeps that connection until a command on it fails, so a promoted
//! replica is picked up after failover. Both share the same command set.
//!
//! `clear` deletes every key returned by `KEYS *` in the selected database.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::sentinel::{SentinelClient, SentinelNodeConnectionInfo, SentinelServerType};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisConnectionInfo, RedisError};
use tokio::sync::Mutex;
use tracing::warn;

use super::{Cache, CacheError};

/// Cache backed by a single Redis node
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connects to the Redis server at `url` (e.g. `redis://:password@host:6379/0`)
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.conn.clone();
        get_bytes(&mut conn, key).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        set_bytes(&mut conn, key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        delete_key(&mut conn, key).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        delete_all(&mut conn).await
    }
}

/// Cache backed by a Redis master behind a Sentinel group
pub struct SentinelCache {
    sentinel: Mutex<SentinelClient>,
    /// Connection to the last resolved master; dropped after a failed command
    master: Mutex<Option<MultiplexedConnection>>,
}

impl SentinelCache {
    /// Builds a client for the master named `master_name`
    ///
    /// `sentinels` are Sentinel addresses such as `redis://10.0.0.1:26379`.
    /// `password` and `db` apply to the data nodes, not to the Sentinels.
    pub fn connect(
        sentinels: &[String],
        master_name: &str,
        password: Option<String>,
        db: i64,
    ) -> Result<Self, CacheError> {
        let node_info = SentinelNodeConnectionInfo {
            tls_mode: None,
            redis_connection_info: Some(RedisConnectionInfo {
                db,
                password,
                ..Default::default()
            }),
        };
        let sentinel = SentinelClient::build(
            sentinels.to_vec(),
            master_name.to_string(),
            Some(node_info),
            SentinelServerType::Master,
        )?;
        Ok(Self {
            sentinel: Mutex::new(sentinel),
            master: Mutex::new(None),
        })
    }

    /// Returns the cached master connection, resolving it through Sentinel if needed
    async fn master(&self) -> Result<MultiplexedConnection, CacheError> {
        if let Some(conn) = self.master.lock().await.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self.sentinel.lock().await.get_async_connection().await?;
        *self.master.lock().await = Some(conn.clone());
        Ok(conn)
    }

    /// Forgets the master connection after an error so the next call re-resolves it
    async fn check<T>(&self, result: Result<T, CacheError>) -> Result<T, CacheError> {
        if let Err(CacheError::Redis(err)) = &result {
            if needs_reconnect(err) {
                warn!(error = %err, "dropping Sentinel master connection");
                self.master.lock().await.take();
            }
        }
        result
    }
}

/// Errors after which the master may have moved or the connection is unusable
fn needs_reconnect(err: &RedisError) -> bool {
    err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || matches!(err.kind(), redis::ErrorKind::ReadOnly)
}

#[async_trait]
impl Cache for SentinelCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.master().await?;
        let result = get_bytes(&mut conn, key).await;
        self.check(result).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        let mut conn = self.master().await?;
        let result = set_bytes(&mut conn, key, value).await;
        self.check(result).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.master().await?;
        let result = delete_key(&mut conn, key).await;
        self.check(result).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut conn = self.master().await?;
        let result = delete_all(&mut conn).await;
        self.check(result).await
    }
}

async fn get_bytes<C: AsyncCommands>(conn: &mut C, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
    let value: Option<Vec<u8>> = conn.get(key).await?;
    Ok(value)
}

async fn set_bytes<C: AsyncCommands>(conn: &mut C, key: &str, value: &[u8]) -> Result<(), CacheError> {
    conn.set::<_, _, ()>(key, value).await?;
    Ok(())
}

async fn delete_key<C: AsyncCommands>(conn: &mut C, key: &str) -> Result<(), CacheError> {
    conn.del::<_, ()>(key).await?;
    Ok(())
}

async fn delete_all<C: AsyncCommands>(conn: &mut C) -> Result<(), CacheError> {
    let keys: Vec<String> = conn.keys("*").await?;
    if !keys.is_empty() {
        conn.del::<_, ()>(keys).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redis_url() -> Option<String> {
        std::env::var("REDIS_URL").ok()
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server at REDIS_URL"]
    async fn test_redis_cache_roundtrip_and_clear() {
        let Some(url) = redis_url() else {
            return;
        };
        let cache = RedisCache::connect(&url).await.expect("Redis should be reachable");

        cache.set("headless-cms-test:a", b"1").await.unwrap();
        assert_eq!(
            cache.get("headless-cms-test:a").await.unwrap(),
            Some(b"1".to_vec())
        );

        cache.delete("headless-cms-test:a").await.unwrap();
        assert!(cache.get("headless-cms-test:a").await.unwrap().is_none());

        cache.set("headless-cms-test:b", b"2").await.unwrap();
        cache.clear().await.unwrap();
        assert!(cache.get("headless-cms-test:b").await.unwrap().is_none());
    }

    #[test]
    fn test_reconnect_only_after_connection_level_errors() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(needs_reconnect(&RedisError::from(refused)));
        assert!(needs_reconnect(&RedisError::from((
            redis::ErrorKind::ReadOnly,
            "replica is read-only"
        ))));
        assert!(!needs_reconnect(&RedisError::from((
            redis::ErrorKind::TypeError,
            "wrong type"
        ))));
    }

    #[test]
    fn test_sentinel_cache_starts_without_master_connection() {
        let cache = SentinelCache::connect(
            &["redis://127.0.0.1:26379".to_string()],
            "mymaster",
            None,
            0,
        )
        .expect("building the client does not connect");
        assert!(cache.master.try_lock().map(|m| m.is_none()).unwrap_or(false));
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let result = RedisCache::connect("not a redis url").await;
        assert!(matches!(result, Err(CacheError::Redis(_))));
    }
}
