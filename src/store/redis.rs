//! Redis-backed window store.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script};
use tracing::{info, warn};

use super::{StoreError, WindowSnapshot, WindowStore};

/// Increment only when the key already exists; nil otherwise.
const INCREMENT_EXISTING: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return redis.call('INCR', KEYS[1])
end
return false
"#;

/// Increment, attaching the window TTL when this call created the key.
/// Returns: [current_count, ttl_remaining]
const INCREMENT_OR_CREATE: &str = r#"
local current = redis.call('INCR', KEYS[1])
if current == 1 then
    redis.call('EXPIRE', KEYS[1], tonumber(ARGV[1]))
end
return {current, redis.call('TTL', KEYS[1])}
"#;

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis host name or address
    pub host: String,
    /// Redis port
    pub port: u16,
    /// How long to wait for the initial connection
    pub connect_timeout: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisStoreConfig {
    /// Connection URL for the configured host and port.
    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

/// Window store backed by a shared Redis instance.
///
/// Uses a connection manager for automatic reconnection; clones of the
/// manager share one multiplexed connection.
pub struct RedisStore {
    conn: ConnectionManager,
    increment_existing: Script,
    increment_or_create: Script,
}

impl RedisStore {
    /// Connect to Redis, failing if no connection is made within the timeout.
    pub async fn connect(config: &RedisStoreConfig) -> Result<Self, StoreError> {
        Self::connect_url(&config.url(), config.connect_timeout).await
    }

    /// Connect to the Redis instance at `url`.
    pub async fn connect_url(url: &str, connect_timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(map_redis_error)?;

        let conn = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(connect_timeout))?
            .map_err(map_redis_error)?;

        info!(url = %url, "Connected to Redis window store");

        Ok(Self {
            conn,
            increment_existing: Script::new(INCREMENT_EXISTING),
            increment_or_create: Script::new(INCREMENT_OR_CREATE),
        })
    }
}

fn map_redis_error(err: RedisError) -> StoreError {
    if err.is_timeout()
        || err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
    {
        warn!(error = %err, "Redis connection failure");
        StoreError::Connection(err.to_string())
    } else {
        StoreError::Command(err.to_string())
    }
}

/// Redis reports -2 for a missing key and -1 for a key without expiry.
fn ttl_from_reply(reply: i64) -> Option<u64> {
    u64::try_from(reply).ok()
}

/// Decode the `[count, ttl]` reply of the increment-or-create script.
fn snapshot_from_reply(reply: &[i64]) -> Result<WindowSnapshot, StoreError> {
    match reply {
        [count, ttl] => {
            let count = u64::try_from(*count).map_err(|_| {
                StoreError::Command(format!("negative counter value in reply: {}", count))
            })?;
            Ok(WindowSnapshot {
                count,
                ttl_secs: ttl_from_reply(*ttl),
            })
        }
        _ => Err(StoreError::Command(format!(
            "unexpected increment-or-create reply: {:?}",
            reply
        ))),
    }
}

#[async_trait]
impl WindowStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<u64>>(key).await.map_err(map_redis_error)
    }

    async fn set_with_ttl(&self, key: &str, value: u64, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(map_redis_error)
    }

    async fn increment(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.conn.clone();
        let reply: Option<u64> = self
            .increment_existing
            .key(key)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(reply)
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.conn.clone();
        let reply: i64 = conn.ttl(key).await.map_err(map_redis_error)?;
        Ok(ttl_from_reply(reply))
    }

    fn supports_atomic_increment(&self) -> bool {
        true
    }

    async fn increment_or_create(
        &self,
        key: &str,
        ttl_secs: u64,
    ) -> Result<WindowSnapshot, StoreError> {
        let mut conn = self.conn.clone();
        let reply: Vec<i64> = self
            .increment_or_create
            .key(key)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        snapshot_from_reply(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> Option<RedisStore> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379/".to_string());
        RedisStore::connect_url(&url, Duration::from_secs(1)).await.ok()
    }

    #[test]
    fn test_url_from_host_and_port() {
        let config = RedisStoreConfig {
            host: "cache.internal".to_string(),
            port: 6380,
            connect_timeout: Duration::from_secs(1),
        };
        assert_eq!(config.url(), "redis://cache.internal:6380/");
    }

    #[test]
    fn test_ttl_reply_sentinels() {
        assert_eq!(ttl_from_reply(-2), None);
        assert_eq!(ttl_from_reply(-1), None);
        assert_eq!(ttl_from_reply(42), Some(42));
    }

    #[test]
    fn test_snapshot_reply_decoding() {
        assert_eq!(
            snapshot_from_reply(&[3, 17]).unwrap(),
            WindowSnapshot { count: 3, ttl_secs: Some(17) }
        );
        assert_eq!(snapshot_from_reply(&[1, -1]).unwrap().ttl_secs, None);
    }

    #[test]
    fn test_negative_count_reply_is_command_error() {
        let err = snapshot_from_reply(&[-4, 10]).unwrap_err();
        assert!(matches!(err, StoreError::Command(_)));
    }

    #[test]
    fn test_malformed_reply_is_command_error() {
        assert!(matches!(snapshot_from_reply(&[1]), Err(StoreError::Command(_))));
        assert!(matches!(snapshot_from_reply(&[1, 2, 3]), Err(StoreError::Command(_))));
    }

    #[tokio::test]
    async fn test_redis_counter_lifecycle() {
        let store = match test_store().await {
            Some(s) => s,
            None => return,
        };
        let key = "tollgate_test:lifecycle";

        store.set_with_ttl(key, 1, 30).await.unwrap();
        assert_eq!(store.get(key).await.unwrap(), Some(1));
        assert_eq!(store.increment(key).await.unwrap(), Some(2));

        let ttl = store.ttl(key).await.unwrap().unwrap();
        assert!(ttl > 0 && ttl <= 30);
    }

    #[tokio::test]
    async fn test_redis_increment_missing_key_is_noop() {
        let store = match test_store().await {
            Some(s) => s,
            None => return,
        };
        let key = "tollgate_test:never_created";

        assert_eq!(store.increment(key).await.unwrap(), None);
        assert_eq!(store.get(key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_redis_increment_or_create() {
        let store = match test_store().await {
            Some(s) => s,
            None => return,
        };
        let key = "tollgate_test:atomic";
        store.set_with_ttl(key, 0, 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let first = store.increment_or_create(key, 20).await.unwrap();
        assert_eq!(first.count, 1);
        assert!(first.ttl_secs.unwrap() <= 20);

        let second = store.increment_or_create(key, 20).await.unwrap();
        assert_eq!(second.count, 2);
    }
}
