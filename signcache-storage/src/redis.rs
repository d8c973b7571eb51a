//! Redis-backed store.
//!
//! Uses a `ConnectionManager`, which reconnects on its own and is cheap to
//! clone, so every operation works on its own clone of the handle. Paired
//! writes go through a `MULTI`/`EXEC` pipeline; paired reads through a plain
//! pipeline.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, Value};
use signcache_core::StoreError;

use crate::{ttl_seconds, CacheStore, StoreResult, ValuePair};

/// [`CacheStore`] over a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

fn command_error(command: &'static str) -> impl Fn(RedisError) -> StoreError {
    move |e| StoreError::Command {
        command: command.to_string(),
        reason: e.to_string(),
    }
}

fn acknowledged(reply: &Value) -> bool {
    match reply {
        Value::Okay => true,
        Value::SimpleString(status) => status == "OK",
        _ => false,
    }
}

impl RedisStore {
    /// Connect to the server at `url` (`redis://host:port/db`).
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url).map_err(|e| StoreError::Connection {
            reason: e.to_string(),
        })?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Connection {
                reason: e.to_string(),
            })?;
        Ok(Self { conn })
    }

    /// Wrap an existing connection manager.
    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(command_error("GET"))
    }

    async fn set_with_expiry(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Value = conn
            .set_ex(key, value, ttl_seconds(ttl))
            .await
            .map_err(command_error("SETEX"))?;
        Ok(acknowledged(&reply))
    }

    async fn get_pair(&self, key_a: &str, key_b: &str) -> StoreResult<ValuePair> {
        let mut conn = self.conn.clone();
        let pair: ValuePair = redis::pipe()
            .get(key_a)
            .get(key_b)
            .query_async(&mut conn)
            .await
            .map_err(command_error("GET"))?;
        Ok(pair)
    }

    async fn set_pair_with_expiry(
        &self,
        key_a: &str,
        value_a: &[u8],
        key_b: &str,
        value_b: &[u8],
        ttl: Duration,
    ) -> StoreResult<(bool, bool)> {
        let mut conn = self.conn.clone();
        let seconds = ttl_seconds(ttl);
        let (reply_a, reply_b): (Value, Value) = redis::pipe()
            .atomic()
            .set_ex(key_a, value_a, seconds)
            .set_ex(key_b, value_b, seconds)
            .query_async(&mut conn)
            .await
            .map_err(command_error("MULTI/SETEX"))?;
        Ok((acknowledged(&reply_a), acknowledged(&reply_b)))
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        conn.del(keys).await.map_err(command_error("DEL"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acknowledged_replies() {
        assert!(acknowledged(&Value::Okay));
        assert!(acknowledged(&Value::SimpleString("OK".to_string())));
        assert!(!acknowledged(&Value::Nil));
        assert!(!acknowledged(&Value::Int(0)));
    }

    #[test]
    fn test_command_error_names_command() {
        let err = command_error("SETEX")(RedisError::from((
            redis::ErrorKind::IoError,
            "broken pipe",
        )));
        assert!(err.to_string().contains("SETEX"));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let err = RedisStore::connect("not a url").await.unwrap_err();
        assert!(matches!(err, StoreError::Connection { .. }));
    }
}
