use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use crate::error::BackendError;

use super::RecordStore;

/// Redis-backed record store. Records are plain string keys with an `EX` expiry.
#[derive(Clone)]
pub struct RedisRecordStore {
    conn: ConnectionManager,
}

impl RedisRecordStore {
    /// Connect to a Redis server, e.g. `redis://127.0.0.1:6379`.
    pub async fn connect(url: &str) -> Result<Self, BackendError> {
        let client = redis::Client::open(url).map_err(to_backend_error)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(to_backend_error)?;
        info!("Connected to redis at {}", url);
        Ok(Self { conn })
    }

    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn to_backend_error(e: redis::RedisError) -> BackendError {
    BackendError::Unavailable(e.to_string())
}

#[async_trait]
impl RecordStore for RedisRecordStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(to_backend_error)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), BackendError> {
        let mut conn = self.conn.clone();
        // EX 0 is rejected by redis.
        let secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, secs)
            .await
            .map_err(to_backend_error)
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(to_backend_error)
    }

    async fn ping(&self) -> Result<String, BackendError> {
        let mut conn = self.conn.clone();
        let reply: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(to_backend_error)?;
        Ok(reply)
    }
}
