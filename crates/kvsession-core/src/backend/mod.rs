pub mod memory;

#[cfg(feature = "redis-backend")]
pub mod redis;

#[cfg(feature = "dynamodb-backend")]
pub mod dynamo;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{BackendConfig, BackendKind};
use crate::error::BackendError;

pub use memory::MemoryRecordStore;

/// Reply expected from a healthy backend's liveness probe.
pub const PONG: &str = "PONG";

/// Trait for key-value backends holding serialized session records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read a record. A missing or expired key is `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    /// Write a record that expires after `ttl`.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), BackendError>;

    /// Remove a record. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), BackendError>;

    /// Liveness probe; healthy backends answer [`PONG`].
    async fn ping(&self) -> Result<String, BackendError>;
}

/// Build the backend selected in configuration.
pub async fn connect(config: &BackendConfig) -> Result<Arc<dyn RecordStore>, BackendError> {
    match config.kind {
        BackendKind::Memory => Ok(Arc::new(MemoryRecordStore::new())),
        #[cfg(feature = "redis-backend")]
        BackendKind::Redis => Ok(Arc::new(
            self::redis::RedisRecordStore::connect(&config.redis_url).await?,
        )),
        #[cfg(feature = "dynamodb-backend")]
        BackendKind::Dynamodb => Ok(Arc::new(
            self::dynamo::DynamoRecordStore::from_env(config.table_name.clone()).await,
        )),
        #[allow(unreachable_patterns)]
        kind => Err(BackendError::Unavailable(format!(
            "backend '{kind}' is not enabled in this build"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_memory() {
        let backend = connect(&BackendConfig::default()).await.unwrap();
        assert_eq!(backend.ping().await.unwrap(), PONG);
    }

    #[cfg(not(feature = "redis-backend"))]
    #[tokio::test]
    async fn test_connect_disabled_backend() {
        let config = BackendConfig {
            kind: BackendKind::Redis,
            ..BackendConfig::default()
        };
        let err = connect(&config).await.err().unwrap();
        assert!(err.to_string().contains("not enabled"));
    }
}
