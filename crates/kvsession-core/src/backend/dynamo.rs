use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use tracing::{info, warn};

use crate::error::BackendError;

use super::{RecordStore, PONG};

/// DynamoDB-based record store.
///
/// Table layout: partition key `pk` (S), payload `payload` (B) and a `ttl`
/// attribute (N, epoch seconds) that should be configured as the table's TTL
/// attribute. DynamoDB deletes expired items lazily, so reads also check `ttl`.
pub struct DynamoRecordStore {
    client: Client,
    table_name: String,
}

impl DynamoRecordStore {
    pub fn new(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }

    /// Build a client from the standard AWS environment.
    pub async fn from_env(table_name: String) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        info!("Using DynamoDB table {}", table_name);
        Self::new(Client::new(&config), table_name)
    }
}

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Epoch second at which a record written at `now` with `ttl` expires.
fn expires_at(now: i64, ttl: Duration) -> i64 {
    now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}

#[async_trait]
impl RecordStore for DynamoRecordStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("pk", AttributeValue::S(key.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        let Some(item) = output.item else {
            return Ok(None);
        };

        let expires_at = item
            .get("ttl")
            .and_then(|v| v.as_n().ok())
            .and_then(|n| n.parse::<i64>().ok());
        if matches!(expires_at, Some(t) if t <= now_epoch()) {
            return Ok(None);
        }

        match item.get("payload") {
            Some(AttributeValue::B(blob)) => Ok(Some(blob.as_ref().to_vec())),
            Some(_) => {
                warn!("DynamoDB item {} has a non-binary payload", key);
                Err(BackendError::Protocol(format!("payload for {key} is not binary")))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), BackendError> {
        let expiry = expires_at(now_epoch(), ttl);
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("pk", AttributeValue::S(key.to_string()))
            .item("payload", AttributeValue::B(Blob::new(value.to_vec())))
            .item("ttl", AttributeValue::N(expiry.to_string()))
            .item(
                "updated_at",
                AttributeValue::S(chrono::Utc::now().to_rfc3339()),
            )
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("pk", AttributeValue::S(key.to_string()))
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn ping(&self) -> Result<String, BackendError> {
        let output = self
            .client
            .describe_table()
            .table_name(&self.table_name)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        if output.table.is_some() {
            Ok(PONG.to_string())
        } else {
            Err(BackendError::Protocol(format!(
                "table {} not described",
                self.table_name
            )))
        }
    }
}
