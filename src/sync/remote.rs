//! Remote system of record, as seen by the sync engine

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EventSyncError, Result};
use crate::types::{Collection, Entity, LocalId, Timestamp};

/// Identity and version fields carried outside the payload
const ENVELOPE_FIELDS: [&str; 3] = ["id", "remote_id", "last_modified"];

/// A record as stored remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub remote_id: String,
    pub last_modified: Timestamp,
    /// Entity fields without identity or version
    pub payload: Value,
}

/// A local record offered to the remote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingRecord {
    /// Bound remote id; `None` on first push
    pub remote_id: Option<String>,
    /// Stable per local record, so a retried create resolves to the same remote row
    pub idempotency_key: String,
    pub natural_key: Option<String>,
    pub last_modified: Timestamp,
    pub payload: Value,
}

/// Remote acknowledgement of an upsert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertAck {
    pub remote_id: String,
    /// Set when the remote re-stamps records with its own clock
    pub remote_last_modified: Option<Timestamp>,
}

/// Remote collaborator
///
/// `RemoteUnavailable` and `RateLimited` end the current cycle; any other
/// error fails only the record at hand.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Records changed strictly after `cursor`
    async fn fetch_changed_since(
        &self,
        collection: Collection,
        cursor: Timestamp,
    ) -> Result<Vec<RemoteRecord>>;

    /// Create or update one record
    async fn upsert(&self, collection: Collection, record: OutgoingRecord) -> Result<UpsertAck>;
}

/// Entity fields to send, without identity or version
pub fn encode_payload<T: Entity>(entity: &T) -> Result<Value> {
    let mut value = serde_json::to_value(entity)?;
    match value.as_object_mut() {
        Some(object) => {
            for field in ENVELOPE_FIELDS {
                object.remove(field);
            }
            Ok(value)
        }
        None => Err(EventSyncError::Internal(format!(
            "{} did not serialize to an object",
            T::COLLECTION
        ))),
    }
}

/// Rebuild an entity from a remote record; it has no local identity yet
pub fn decode_payload<T: Entity>(record: &RemoteRecord) -> Result<T> {
    let mut payload = record.payload.clone();
    if let Some(object) = payload.as_object_mut() {
        for field in ENVELOPE_FIELDS {
            object.remove(field);
        }
    }

    let mut entity: T = serde_json::from_value(payload).map_err(|e| {
        EventSyncError::RecordSyncFailure(format!(
            "{} record {} has an invalid payload: {}",
            T::COLLECTION,
            record.remote_id,
            e
        ))
    })?;
    entity.set_local_id(LocalId::Unassigned);
    entity.set_remote_id(Some(record.remote_id.clone()));
    entity.set_last_modified(record.last_modified);
    Ok(entity)
}
