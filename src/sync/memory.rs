//! In-process remote store
//!
//! Reference `RemoteStore` used by the CLI (persisted to a JSON file) and by
//! tests (with fault injection).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::remote::{OutgoingRecord, RemoteRecord, RemoteStore, UpsertAck};
use crate::clock::Clock;
use crate::error::{EventSyncError, Result};
use crate::types::{Collection, Timestamp, COUNTER_NATURAL_KEY};

type FailurePredicate = Arc<dyn Fn(Collection, &OutgoingRecord) -> bool + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Row {
    remote_id: String,
    last_modified: Timestamp,
    payload: Value,
    #[serde(default)]
    idempotency_key: Option<String>,
    #[serde(default)]
    natural_key: Option<String>,
}

impl Row {
    fn to_record(&self) -> RemoteRecord {
        RemoteRecord {
            remote_id: self.remote_id.clone(),
            last_modified: self.last_modified,
            payload: self.payload.clone(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RemoteState {
    /// collection -> remote id -> row
    collections: BTreeMap<String, BTreeMap<String, Row>>,
    /// Highest stamp issued when re-stamping
    last_stamp: Timestamp,
}

#[derive(Default)]
struct Faults {
    unavailable: bool,
    rate_limited_calls: usize,
    dropped_acks: usize,
    fail_when: Option<FailurePredicate>,
}

pub struct InMemoryRemote {
    state: Mutex<RemoteState>,
    faults: Mutex<Faults>,
    path: Option<PathBuf>,
    restamp: Option<Arc<dyn Clock>>,
    upserts: AtomicUsize,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RemoteState::default()),
            faults: Mutex::new(Faults::default()),
            path: None,
            restamp: None,
            upserts: AtomicUsize::new(0),
        }
    }

    /// Load from (and save every write to) a JSON file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let raw = std::fs::read(&path)?;
            serde_json::from_slice(&raw)?
        } else {
            RemoteState::default()
        };

        tracing::debug!(path = %path.display(), "Opened file-backed remote");

        Ok(Self {
            state: Mutex::new(state),
            path: Some(path),
            ..Self::new()
        })
    }

    /// Stamp every write with this clock instead of the pushed `last_modified`
    pub fn with_restamp(mut self, clock: Arc<dyn Clock>) -> Self {
        self.restamp = Some(clock);
        self
    }

    /// Simulate the remote going offline
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.lock().unavailable = unavailable;
    }

    /// Answer the next `calls` requests with `RateLimited`
    pub fn rate_limit_next(&self, calls: usize) {
        self.faults.lock().rate_limited_calls = calls;
    }

    /// Apply the next `count` upserts but lose their acknowledgement
    pub fn drop_next_acks(&self, count: usize) {
        self.faults.lock().dropped_acks = count;
    }

    /// Reject upserts matching `predicate` with a per-record failure
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(Collection, &OutgoingRecord) -> bool + Send + Sync + 'static,
    {
        self.faults.lock().fail_when = Some(Arc::new(predicate));
    }

    pub fn clear_faults(&self) {
        *self.faults.lock() = Faults::default();
    }

    /// Write a record directly, as another client of the remote would
    pub fn put(&self, collection: Collection, payload: Value, last_modified: Timestamp) -> Result<String> {
        let remote_id = Uuid::new_v4().to_string();
        self.put_with_id(collection, &remote_id, payload, last_modified)?;
        Ok(remote_id)
    }

    pub fn put_with_id(
        &self,
        collection: Collection,
        remote_id: &str,
        payload: Value,
        last_modified: Timestamp,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let rows = state
            .collections
            .entry(collection.as_str().to_string())
            .or_default();
        let natural_key = natural_key_of(collection, &payload);
        rows.insert(
            remote_id.to_string(),
            Row {
                remote_id: remote_id.to_string(),
                last_modified,
                payload,
                idempotency_key: None,
                natural_key,
            },
        );
        state.last_stamp = state.last_stamp.max(last_modified);
        self.save(&state)
    }

    pub fn get(&self, collection: Collection, remote_id: &str) -> Option<RemoteRecord> {
        self.state
            .lock()
            .collections
            .get(collection.as_str())
            .and_then(|rows| rows.get(remote_id))
            .map(Row::to_record)
    }

    pub fn records(&self, collection: Collection) -> Vec<RemoteRecord> {
        self.state
            .lock()
            .collections
            .get(collection.as_str())
            .map(|rows| rows.values().map(Row::to_record).collect())
            .unwrap_or_default()
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.state
            .lock()
            .collections
            .get(collection.as_str())
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().collections.values().all(BTreeMap::is_empty)
    }

    /// Upserts that reached the store, including failed ones
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        let mut faults = self.faults.lock();
        if faults.unavailable {
            return Err(EventSyncError::RemoteUnavailable(
                "remote store is offline".to_string(),
            ));
        }
        if faults.rate_limited_calls > 0 {
            faults.rate_limited_calls -= 1;
            return Err(EventSyncError::RateLimited(1));
        }
        Ok(())
    }

    fn save(&self, state: &RemoteState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Natural key of a record written directly, outside `upsert`
fn natural_key_of(collection: Collection, payload: &Value) -> Option<String> {
    match collection {
        Collection::Venues | Collection::JobTypeConfigs => payload
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string),
        Collection::Counter => Some(COUNTER_NATURAL_KEY.to_string()),
        _ => None,
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn fetch_changed_since(
        &self,
        collection: Collection,
        cursor: Timestamp,
    ) -> Result<Vec<RemoteRecord>> {
        self.check_available()?;

        let mut records: Vec<RemoteRecord> = self
            .records(collection)
            .into_iter()
            .filter(|r| r.last_modified > cursor)
            .collect();
        records.sort_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then_with(|| a.remote_id.cmp(&b.remote_id))
        });
        Ok(records)
    }

    async fn upsert(&self, collection: Collection, record: OutgoingRecord) -> Result<UpsertAck> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let (fail, drop_ack) = {
            let mut faults = self.faults.lock();
            let fail = faults
                .fail_when
                .as_ref()
                .map(|predicate| predicate(collection, &record))
                .unwrap_or(false);
            let drop_ack = !fail && faults.dropped_acks > 0;
            if drop_ack {
                faults.dropped_acks -= 1;
            }
            (fail, drop_ack)
        };
        if fail {
            return Err(EventSyncError::RecordSyncFailure(format!(
                "remote rejected {} record {}",
                collection, record.idempotency_key
            )));
        }

        let mut state = self.state.lock();
        let stamp = match &self.restamp {
            Some(clock) => clock.now_millis().max(state.last_stamp + 1),
            None => record.last_modified,
        };

        let rows = state
            .collections
            .entry(collection.as_str().to_string())
            .or_default();

        let existing_id = record
            .remote_id
            .clone()
            .filter(|id| rows.contains_key(id))
            .or_else(|| {
                rows.values()
                    .find(|row| row.idempotency_key.as_deref() == Some(record.idempotency_key.as_str()))
                    .map(|row| row.remote_id.clone())
            });
        let remote_id = existing_id
            .or_else(|| record.remote_id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Some(key) = &record.natural_key {
            let normalized = key.trim().to_lowercase();
            let taken = rows.values().any(|row| {
                row.remote_id != remote_id
                    && row.natural_key.as_deref().map(|k| k.trim().to_lowercase())
                        == Some(normalized.clone())
            });
            if taken {
                return Err(EventSyncError::RecordSyncFailure(format!(
                    "{} already holds a record named '{}'",
                    collection, key
                )));
            }
        }

        // Without re-stamping, writes are conditional on the version
        if self.restamp.is_none() {
            if let Some(existing) = rows.get(&remote_id) {
                if existing.last_modified > record.last_modified {
                    return Err(EventSyncError::RecordSyncFailure(format!(
                        "{} record {} has a newer remote version ({} > {})",
                        collection, remote_id, existing.last_modified, record.last_modified
                    )));
                }
            }
        }

        let idempotency_key = rows
            .get(&remote_id)
            .and_then(|row| row.idempotency_key.clone())
            .unwrap_or_else(|| record.idempotency_key.clone());
        rows.insert(
            remote_id.clone(),
            Row {
                remote_id: remote_id.clone(),
                last_modified: stamp,
                payload: record.payload,
                idempotency_key: Some(idempotency_key),
                natural_key: record.natural_key,
            },
        );
        state.last_stamp = state.last_stamp.max(stamp);
        self.save(&state)?;

        if drop_ack {
            return Err(EventSyncError::RemoteUnavailable(
                "connection reset before acknowledgement".to_string(),
            ));
        }

        Ok(UpsertAck {
            remote_id,
            remote_last_modified: self.restamp.as_ref().map(|_| stamp),
        })
    }
}
