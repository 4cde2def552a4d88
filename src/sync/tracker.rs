//! Change Tracker: persisted sync cursors and the push retry set

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::storage::{EntityStore, StoredEntity};
use crate::types::{Collection, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorKind {
    Push,
    Pull,
}

impl CursorKind {
    fn column(self) -> &'static str {
        match self {
            CursorKind::Push => "push_cursor",
            CursorKind::Pull => "pull_cursor",
        }
    }
}

/// Both cursors of one collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionCursors {
    pub push: Timestamp,
    pub pull: Timestamp,
}

impl CollectionCursors {
    pub fn get(&self, kind: CursorKind) -> Timestamp {
        match kind {
            CursorKind::Push => self.push,
            CursorKind::Pull => self.pull,
        }
    }
}

/// Sync state of one collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub collection: Collection,
    pub cursors: CollectionCursors,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Records queued for push regardless of the cursor
    pub pending_retries: usize,
    /// Records the next push phase would offer
    pub pending_push: usize,
}

const REPLICA_ID_KEY: &str = "replica_id";

#[derive(Clone, Debug)]
pub struct ChangeTracker {
    store: EntityStore,
}

impl ChangeTracker {
    pub fn new(store: EntityStore) -> Self {
        Self { store }
    }

    pub fn cursors(&self, collection: Collection) -> Result<CollectionCursors> {
        self.store.storage().with_connection(|conn| {
            let cursors = conn
                .query_row(
                    "SELECT push_cursor, pull_cursor FROM sync_state WHERE collection = ?",
                    params![collection.as_str()],
                    |row| {
                        Ok(CollectionCursors {
                            push: row.get(0)?,
                            pull: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(cursors.unwrap_or_default())
        })
    }

    pub fn cursor_for(&self, collection: Collection, kind: CursorKind) -> Result<Timestamp> {
        Ok(self.cursors(collection)?.get(kind))
    }

    /// Move a cursor forward; it never moves back. Returns the stored value.
    pub fn advance(&self, collection: Collection, kind: CursorKind, to: Timestamp) -> Result<Timestamp> {
        let column = kind.column();
        self.store.storage().with_transaction(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO sync_state (collection, {column}, updated_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(collection) DO UPDATE SET
                        {column} = MAX({column}, excluded.{column}),
                        updated_at = excluded.updated_at",
                    column = column
                ),
                params![collection.as_str(), to, Utc::now().to_rfc3339()],
            )?;
            let stored: Timestamp = conn.query_row(
                &format!("SELECT {} FROM sync_state WHERE collection = ?", column),
                params![collection.as_str()],
                |row| row.get(0),
            )?;
            Ok(stored)
        })
    }

    /// Records changed strictly after `cursor`
    pub fn candidates<T: StoredEntity>(&self, cursor: Timestamp) -> Result<Vec<T>> {
        self.store.list_modified_since(cursor)
    }

    /// Records the push phase must offer: unbound, changed since the push
    /// cursor, or queued for retry
    pub fn push_candidates<T: StoredEntity>(&self) -> Result<Vec<T>> {
        let cursor = self.cursor_for(T::COLLECTION, CursorKind::Push)?;
        self.store.push_candidates(cursor)
    }

    /// Queue a record for push until it is acknowledged
    pub fn mark_retry(&self, collection: Collection, local_id: i64, reason: &str) -> Result<()> {
        self.store.storage().with_transaction(|conn| {
            conn.execute(
                "INSERT INTO sync_retry (collection, local_id, reason, queued_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(collection, local_id) DO UPDATE SET reason = excluded.reason",
                params![collection.as_str(), local_id, reason, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    pub fn clear_retry(&self, collection: Collection, local_id: i64) -> Result<()> {
        self.store.storage().with_transaction(|conn| {
            conn.execute(
                "DELETE FROM sync_retry WHERE collection = ? AND local_id = ?",
                params![collection.as_str(), local_id],
            )?;
            Ok(())
        })
    }

    pub fn pending_retries(&self, collection: Collection) -> Result<Vec<i64>> {
        self.store.storage().with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT local_id FROM sync_retry WHERE collection = ? ORDER BY local_id ASC",
            )?;
            let ids = stmt
                .query_map(params![collection.as_str()], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<i64>>>()?;
            Ok(ids)
        })
    }

    pub fn is_queued(&self, collection: Collection, local_id: i64) -> Result<bool> {
        self.store.storage().with_connection(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sync_retry WHERE collection = ? AND local_id = ?",
                params![collection.as_str(), local_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Record the outcome of a cycle; `None` clears the last error
    pub fn record_run(&self, collection: Collection, error: Option<&str>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.store.storage().with_transaction(|conn| {
            conn.execute(
                "INSERT INTO sync_state (collection, last_run_at, last_error, updated_at)
                 VALUES (?1, ?2, ?3, ?2)
                 ON CONFLICT(collection) DO UPDATE SET
                    last_run_at = excluded.last_run_at,
                    last_error = excluded.last_error,
                    updated_at = excluded.updated_at",
                params![collection.as_str(), now, error],
            )?;
            Ok(())
        })
    }

    pub fn status(&self, collection: Collection) -> Result<SyncStatus> {
        let cursors = self.cursors(collection)?;

        let (last_run_at, last_error) = self.store.storage().with_connection(|conn| {
            let row: Option<(Option<String>, Option<String>)> = conn
                .query_row(
                    "SELECT last_run_at, last_error FROM sync_state WHERE collection = ?",
                    params![collection.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            Ok(row.unwrap_or((None, None)))
        })?;

        let pending_push = with_entity!(collection, T => {
            self.store.push_candidates::<T>(cursors.push)?.len()
        });

        Ok(SyncStatus {
            collection,
            cursors,
            last_run_at: last_run_at.and_then(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok()
            }),
            last_error,
            pending_retries: self.pending_retries(collection)?.len(),
            pending_push,
        })
    }

    /// Stable id of this replica, created on first use
    pub fn replica_id(&self) -> Result<String> {
        self.store.storage().with_transaction(|conn| {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT value FROM sync_meta WHERE key = ?",
                    params![REPLICA_ID_KEY],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(id) = existing {
                return Ok(id);
            }

            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO sync_meta (key, value) VALUES (?, ?)",
                params![REPLICA_ID_KEY, id],
            )?;
            Ok(id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Venue;

    fn tracker() -> (EntityStore, ChangeTracker) {
        let store = EntityStore::open_in_memory().unwrap();
        (store.clone(), ChangeTracker::new(store))
    }

    #[test]
    fn test_cursors_start_at_zero() {
        let (_, tracker) = tracker();
        assert_eq!(
            tracker.cursors(Collection::Guests).unwrap(),
            CollectionCursors::default()
        );
    }

    #[test]
    fn test_advance_is_monotonic() {
        let (_, tracker) = tracker();
        assert_eq!(tracker.advance(Collection::Venues, CursorKind::Push, 50).unwrap(), 50);
        assert_eq!(tracker.advance(Collection::Venues, CursorKind::Push, 20).unwrap(), 50);
        assert_eq!(tracker.advance(Collection::Venues, CursorKind::Pull, 70).unwrap(), 70);

        let cursors = tracker.cursors(Collection::Venues).unwrap();
        assert_eq!(cursors, CollectionCursors { push: 50, pull: 70 });
        assert_eq!(tracker.cursor_for(Collection::Jobs, CursorKind::Pull).unwrap(), 0);
    }

    #[test]
    fn test_retry_set() {
        let (store, tracker) = tracker();
        let venue = store.insert(&Venue::new("Groove")).unwrap();
        let id = venue.id.get().unwrap();
        store.bind_remote_id::<Venue>(id, "r-1").unwrap();
        tracker
            .advance(Collection::Venues, CursorKind::Push, venue.last_modified)
            .unwrap();
        assert!(tracker.push_candidates::<Venue>().unwrap().is_empty());

        tracker.mark_retry(Collection::Venues, id, "remote error").unwrap();
        tracker.mark_retry(Collection::Venues, id, "remote error again").unwrap();
        assert!(tracker.is_queued(Collection::Venues, id).unwrap());
        assert_eq!(tracker.pending_retries(Collection::Venues).unwrap(), vec![id]);
        assert_eq!(tracker.push_candidates::<Venue>().unwrap().len(), 1);

        tracker.clear_retry(Collection::Venues, id).unwrap();
        assert!(tracker.push_candidates::<Venue>().unwrap().is_empty());
    }

    #[test]
    fn test_status_and_run_record() {
        let (store, tracker) = tracker();
        store.insert(&Venue::new("Groove")).unwrap();
        tracker
            .record_run(Collection::Venues, Some("remote unavailable"))
            .unwrap();

        let status = tracker.status(Collection::Venues).unwrap();
        assert_eq!(status.last_error.as_deref(), Some("remote unavailable"));
        assert!(status.last_run_at.is_some());
        assert_eq!(status.pending_push, 1);

        tracker.record_run(Collection::Venues, None).unwrap();
        assert_eq!(tracker.status(Collection::Venues).unwrap().last_error, None);
    }

    #[test]
    fn test_replica_id_is_stable() {
        let (_, tracker) = tracker();
        let first = tracker.replica_id().unwrap();
        assert_eq!(tracker.replica_id().unwrap(), first);
        assert!(Uuid::parse_str(&first).is_ok());
    }
}
